//! Configuration linting
//!
//! Flags settings that are legal but likely to surprise in production.

use super::{ValidationResult, ValidationWarning};
use crate::Config;

/// Deployments shorter than this rarely survive CDN propagation
const MIN_SENSIBLE_DEPLOYMENT_SECS: u64 = 300;

/// Lint configuration for operational pitfalls
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.budget.redis_url.is_none() {
        result.add_warning(ValidationWarning::new(
            "Budget is held in memory; multiple instances will each spend the full budget",
        ));
    }

    if config.budget.block_secs < config.budget.window_secs {
        result.add_warning(ValidationWarning::new(format!(
            "Budget block-secs ({}) is shorter than window-secs ({}); CA rate limits may be hit again immediately",
            config.budget.block_secs, config.budget.window_secs
        )));
    }

    if config.api.hmac_key.is_none() {
        result.add_warning(ValidationWarning::new(
            "No api hmac-key configured; requests cannot be authenticated",
        ));
    }

    if config.deployment.timeout_secs < MIN_SENSIBLE_DEPLOYMENT_SECS {
        result.add_warning(ValidationWarning::new(format!(
            "Deployment timeout of {}s is short; CDN deployments commonly take several minutes",
            config.deployment.timeout_secs
        )));
    }

    if config.cdn.allow_untrusted_root {
        result.add_warning(ValidationWarning::new(
            "Untrusted roots are allowed; use only with staging CAs",
        ));
    }

    result
}
