//! Network connectivity validation
//!
//! Validates that the shared budget store is reachable.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::Config;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const DEFAULT_REDIS_PORT: u16 = 6379;

/// Validate budget store connectivity
pub async fn validate_budget_store(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(ref url) = config.budget.redis_url else {
        return result;
    };

    let address = match redis_address(url) {
        Some(address) => address,
        None => {
            result.add_error(ValidationError::new(
                ErrorCategory::Network,
                format!("Budget store URL '{}' has no host", url),
            ));
            return result;
        }
    };

    match timeout(Duration::from_secs(5), TcpStream::connect(&address)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            result.add_error(ValidationError::new(
                ErrorCategory::Network,
                format!("Budget store '{}' unreachable: {}", address, e),
            ));
        }
        Err(_) => {
            result.add_warning(ValidationWarning::new(format!(
                "Budget store '{}' connection timeout (5s)",
                address
            )));
        }
    }

    result
}

/// `host:port` of a `redis://` or `rediss://` URL.
fn redis_address(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("redis://")
        .or_else(|| url.strip_prefix("rediss://"))?;
    let authority = rest.split('/').next().unwrap_or(rest);
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    if host_port.is_empty() {
        return None;
    }

    let has_port = match host_port.rfind(':') {
        Some(idx) => !host_port.ends_with(']') && host_port[idx + 1..].parse::<u16>().is_ok(),
        None => false,
    };

    if has_port {
        Some(host_port.to_string())
    } else {
        Some(format!("{}:{}", host_port, DEFAULT_REDIS_PORT))
    }
}
