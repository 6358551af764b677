//! Section-level KDL parsing.

use anyhow::Result;
use std::path::PathBuf;
use tracing::trace;

use crate::{ApiConfig, BudgetConfig, CdnConfig, DeploymentConfig, DispatchConfig, StorageConfig};

use super::helpers::{get_bool_entry, get_string_entry, get_u32_entry, get_u64_entry};

/// Parse the `storage` block
pub fn parse_storage(node: &::kdl::KdlNode) -> Result<StorageConfig> {
    trace!("Parsing storage configuration block");

    let mut config = StorageConfig::default();
    if let Some(path) = get_string_entry(node, "jobs-path") {
        config.jobs_path = PathBuf::from(path);
    }

    Ok(config)
}

/// Parse the `budget` block
pub fn parse_budget(node: &::kdl::KdlNode) -> Result<BudgetConfig> {
    trace!("Parsing budget configuration block");

    let defaults = BudgetConfig::default();
    let config = BudgetConfig {
        key: get_string_entry(node, "key").unwrap_or(defaults.key),
        points: get_u32_entry(node, "points")?.unwrap_or(defaults.points),
        window_secs: get_u64_entry(node, "window-secs")?.unwrap_or(defaults.window_secs),
        block_secs: get_u64_entry(node, "block-secs")?.unwrap_or(defaults.block_secs),
        redis_url: get_string_entry(node, "redis-url"),
    };

    trace!(
        key = %config.key,
        points = config.points,
        window_secs = config.window_secs,
        shared = config.redis_url.is_some(),
        "Parsed budget configuration"
    );

    Ok(config)
}

/// Parse the `dispatch` block
pub fn parse_dispatch(node: &::kdl::KdlNode) -> Result<DispatchConfig> {
    trace!("Parsing dispatch configuration block");

    let defaults = DispatchConfig::default();
    Ok(DispatchConfig {
        min_poll_ms: get_u64_entry(node, "min-poll-ms")?.unwrap_or(defaults.min_poll_ms),
        max_poll_secs: get_u64_entry(node, "max-poll-secs")?.unwrap_or(defaults.max_poll_secs),
        error_backoff_secs: get_u64_entry(node, "error-backoff-secs")?
            .unwrap_or(defaults.error_backoff_secs),
    })
}

/// Parse the `deployment` block
pub fn parse_deployment(node: &::kdl::KdlNode) -> Result<DeploymentConfig> {
    trace!("Parsing deployment configuration block");

    let defaults = DeploymentConfig::default();
    Ok(DeploymentConfig {
        timeout_secs: get_u64_entry(node, "timeout-secs")?.unwrap_or(defaults.timeout_secs),
    })
}

/// Parse the `api` block
pub fn parse_api(node: &::kdl::KdlNode) -> Result<ApiConfig> {
    trace!("Parsing api configuration block");

    let defaults = ApiConfig::default();
    Ok(ApiConfig {
        hmac_key: get_string_entry(node, "hmac-key"),
        max_age_secs: get_u64_entry(node, "max-age-secs")?.unwrap_or(defaults.max_age_secs),
        max_future_secs: get_u64_entry(node, "max-future-secs")?
            .unwrap_or(defaults.max_future_secs),
    })
}

/// Parse the `cdn` block
pub fn parse_cdn(node: &::kdl::KdlNode) -> Result<CdnConfig> {
    trace!("Parsing cdn configuration block");

    Ok(CdnConfig {
        tls_configuration: get_string_entry(node, "tls-configuration"),
        allow_untrusted_root: get_bool_entry(node, "allow-untrusted-root").unwrap_or(false),
        root_certificate: get_string_entry(node, "root-certificate").map(PathBuf::from),
    })
}
