//! Certwarden configuration
//!
//! Configuration is written in KDL:
//!
//! ```kdl
//! storage {
//!     jobs-path "/var/lib/certwarden/jobs"
//! }
//! budget {
//!     key "limiter"
//!     points 100
//!     window-secs 3600
//!     block-secs 3600
//!     redis-url "redis://127.0.0.1/"
//! }
//! dispatch {
//!     min-poll-ms 250
//!     max-poll-secs 60
//!     error-backoff-secs 5
//! }
//! deployment {
//!     timeout-secs 2400
//! }
//! api {
//!     hmac-key "change-me"
//! }
//! cdn {
//!     tls-configuration "default"
//!     allow-untrusted-root #false
//! }
//! ```
//!
//! Every block and every field is optional; omitted values take the defaults
//! documented on each struct.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use validator::Validate;

use certwarden_common::{LeakyBucketPolicy, DEFAULT_BUDGET_KEY};

pub mod kdl;
pub mod validate;

// ============================================================================
// Errors
// ============================================================================

/// Configuration that parsed but cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field is out of range.
    #[error("invalid configuration: {0}")]
    Field(#[from] validator::ValidationErrors),

    /// Fields are individually valid but contradict each other.
    #[error("invalid configuration: {0}")]
    Inconsistent(String),
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,

    #[serde(default)]
    #[validate(nested)]
    pub budget: BudgetConfig,

    #[serde(default)]
    #[validate(nested)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    #[validate(nested)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    #[validate(nested)]
    pub api: ApiConfig,

    #[serde(default)]
    #[validate(nested)]
    pub cdn: CdnConfig,
}

impl Config {
    /// Load configuration from a KDL file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading configuration file");

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config = Self::from_kdl(&text)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from KDL text.
    pub fn from_kdl(text: &str) -> Result<Self> {
        kdl::parse_config(text)
    }

    /// Check field ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Validate::validate(self)?;

        if self.dispatch.min_poll() > self.dispatch.max_poll() {
            return Err(ConfigError::Inconsistent(format!(
                "dispatch min-poll-ms ({}) exceeds max-poll-secs ({})",
                self.dispatch.min_poll_ms, self.dispatch.max_poll_secs
            )));
        }

        if self.cdn.allow_untrusted_root && self.cdn.root_certificate.is_none() {
            return Err(ConfigError::Inconsistent(
                "cdn allow-untrusted-root requires a root-certificate".to_string(),
            ));
        }

        if matches!(self.api.hmac_key.as_deref(), Some(key) if key.is_empty()) {
            return Err(ConfigError::Inconsistent(
                "api hmac-key must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Where certificate jobs are persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    /// Directory holding one JSON document per job
    #[serde(default = "default_jobs_path")]
    pub jobs_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            jobs_path: default_jobs_path(),
        }
    }
}

/// Issuance budget shared by every instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BudgetConfig {
    /// Logical key of the shared budget
    #[serde(default = "default_budget_key")]
    #[validate(length(min = 1))]
    pub key: String,

    /// Issuance requests allowed per window
    #[serde(default = "default_points")]
    #[validate(range(min = 1))]
    pub points: u32,

    /// Window over which `points` regenerate
    #[serde(default = "default_window_secs")]
    #[validate(range(min = 1))]
    pub window_secs: u64,

    /// Cooldown applied when the CA reports an order rate limit
    #[serde(default = "default_block_secs")]
    #[validate(range(min = 1))]
    pub block_secs: u64,

    /// Shared Redis store; in-memory when unset
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl BudgetConfig {
    pub fn policy(&self) -> LeakyBucketPolicy {
        LeakyBucketPolicy::new(self.points, Duration::from_secs(self.window_secs))
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            key: default_budget_key(),
            points: default_points(),
            window_secs: default_window_secs(),
            block_secs: default_block_secs(),
            redis_url: None,
        }
    }
}

/// Pacing of the dispatch queue while it waits for budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DispatchConfig {
    #[serde(default = "default_min_poll_ms")]
    #[validate(range(min = 1))]
    pub min_poll_ms: u64,

    #[serde(default = "default_max_poll_secs")]
    #[validate(range(min = 1))]
    pub max_poll_secs: u64,

    /// Wait after a budget store error before retrying
    #[serde(default = "default_error_backoff_secs")]
    #[validate(range(min = 1))]
    pub error_backoff_secs: u64,
}

impl DispatchConfig {
    pub fn min_poll(&self) -> Duration {
        Duration::from_millis(self.min_poll_ms)
    }

    pub fn max_poll(&self) -> Duration {
        Duration::from_secs(self.max_poll_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_poll_ms: default_min_poll_ms(),
            max_poll_secs: default_max_poll_secs(),
            error_backoff_secs: default_error_backoff_secs(),
        }
    }
}

/// CDN deployment confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeploymentConfig {
    /// Upper bound on a single deployment check
    #[serde(default = "default_deployment_timeout_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl DeploymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_deployment_timeout_secs(),
        }
    }
}

/// Request authentication for the transport in front of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    /// Shared HMAC secret
    #[serde(default)]
    pub hmac_key: Option<String>,

    /// How old a signed request may be
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// How far in the future a signed request may be
    #[serde(default = "default_max_future_secs")]
    pub max_future_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            hmac_key: None,
            max_age_secs: default_max_age_secs(),
            max_future_secs: default_max_future_secs(),
        }
    }
}

/// CDN certificate store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct CdnConfig {
    /// Name of the CDN TLS configuration new certificates attach to
    #[serde(default)]
    pub tls_configuration: Option<String>,

    /// Accept chains ending in a root the CDN does not trust (staging CAs)
    #[serde(default)]
    pub allow_untrusted_root: bool,

    /// Root certificate appended to chains when untrusted roots are allowed
    #[serde(default)]
    pub root_certificate: Option<PathBuf>,
}

// ============================================================================
// Defaults
// ============================================================================

fn default_jobs_path() -> PathBuf {
    PathBuf::from("/var/lib/certwarden/jobs")
}

fn default_budget_key() -> String {
    DEFAULT_BUDGET_KEY.to_string()
}

fn default_points() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    3600
}

fn default_block_secs() -> u64 {
    3600
}

fn default_min_poll_ms() -> u64 {
    250
}

fn default_max_poll_secs() -> u64 {
    60
}

fn default_error_backoff_secs() -> u64 {
    5
}

fn default_deployment_timeout_secs() -> u64 {
    // CDN propagation failures surface after roughly half an hour
    2400
}

fn default_max_age_secs() -> u64 {
    120
}

fn default_max_future_secs() -> u64 {
    60
}
