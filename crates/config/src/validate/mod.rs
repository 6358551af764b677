//! Pre-flight validation
//!
//! Checks that go beyond field ranges: files referenced by the
//! configuration, reachability of the shared budget store, and lint
//! warnings for settings that are legal but probably unintended.

use std::fmt;

use crate::Config;

#[cfg(feature = "validation")]
pub mod certs;
pub mod lint;
#[cfg(feature = "validation")]
pub mod network;

/// Which subsystem a validation error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Certificate,
    Network,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Certificate => write!(f, "certificate"),
            ErrorCategory::Network => write!(f, "network"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Accumulated errors and warnings from one or more checks.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Which optional checks to run
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOpts {
    /// Load and inspect certificate files
    pub check_certificates: bool,
    /// Connect to the shared budget store
    pub check_network: bool,
}

/// Run every applicable check against a parsed configuration.
pub async fn validate_all(config: &Config, opts: ValidationOpts) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Err(e) = config.validate() {
        result.add_error(ValidationError::new(ErrorCategory::Config, e.to_string()));
    }

    #[cfg(feature = "validation")]
    {
        if opts.check_certificates {
            result.merge(certs::validate_certificates(config).await);
        }
        if opts.check_network {
            result.merge(network::validate_budget_store(config).await);
        }
    }
    #[cfg(not(feature = "validation"))]
    let _ = opts;

    result.merge(lint::lint_config(config));
    result
}
