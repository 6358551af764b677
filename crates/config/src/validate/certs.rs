//! Certificate validation
//!
//! Checks the root certificate appended to chains from CAs the CDN does not
//! trust.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::Config;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Validate certificate files referenced by the configuration
pub async fn validate_certificates(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(ref root) = config.cdn.root_certificate else {
        return result;
    };

    if !config.cdn.allow_untrusted_root {
        result.add_warning(ValidationWarning::new(format!(
            "Root certificate {:?} is configured but allow-untrusted-root is off; it will not be used",
            root
        )));
        return result;
    }

    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        result.add_error(ValidationError::new(
            ErrorCategory::Certificate,
            format!("Root certificate not found: {:?}", root),
        ));
        return result;
    }

    match load_and_validate_cert(root).await {
        Ok(Some(expiry_warning)) => result.add_warning(expiry_warning),
        Ok(None) => {}
        Err(e) => result.add_error(e),
    }

    result
}

/// Load a certificate and check its expiry
async fn load_and_validate_cert(
    cert_path: &Path,
) -> Result<Option<ValidationWarning>, ValidationError> {
    let cert_pem = tokio::fs::read(cert_path).await.map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to read certificate {:?}: {}", cert_path, e),
        )
    })?;

    let pem = pem::parse(&cert_pem).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to parse certificate {:?}: {}", cert_path, e),
        )
    })?;

    let (_, cert) = x509_parser::parse_x509_certificate(pem.contents()).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Invalid X509 certificate {:?}: {}", cert_path, e),
        )
    })?;

    let now = SystemTime::now();
    let not_after = cert.validity().not_after.timestamp().max(0) as u64;
    let expiry_time = SystemTime::UNIX_EPOCH + Duration::from_secs(not_after);

    if expiry_time < now {
        return Err(ValidationError::new(
            ErrorCategory::Certificate,
            format!(
                "Root certificate expired: {:?} (expired at {})",
                cert_path,
                cert.validity().not_after
            ),
        ));
    }

    // Warn if expiring within 30 days
    let thirty_days = Duration::from_secs(30 * 86400);
    if expiry_time < now + thirty_days {
        return Ok(Some(ValidationWarning::new(format!(
            "Root certificate expires soon: {:?} (expires at {})",
            cert_path,
            cert.validity().not_after
        ))));
    }

    Ok(None)
}
