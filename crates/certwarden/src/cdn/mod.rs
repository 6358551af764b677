//! CDN certificate store seam
//!
//! Uploading a certificate is three calls: store the private key, then create
//! or update the certificate bundle for the domain. Deployment to the edge is
//! asynchronous on the CDN side; [`CdnCertificateStore::check_deployment`]
//! resolves once the new certificate is served, or fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CdnError {
    /// The CDN API could not be reached
    #[error("CDN unavailable: {0}")]
    Unavailable(String),

    /// The CDN API rejected the request
    #[error("CDN request failed: {0}")]
    Request(String),

    /// The certificate did not reach the edge
    #[error("CDN deployment failed: {0}")]
    Deployment(String),
}

/// Certificate bundle as known to the CDN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnCertificate {
    pub id: String,
    /// Domains the certificate covers
    pub domains: Vec<String>,
}

/// TLS certificate management API of a CDN.
#[async_trait]
pub trait CdnCertificateStore: Send + Sync {
    /// Store a private key under `label`; returns the key id.
    async fn create_private_key(&self, key_pem: &str, label: &str) -> Result<String, CdnError>;

    /// Certificate currently attached to `domain`, if any.
    async fn get_certificate_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<CdnCertificate>, CdnError>;

    /// Create a certificate bundle, attached to `tls_configuration` when set.
    async fn create_certificate(
        &self,
        cert_pem: &str,
        chain_pem: &str,
        tls_configuration: Option<&str>,
    ) -> Result<CdnCertificate, CdnError>;

    /// Replace the bundle of an existing certificate.
    async fn update_certificate(
        &self,
        id: &str,
        cert_pem: &str,
        chain_pem: &str,
    ) -> Result<CdnCertificate, CdnError>;

    /// Resolves once `domain` serves the uploaded certificate.
    ///
    /// May take tens of minutes; callers bound it with a timeout.
    async fn check_deployment(&self, domain: &str) -> Result<(), CdnError>;
}
