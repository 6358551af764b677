//! Certificate authority seam
//!
//! The orchestrator never speaks ACME itself. It drives a
//! [`CertificateAuthority`] client through four calls and reacts to the
//! [`CaEvent`]s that client emits as orders complete, renew or fail.
//!
//! # Event Flow
//!
//! 1. The orchestrator calls [`CertificateAuthority::add`] with a subject
//! 2. The client places an order and serves HTTP-01 challenges through
//!    [`CertificateAuthority::get_challenge`] (see [`ChallengeResponder`])
//! 3. Once validated, the client emits [`CaEvent::Issued`]
//! 4. Later renewals emit [`CaEvent::Renewed`]; failures emit [`CaEvent::Error`]

mod challenge;
mod error;

pub use challenge::{ChallengeReply, ChallengeResponder, ACME_CHALLENGE_PREFIX};
pub use error::CaError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use certwarden_common::Subject;

/// Certificate material held by the CA client for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    pub subject: Subject,
    #[serde(default)]
    pub altnames: Vec<String>,
    /// Leaf certificate (PEM)
    #[serde(default)]
    pub cert_pem: String,
    /// Intermediate chain (PEM)
    #[serde(default)]
    pub chain_pem: String,
    /// Private key (PEM); never serialized
    #[serde(skip_serializing, default)]
    pub privkey_pem: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CertificateInfo {
    /// True when a certificate is present and not yet expired at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.cert_pem.trim().is_empty() && self.expires_at.map_or(true, |at| at > now)
    }
}

/// Client of an ACME certificate authority.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Request a certificate for `subject` covering `altnames`.
    ///
    /// Returns once the order is accepted; completion arrives as a
    /// [`CaEvent`].
    async fn add(&self, subject: &Subject, altnames: &[Subject]) -> Result<(), CaError>;

    /// Certificate material currently held for `subject`.
    async fn get(&self, subject: &Subject) -> Result<Option<CertificateInfo>, CaError>;

    /// Mark the subject deleted so it is no longer renewed.
    async fn remove(&self, subject: &Subject) -> Result<(), CaError>;

    /// Key authorization for a pending HTTP-01 challenge.
    async fn get_challenge(&self, subject: &Subject, token: &str)
        -> Result<Option<String>, CaError>;
}

/// Lifecycle notifications from the CA client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaEvent {
    /// First certificate issued for the subject
    Issued { subject: Subject },
    /// An existing certificate was renewed
    Renewed { subject: Subject },
    /// An order failed
    Error { subject: Subject, kind: CaErrorKind },
}

impl CaEvent {
    pub fn subject(&self) -> &Subject {
        match self {
            CaEvent::Issued { subject }
            | CaEvent::Renewed { subject }
            | CaEvent::Error { subject, .. } => subject,
        }
    }
}

/// Classification of a CA order failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaErrorKind {
    /// The subject does not resolve
    DnsResolution,
    /// The CA could not verify the challenge
    VerificationFailed,
    /// The CA refused new orders for now
    OrderRateLimited,
    /// Anything else
    Other(String),
}

impl CaErrorKind {
    /// Map an ACME client error code (or ACME problem type) to a kind.
    pub fn from_code(code: &str) -> Self {
        let short = code
            .strip_prefix("urn:ietf:params:acme:error:")
            .unwrap_or(code);

        match short {
            "E_DNS" | "E_NO_DNS" | "ENOTFOUND" | "EAI_AGAIN" | "dns" => CaErrorKind::DnsResolution,
            "E_FAIL_DRY_CHALLENGE" | "E_ACME_CHALLENGE" | "E_CHALLENGE_INVALID"
            | "unauthorized" | "incorrectResponse" | "connection" => {
                CaErrorKind::VerificationFailed
            }
            "E_ORDER_RATE_LIMIT" | "rateLimited" => CaErrorKind::OrderRateLimited,
            other => CaErrorKind::Other(other.to_string()),
        }
    }
}
