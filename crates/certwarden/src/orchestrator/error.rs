//! Orchestrator errors

use std::path::PathBuf;

use thiserror::Error;

use certwarden_common::{Subject, SubjectError};

use crate::acme::CaError;
use crate::cdn::CdnError;
use crate::jobs::JobStoreError;
use crate::ratelimit::BudgetError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The caller supplied an unusable domain
    #[error("invalid subject: {0}")]
    InvalidSubject(#[from] SubjectError),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Ca(#[from] CaError),

    #[error(transparent)]
    Cdn(#[from] CdnError),

    /// The configured root certificate could not be read
    #[error("failed to read root certificate {path}: {source}")]
    RootCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CA reported a certificate but holds no usable material for it
    #[error("no certificate material for '{0}'")]
    MissingCertificate(Subject),
}

impl OrchestratorError {
    /// Whether the caller, not the system, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, OrchestratorError::InvalidSubject(_))
    }
}
