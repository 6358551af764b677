//! Certwarden
//!
//! Issues TLS certificates through an ACME client, uploads them to a CDN and
//! tracks their deployment, while pacing issuance against a rate budget
//! shared by every instance.
//!
//! - **Rate limiting**: persisted leaky-bucket budget and a dispatch queue
//!   that waits for tokens
//! - **Jobs**: durable per-subject lifecycle records
//! - **Orchestration**: the state machine, CA event handling, upload and
//!   deployment steps, and boot reconciliation
//! - **Transport helpers**: HMAC request verification and the HTTP-01
//!   challenge responder
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certwarden::orchestrator::{CertificateOrchestrator, Collaborators, OrchestratorSettings};
//! use certwarden::ratelimit::{DispatchQueue, DispatchSettings, MemoryBudgetStore, RateBudget};
//!
//! let budget = RateBudget::new("limiter", config.budget.policy(), Arc::new(MemoryBudgetStore::new()));
//! let queue = DispatchQueue::new(budget, DispatchSettings::from(&config.dispatch));
//! let (orchestrator, report) = CertificateOrchestrator::start(
//!     Collaborators { jobs, ca, cdn },
//!     queue,
//!     OrchestratorSettings::from_config(&config),
//!     events,
//! )
//! .await?;
//!
//! orchestrator.add_domain("example.com").await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod auth;
pub mod cdn;
pub mod jobs;
pub mod orchestrator;
pub mod ratelimit;

// ============================================================================
// Public API Re-exports
// ============================================================================

pub use acme::{CaError, CaErrorKind, CaEvent, CertificateAuthority, CertificateInfo};
pub use auth::{AuthError, HmacVerifier};
pub use cdn::{CdnCertificate, CdnCertificateStore, CdnError};
pub use jobs::{CertificateJob, FileJobStore, JobStatus, JobStore, JobStoreError, MemoryJobStore};
pub use orchestrator::{
    AddDomainResponse, CertificateOrchestrator, ChallengeResponse, Collaborators, DomainStatus,
    OrchestratorError, OrchestratorSettings, ReconcileReport, RemoveDomainResponse,
};
pub use ratelimit::{
    BudgetError, BudgetStore, DispatchQueue, DispatchSettings, MemoryBudgetStore, RateBudget,
};

pub use certwarden_common::{Subject, SubjectError};
