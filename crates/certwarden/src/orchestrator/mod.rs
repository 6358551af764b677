//! Certificate orchestrator
//!
//! Drives each subject through issuance, upload and deployment:
//!
//! | State | Entered from | Exits to |
//! |---|---|---|
//! | QUEUED | `add_domain`; boot reset of PENDING/FAILED | PENDING |
//! | PENDING | QUEUED (token granted, atomically claimed) | CREATED, FAILED |
//! | CREATED | PENDING; issued/renewed event; FAILED with a valid certificate at boot | UPLOADED, FAILED |
//! | UPLOADED | CREATED | DEPLOYED, FAILED |
//! | DEPLOYED | UPLOADED | FAILED |
//! | FAILED | any | QUEUED or CREATED at boot |
//! | REMOVED | any (`remove_domain`) | QUEUED (`add_domain`) |
//!
//! Work that waits (token acquisition, upload, deployment confirmation) runs
//! in spawned tasks. Callers of the public API never wait on it. Background
//! transitions never overwrite REMOVED.

mod dispatch;
mod error;
mod events;
mod pipeline;
mod reconcile;

pub use error::OrchestratorError;
pub use reconcile::ReconcileReport;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use certwarden_common::Subject;
use certwarden_config::Config;

use crate::acme::{CaEvent, CertificateAuthority, CertificateInfo};
use crate::cdn::CdnCertificateStore;
use crate::jobs::{JobStatus, JobStore, JobStoreError};
use crate::ratelimit::DispatchQueue;

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Budget cooldown after the CA reports an order rate limit
    pub block_duration: Duration,
    /// Upper bound on one deployment check
    pub deployment_timeout: Duration,
    /// Root certificate (PEM) appended to uploaded chains from untrusted CAs
    pub untrusted_root_pem: Option<String>,
    /// CDN TLS configuration new certificates are attached to
    pub tls_configuration: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorSettings {
    /// Settings from configuration without touching the filesystem.
    /// [`untrusted_root_pem`](Self::untrusted_root_pem) stays unset; use
    /// [`load`](Self::load) to read it.
    pub fn from_config(config: &Config) -> Self {
        Self {
            block_duration: config.budget.block_duration(),
            deployment_timeout: config.deployment.timeout(),
            untrusted_root_pem: None,
            tls_configuration: config.cdn.tls_configuration.clone(),
        }
    }

    /// Settings from configuration, reading the root certificate when
    /// untrusted roots are allowed.
    pub async fn load(config: &Config) -> Result<Self, OrchestratorError> {
        let mut settings = Self::from_config(config);

        if config.cdn.allow_untrusted_root {
            if let Some(path) = &config.cdn.root_certificate {
                let pem = tokio::fs::read_to_string(path).await.map_err(|source| {
                    OrchestratorError::RootCertificate {
                        path: path.clone(),
                        source,
                    }
                })?;
                debug!(path = %path.display(), "Loaded untrusted root certificate");
                settings.untrusted_root_pem = Some(pem);
            }
        }

        Ok(settings)
    }
}

/// External collaborators of the orchestrator
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobStore>,
    pub ca: Arc<dyn CertificateAuthority>,
    pub cdn: Arc<dyn CdnCertificateStore>,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDomainResponse {
    pub success: bool,
    pub message: String,
}

/// A job as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    pub subject: Subject,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Live CA material, attached when the job is CREATED or DEPLOYED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveDomainResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub key_authorization: String,
}

// ============================================================================
// Orchestrator
// ============================================================================

struct Inner {
    jobs: Arc<dyn JobStore>,
    ca: Arc<dyn CertificateAuthority>,
    cdn: Arc<dyn CdnCertificateStore>,
    queue: DispatchQueue,
    settings: OrchestratorSettings,
}

/// Handle to a running orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct CertificateOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CertificateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateOrchestrator")
            .field("queue", &self.inner.queue)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl CertificateOrchestrator {
    /// Reconcile persisted jobs, then start consuming CA events.
    ///
    /// The handle is returned only after reconciliation has completed. A job
    /// store failure during reconciliation aborts start-up.
    pub async fn start(
        collaborators: Collaborators,
        queue: DispatchQueue,
        settings: OrchestratorSettings,
        events: mpsc::Receiver<CaEvent>,
    ) -> Result<(Self, ReconcileReport), OrchestratorError> {
        let orchestrator = Self {
            inner: Arc::new(Inner {
                jobs: collaborators.jobs,
                ca: collaborators.ca,
                cdn: collaborators.cdn,
                queue,
                settings,
            }),
        };

        let report = orchestrator.reconcile().await?;
        info!(
            requeued_failed = report.requeued_failed,
            recovered_failed = report.recovered_failed,
            requeued_pending = report.requeued_pending,
            resumed_deployments = report.resumed_deployments,
            resumed_uploads = report.resumed_uploads,
            dispatched = report.dispatched,
            "Boot reconciliation complete"
        );

        let event_loop = orchestrator.clone();
        tokio::spawn(async move { event_loop.run_events(events).await });

        Ok((orchestrator, report))
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.inner.queue
    }

    /// Queue issuance for a domain.
    ///
    /// An existing job (in any state) is reset to QUEUED. Returns as soon as
    /// the job is stored; issuance happens in the background.
    pub async fn add_domain(&self, domain: &str) -> Result<AddDomainResponse, OrchestratorError> {
        let subject = Subject::parse(domain)?;

        let job = self
            .inner
            .jobs
            .find_or_create(&subject, JobStatus::Queued)
            .await?;
        info!(subject = %job.subject, "Queued certificate job");

        self.spawn_dispatch();

        Ok(AddDomainResponse {
            success: true,
            message: format!("Queued certificate for {}", subject),
        })
    }

    /// Current job for a domain, with certificate material when issued.
    pub async fn get_domain(&self, domain: &str) -> Result<Option<DomainStatus>, OrchestratorError> {
        let subject = Subject::parse(domain)?;

        let Some(job) = self.inner.jobs.find_by_subject(&subject).await? else {
            return Ok(None);
        };

        let certificate = if job.status.has_certificate() {
            match self.inner.ca.get(&subject).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(subject = %subject, error = %e, "Failed to read certificate from CA");
                    None
                }
            }
        } else {
            None
        };

        Ok(Some(DomainStatus {
            subject: job.subject,
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            certificate,
        }))
    }

    /// Stop managing a domain: the CA record is deleted and the job marked
    /// REMOVED.
    pub async fn remove_domain(
        &self,
        domain: &str,
    ) -> Result<RemoveDomainResponse, OrchestratorError> {
        let subject = Subject::parse(domain)?;

        self.inner.ca.remove(&subject).await?;

        match self
            .inner
            .jobs
            .set_status(&subject, JobStatus::Removed)
            .await
        {
            Ok(_) | Err(JobStoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        info!(subject = %subject, "Removed domain");

        Ok(RemoveDomainResponse { success: true })
    }

    /// Key authorization for an HTTP-01 challenge.
    pub async fn get_challenge(
        &self,
        domain: &str,
        token: &str,
    ) -> Result<Option<ChallengeResponse>, OrchestratorError> {
        let subject = Subject::parse(domain)?;

        let key_authorization = self.inner.ca.get_challenge(&subject, token).await?;
        Ok(key_authorization.map(|key_authorization| ChallengeResponse { key_authorization }))
    }

    /// Move a job to `status` from background work, logging instead of
    /// failing. Removed jobs are left alone.
    async fn set_status_logged(&self, subject: &Subject, status: JobStatus) -> bool {
        match self
            .inner
            .jobs
            .set_status_unless(subject, status, JobStatus::Removed)
            .await
        {
            Ok(Some(_)) => {
                info!(subject = %subject, status = %status, "Job status changed");
                true
            }
            Ok(None) => {
                debug!(subject = %subject, status = %status, "Domain was removed, status not changed");
                false
            }
            Err(e) => {
                warn!(
                    subject = %subject,
                    status = %status,
                    error = %e,
                    "Failed to update job status"
                );
                false
            }
        }
    }

    async fn mark_failed(&self, subject: &Subject) {
        self.set_status_logged(subject, JobStatus::Failed).await;
    }
}
