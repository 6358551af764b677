//! Boot reconciliation
//!
//! Rebuilds in-flight work from the job store after a restart. Runs once,
//! before any CA event is consumed.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{CertificateOrchestrator, OrchestratorError};
use crate::jobs::JobStatus;

/// What reconciliation found and restarted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// FAILED jobs sent back to the queue
    pub requeued_failed: usize,
    /// FAILED jobs whose certificate is usable, moved to CREATED
    pub recovered_failed: usize,
    /// PENDING jobs whose order was lost with the previous process
    pub requeued_pending: usize,
    /// UPLOADED jobs whose deployment check was restarted
    pub resumed_deployments: usize,
    /// CREATED jobs whose upload was restarted
    pub resumed_uploads: usize,
    /// Dispatch requests queued for QUEUED jobs
    pub dispatched: usize,
}

impl CertificateOrchestrator {
    pub(super) async fn reconcile(&self) -> Result<ReconcileReport, OrchestratorError> {
        let jobs = &self.inner.jobs;
        let mut report = ReconcileReport::default();

        // FAILED: recover if the CA still holds a valid certificate
        for job in jobs.find_all_by_status(JobStatus::Failed).await? {
            let usable = match self.inner.ca.get(&job.subject).await {
                Ok(Some(info)) => info.is_usable(Utc::now()),
                Ok(None) => false,
                Err(e) => {
                    warn!(subject = %job.subject, error = %e, "Failed to query CA, requeueing");
                    false
                }
            };

            if usable {
                // Uploaded with the other CREATED jobs below
                jobs.set_status(&job.subject, JobStatus::Created).await?;
                report.recovered_failed += 1;
            } else {
                jobs.set_status(&job.subject, JobStatus::Queued).await?;
                report.requeued_failed += 1;
            }
        }

        // PENDING: the order never completed
        for job in jobs.find_all_by_status(JobStatus::Pending).await? {
            jobs.set_status(&job.subject, JobStatus::Queued).await?;
            report.requeued_pending += 1;
        }

        // UPLOADED: only the deployment check is missing
        for job in jobs.find_all_by_status(JobStatus::Uploaded).await? {
            debug!(subject = %job.subject, "Resuming deployment check");
            self.spawn_deployment_check(job.subject);
            report.resumed_deployments += 1;
        }

        // CREATED: upload again
        for job in jobs.find_all_by_status(JobStatus::Created).await? {
            debug!(subject = %job.subject, "Resuming upload");
            self.spawn_upload(job.subject);
            report.resumed_uploads += 1;
        }

        // QUEUED: one dispatch request each
        let queued = jobs.find_all_by_status(JobStatus::Queued).await?;
        for _ in &queued {
            self.spawn_dispatch();
        }
        report.dispatched = queued.len();

        info!(backlog = report.dispatched, "Initialised dispatch backlog");
        Ok(report)
    }
}
