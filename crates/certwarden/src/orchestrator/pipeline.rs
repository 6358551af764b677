//! Upload to the CDN and deployment confirmation

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use certwarden_common::Subject;

use super::{CertificateOrchestrator, OrchestratorError};
use crate::jobs::JobStatus;

impl CertificateOrchestrator {
    /// Upload the CA's certificate for `subject` in the background.
    pub(super) fn spawn_upload(&self, subject: Subject) {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run_upload(&subject).await });
    }

    /// Watch the CDN deployment of `subject` in the background.
    pub(super) fn spawn_deployment_check(&self, subject: Subject) {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run_deployment_check(&subject).await });
    }

    async fn run_upload(&self, subject: &Subject) {
        match self.upload(subject).await {
            Ok(true) => self.spawn_deployment_check(subject.clone()),
            Ok(false) => {
                info!(subject = %subject, "Domain was removed, not deploying");
            }
            Err(e) => {
                error!(subject = %subject, error = %e, "Failed to upload certificate to CDN");
                self.mark_failed(subject).await;
            }
        }
    }

    /// Returns `false` when the domain was removed before the upload finished.
    async fn upload(&self, subject: &Subject) -> Result<bool, OrchestratorError> {
        if self.is_removed(subject).await? {
            return Ok(false);
        }

        let info = self
            .inner
            .ca
            .get(subject)
            .await?
            .filter(|info| !info.cert_pem.trim().is_empty())
            .ok_or_else(|| OrchestratorError::MissingCertificate(subject.clone()))?;

        let cdn = &self.inner.cdn;

        let label = format!("{}-{}", subject, Utc::now().to_rfc3339());
        let key_id = cdn.create_private_key(&info.privkey_pem, &label).await?;
        debug!(subject = %subject, key_id = %key_id, "Uploaded private key");

        let chain = match self.inner.settings.untrusted_root_pem.as_deref() {
            Some(root) => format!("{}\n{}", info.chain_pem.trim_end(), root.trim()),
            None => info.chain_pem.clone(),
        };

        let certificate = match cdn.get_certificate_by_domain(subject.as_str()).await? {
            Some(existing) => {
                debug!(subject = %subject, certificate_id = %existing.id, "Replacing existing CDN certificate");
                cdn.update_certificate(&existing.id, &info.cert_pem, &chain)
                    .await?
            }
            None => {
                cdn.create_certificate(
                    &info.cert_pem,
                    &chain,
                    self.inner.settings.tls_configuration.as_deref(),
                )
                .await?
            }
        };

        let updated = self
            .inner
            .jobs
            .set_status_unless(subject, JobStatus::Uploaded, JobStatus::Removed)
            .await?;
        if updated.is_none() {
            return Ok(false);
        }
        info!(
            subject = %subject,
            certificate_id = %certificate.id,
            status = %JobStatus::Uploaded,
            "Job status changed"
        );
        Ok(true)
    }

    async fn is_removed(&self, subject: &Subject) -> Result<bool, OrchestratorError> {
        let job = self.inner.jobs.find_by_subject(subject).await?;
        Ok(matches!(job, Some(job) if job.status == JobStatus::Removed))
    }

    async fn run_deployment_check(&self, subject: &Subject) {
        let limit = self.inner.settings.deployment_timeout;
        debug!(subject = %subject, timeout_secs = limit.as_secs(), "Checking CDN deployment");

        match timeout(limit, self.inner.cdn.check_deployment(subject.as_str())).await {
            Ok(Ok(())) => {
                self.set_status_logged(subject, JobStatus::Deployed).await;
            }
            Ok(Err(e)) => {
                error!(subject = %subject, error = %e, "CDN deployment failed");
                self.mark_failed(subject).await;
            }
            Err(_) => {
                error!(
                    subject = %subject,
                    timeout_secs = limit.as_secs(),
                    "CDN deployment check timed out"
                );
                self.mark_failed(subject).await;
            }
        }
    }
}
