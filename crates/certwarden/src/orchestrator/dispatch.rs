//! Token-gated dispatch of queued jobs

use chrono::Utc;
use tracing::{debug, error, info, warn};

use certwarden_common::Subject;

use super::CertificateOrchestrator;
use crate::jobs::JobStatus;

impl CertificateOrchestrator {
    /// Queue one dispatch request in the background.
    ///
    /// Each request is a capacity reservation, not bound to a particular
    /// subject: when its token is granted it takes whichever job has waited
    /// longest.
    pub(super) fn spawn_dispatch(&self) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator
                .inner
                .queue
                .request(|| orchestrator.dispatch_next())
                .await
        });
    }

    /// Run once per granted token.
    async fn dispatch_next(&self) {
        let job = match self
            .inner
            .jobs
            .claim_oldest(JobStatus::Queued, JobStatus::Pending)
            .await
        {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!("No queued job for granted token");
                self.return_token().await;
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to claim queued job");
                self.return_token().await;
                return;
            }
        };

        let subject = job.subject;
        info!(subject = %subject, "Dispatching certificate request");

        match self.inner.ca.get(&subject).await {
            Ok(Some(existing)) if existing.is_usable(Utc::now()) => {
                info!(subject = %subject, "CA already holds a certificate, skipping issuance");
                self.on_certificate_created(&subject).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    subject = %subject,
                    error = %e,
                    "Failed to look up existing certificate, requesting a new one"
                );
            }
        }

        self.request_issuance(&subject).await;
    }

    async fn request_issuance(&self, subject: &Subject) {
        match self
            .inner
            .ca
            .add(subject, std::slice::from_ref(subject))
            .await
        {
            Ok(()) => info!(subject = %subject, "Requested certificate issuance"),
            Err(e) => {
                error!(subject = %subject, error = %e, "Certificate request rejected");
                self.mark_failed(subject).await;
            }
        }
    }

    /// Give a token back to the budget.
    pub(super) async fn return_token(&self) {
        if let Err(e) = self.inner.queue.budget().reward(1).await {
            warn!(error = %e, "Failed to return token to budget");
        }
    }
}
