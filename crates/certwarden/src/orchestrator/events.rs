//! CA event handling

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use certwarden_common::Subject;

use super::CertificateOrchestrator;
use crate::acme::{CaErrorKind, CaEvent};
use crate::jobs::JobStatus;

impl CertificateOrchestrator {
    /// Consume events until every sender is dropped.
    pub(super) async fn run_events(&self, mut events: mpsc::Receiver<CaEvent>) {
        info!("Listening for CA events");
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("CA event stream closed");
    }

    pub(super) async fn handle_event(&self, event: CaEvent) {
        match event {
            CaEvent::Issued { subject } => {
                info!(subject = %subject, "Certificate issued");
                self.on_certificate_created(&subject).await;
            }
            CaEvent::Renewed { subject } => {
                // Renewals spend CA capacity outside the dispatch queue
                info!(subject = %subject, "Certificate renewed, charging budget");
                if let Err(e) = self.inner.queue.budget().penalty(1).await {
                    error!(subject = %subject, error = %e, "Failed to charge budget for renewal");
                }
                self.on_certificate_created(&subject).await;
            }
            CaEvent::Error { subject, kind } => self.on_ca_error(&subject, kind).await,
        }
    }

    /// Record that the CA holds a certificate and start the upload.
    ///
    /// Removed domains stay removed.
    pub(super) async fn on_certificate_created(&self, subject: &Subject) {
        match self
            .inner
            .jobs
            .find_or_create_unless(subject, JobStatus::Created, JobStatus::Removed)
            .await
        {
            Ok(Some(_)) => {
                info!(subject = %subject, status = %JobStatus::Created, "Job status changed");
                self.spawn_upload(subject.clone());
            }
            Ok(None) => {
                info!(subject = %subject, "Ignoring certificate for removed domain");
            }
            Err(e) => {
                error!(subject = %subject, error = %e, "Failed to record issued certificate");
            }
        }
    }

    async fn on_ca_error(&self, subject: &Subject, kind: CaErrorKind) {
        match kind {
            CaErrorKind::DnsResolution | CaErrorKind::VerificationFailed => {
                warn!(subject = %subject, kind = ?kind, "Certificate order failed");
                self.mark_failed(subject).await;

                if let Err(e) = self.inner.ca.remove(subject).await {
                    warn!(subject = %subject, error = %e, "Failed to remove subject from CA");
                }

                // Failed validations do not count against the CA's order limit
                self.return_token().await;
            }
            CaErrorKind::OrderRateLimited => {
                let duration = self.inner.settings.block_duration;
                warn!(
                    subject = %subject,
                    block_secs = duration.as_secs(),
                    "CA order rate limit reached, blocking budget"
                );
                if let Err(e) = self.inner.queue.budget().block(duration).await {
                    error!(error = %e, "Failed to block budget");
                }
            }
            CaErrorKind::Other(reason) => {
                warn!(subject = %subject, reason = %reason, "Unhandled CA error");
            }
        }
    }
}
