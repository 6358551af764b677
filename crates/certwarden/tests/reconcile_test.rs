//! Boot reconciliation of persisted jobs

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use certwarden::jobs::{CertificateJob, JobStatus, JobStore, JobStoreError, MemoryJobStore, StatusCounts};
use certwarden::orchestrator::{OrchestratorError, ReconcileReport};
use certwarden_common::Subject;

use common::{certificate, subject, Fixture};

async fn seed(fixture: &Fixture, name: &str, status: JobStatus) {
    fixture.jobs.create(&subject(name), status).await.unwrap();
}

#[tokio::test]
async fn test_reconciliation_leaves_no_pending() {
    let fixture = Fixture::new(5);
    seed(&fixture, "a.example", JobStatus::Pending).await;
    seed(&fixture, "b.example", JobStatus::Pending).await;
    seed(&fixture, "c.example", JobStatus::Failed).await;
    // Hold dispatch so requeued jobs stay visible
    fixture.budget.block(Duration::from_secs(60)).await.unwrap();

    let h = fixture.start().await;

    assert_eq!(h.report.requeued_pending, 2);
    assert_eq!(h.report.requeued_failed, 1);
    assert_eq!(h.report.dispatched, 3);
    assert_eq!(h.count(JobStatus::Pending).await, 0);
    assert_eq!(h.count(JobStatus::Failed).await, 0);
    assert_eq!(h.count(JobStatus::Queued).await, 3);
}

#[tokio::test]
async fn test_requeued_jobs_are_dispatched() {
    let fixture = Fixture::new(5);
    seed(&fixture, "a.example", JobStatus::Pending).await;
    seed(&fixture, "b.example", JobStatus::Queued).await;

    let h = fixture.start().await;

    h.wait_for_count(JobStatus::Pending, 2).await;
    h.settle().await;
    assert_eq!(h.ca.added().len(), 2);
    assert_eq!(h.level().await, 2.0);
}

#[tokio::test]
async fn test_uploaded_job_resumes_deployment_without_reupload() {
    let fixture = Fixture::new(5);
    seed(&fixture, "example.com", JobStatus::Uploaded).await;
    fixture.ca.store_certificate(certificate(&subject("example.com")));

    let h = fixture.start().await;
    assert_eq!(h.report.resumed_deployments, 1);

    h.wait_for_status("example.com", JobStatus::Deployed).await;
    assert_eq!(h.cdn.checks(), 1);
    assert!(h.cdn.key_labels().is_empty());
    assert_eq!(h.cdn.created(), 0);
    assert_eq!(h.cdn.updated(), 0);
}

#[tokio::test]
async fn test_created_job_resumes_upload() {
    let fixture = Fixture::new(5);
    seed(&fixture, "example.com", JobStatus::Created).await;
    fixture.ca.store_certificate(certificate(&subject("example.com")));

    let h = fixture.start().await;
    assert_eq!(h.report.resumed_uploads, 1);

    h.wait_for_status("example.com", JobStatus::Deployed).await;
    assert_eq!(h.cdn.created(), 1);
    assert!(h.ca.added().is_empty());
}

#[tokio::test]
async fn test_failed_job_with_usable_certificate_recovers() {
    let fixture = Fixture::new(5);
    seed(&fixture, "good.example", JobStatus::Failed).await;
    seed(&fixture, "bad.example", JobStatus::Failed).await;
    fixture.ca.store_certificate(certificate(&subject("good.example")));

    let mut expired = certificate(&subject("bad.example"));
    expired.expires_at = Some(Utc::now() - ChronoDuration::days(1));
    fixture.ca.store_certificate(expired);
    fixture.budget.block(Duration::from_secs(60)).await.unwrap();

    let h = fixture.start().await;
    assert_eq!(h.report.recovered_failed, 1);
    assert_eq!(h.report.requeued_failed, 1);
    // Recovered jobs are uploaded once, as part of the CREATED pass
    assert_eq!(h.report.resumed_uploads, 1);

    h.wait_for_status("good.example", JobStatus::Deployed).await;
    assert_eq!(h.status("bad.example").await, Some(JobStatus::Queued));
    h.settle().await;
    assert_eq!(h.cdn.created(), 1);
}

#[tokio::test]
async fn test_deployed_and_removed_jobs_untouched() {
    let fixture = Fixture::new(5);
    seed(&fixture, "live.example", JobStatus::Deployed).await;
    seed(&fixture, "gone.example", JobStatus::Removed).await;

    let h = fixture.start().await;
    assert_eq!(h.report, ReconcileReport::default());

    h.settle().await;
    assert_eq!(h.status("live.example").await, Some(JobStatus::Deployed));
    assert_eq!(h.status("gone.example").await, Some(JobStatus::Removed));
    assert_eq!(h.level().await, 0.0);
}

/// Job store whose queries always fail.
struct BrokenStore {
    inner: MemoryJobStore,
}

#[async_trait]
impl JobStore for BrokenStore {
    async fn create(&self, subject: &Subject, status: JobStatus) -> Result<CertificateJob, JobStoreError> {
        self.inner.create(subject, status).await
    }

    async fn find_by_subject(&self, subject: &Subject) -> Result<Option<CertificateJob>, JobStoreError> {
        self.inner.find_by_subject(subject).await
    }

    async fn find_all_by_status(&self, _status: JobStatus) -> Result<Vec<CertificateJob>, JobStoreError> {
        Err(JobStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        )))
    }

    async fn set_status(&self, subject: &Subject, status: JobStatus) -> Result<CertificateJob, JobStoreError> {
        self.inner.set_status(subject, status).await
    }

    async fn set_status_unless(
        &self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        self.inner.set_status_unless(subject, status, unless).await
    }

    async fn find_or_create(&self, subject: &Subject, status: JobStatus) -> Result<CertificateJob, JobStoreError> {
        self.inner.find_or_create(subject, status).await
    }

    async fn find_or_create_unless(
        &self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        self.inner.find_or_create_unless(subject, status, unless).await
    }

    async fn claim_oldest(&self, from: JobStatus, to: JobStatus) -> Result<Option<CertificateJob>, JobStoreError> {
        self.inner.claim_oldest(from, to).await
    }

    async fn count_by_status(&self) -> Result<StatusCounts, JobStoreError> {
        self.inner.count_by_status().await
    }
}

#[tokio::test]
async fn test_store_failure_aborts_start() {
    let fixture = Fixture::with_jobs(
        5,
        Arc::new(BrokenStore {
            inner: MemoryJobStore::new(),
        }),
    );

    let Err(err) = fixture.try_start().await else {
        panic!("start should fail when the job store is unreadable");
    };
    assert!(matches!(err, OrchestratorError::Store(_)));
}
