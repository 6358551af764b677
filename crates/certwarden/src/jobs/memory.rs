//! In-memory job store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use certwarden_common::Subject;

use super::store::{JobStore, JobTable, StatusCounts};
use super::{CertificateJob, JobStatus, JobStoreError};

/// Job store held entirely in process memory.
///
/// Used in tests and single-shot tools; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    table: Mutex<JobTable>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError> {
        self.table.lock().create(subject, status, Utc::now())
    }

    async fn find_by_subject(
        &self,
        subject: &Subject,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        Ok(self.table.lock().get(subject))
    }

    async fn find_all_by_status(
        &self,
        status: JobStatus,
    ) -> Result<Vec<CertificateJob>, JobStoreError> {
        Ok(self.table.lock().by_status(status))
    }

    async fn set_status(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError> {
        self.table.lock().set_status(subject, status, Utc::now())
    }

    async fn set_status_unless(
        &self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        self.table
            .lock()
            .set_status_unless(subject, status, unless, Utc::now())
    }

    async fn find_or_create(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError> {
        Ok(self.table.lock().find_or_create(subject, status, Utc::now()))
    }

    async fn find_or_create_unless(
        &self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        Ok(self
            .table
            .lock()
            .find_or_create_unless(subject, status, unless, Utc::now()))
    }

    async fn claim_oldest(
        &self,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        Ok(self.table.lock().claim_oldest(from, to, Utc::now()))
    }

    async fn count_by_status(&self) -> Result<StatusCounts, JobStoreError> {
        Ok(self.table.lock().counts())
    }
}
