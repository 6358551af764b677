//! Job store trait and the table logic shared by the built-in stores

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use certwarden_common::Subject;

use super::{CertificateJob, JobStatus, JobStoreError};

/// Number of jobs in each status
pub type StatusCounts = BTreeMap<JobStatus, usize>;

/// Durable, queryable home of certificate jobs.
///
/// Subjects are unique. Every write bumps the job's `updated_at` and
/// `revision`, which together order work oldest-first.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with [`JobStoreError::Duplicate`] if one exists.
    async fn create(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError>;

    async fn find_by_subject(
        &self,
        subject: &Subject,
    ) -> Result<Option<CertificateJob>, JobStoreError>;

    /// All jobs in `status`, oldest first.
    async fn find_all_by_status(
        &self,
        status: JobStatus,
    ) -> Result<Vec<CertificateJob>, JobStoreError>;

    /// Overwrite the status of an existing job.
    async fn set_status(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError>;

    /// Overwrite the status of an existing job unless it is currently in
    /// `unless`. Returns `None` when the write was skipped.
    async fn set_status_unless(
        &self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError>;

    /// Ensure a job exists in `status`, creating it or overwriting its status.
    async fn find_or_create(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError>;

    /// Like [`find_or_create`](Self::find_or_create), but an existing job in
    /// `unless` is left alone and `None` returned.
    async fn find_or_create_unless(
        &self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError>;

    /// Atomically move the oldest job in `from` to `to` and return it.
    ///
    /// Two concurrent claims never return the same job.
    async fn claim_oldest(
        &self,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError>;

    async fn count_by_status(&self) -> Result<StatusCounts, JobStoreError>;
}

/// In-memory table of jobs. Callers provide locking and persistence.
#[derive(Debug, Default)]
pub(crate) struct JobTable {
    jobs: HashMap<Subject, CertificateJob>,
    revision: u64,
}

impl JobTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Load a previously persisted job, keeping the revision counter ahead of it.
    pub(crate) fn restore(&mut self, job: CertificateJob) {
        self.revision = self.revision.max(job.revision);
        self.jobs.insert(job.subject.clone(), job);
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    pub(crate) fn create(
        &mut self,
        subject: &Subject,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<CertificateJob, JobStoreError> {
        if self.jobs.contains_key(subject) {
            return Err(JobStoreError::Duplicate(subject.clone()));
        }

        let job = CertificateJob {
            subject: subject.clone(),
            status,
            created_at: now,
            updated_at: now,
            revision: self.next_revision(),
        };
        self.jobs.insert(subject.clone(), job.clone());
        Ok(job)
    }

    pub(crate) fn get(&self, subject: &Subject) -> Option<CertificateJob> {
        self.jobs.get(subject).cloned()
    }

    pub(crate) fn by_status(&self, status: JobStatus) -> Vec<CertificateJob> {
        let mut jobs: Vec<CertificateJob> = self
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(CertificateJob::order_key);
        jobs
    }

    pub(crate) fn set_status(
        &mut self,
        subject: &Subject,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<CertificateJob, JobStoreError> {
        let revision = self.next_revision();
        let job = self
            .jobs
            .get_mut(subject)
            .ok_or_else(|| JobStoreError::NotFound(subject.clone()))?;

        job.status = status;
        // Keep updated_at monotonic per job even if the wall clock steps back
        job.updated_at = now.max(job.updated_at);
        job.revision = revision;
        Ok(job.clone())
    }

    pub(crate) fn set_status_unless(
        &mut self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        match self.jobs.get(subject) {
            None => Err(JobStoreError::NotFound(subject.clone())),
            Some(job) if job.status == unless => Ok(None),
            Some(_) => self.set_status(subject, status, now).map(Some),
        }
    }

    pub(crate) fn find_or_create_unless(
        &mut self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
        now: DateTime<Utc>,
    ) -> Option<CertificateJob> {
        if matches!(self.jobs.get(subject), Some(job) if job.status == unless) {
            return None;
        }
        Some(self.find_or_create(subject, status, now))
    }

    /// Put back the entry observed before a failed write; `None` removes it.
    pub(crate) fn revert(&mut self, subject: &Subject, previous: Option<CertificateJob>) {
        match previous {
            Some(job) => {
                self.jobs.insert(subject.clone(), job);
            }
            None => {
                self.jobs.remove(subject);
            }
        }
    }

    pub(crate) fn find_or_create(
        &mut self,
        subject: &Subject,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> CertificateJob {
        match self.set_status(subject, status, now) {
            Ok(job) => job,
            Err(_) => {
                let job = CertificateJob {
                    subject: subject.clone(),
                    status,
                    created_at: now,
                    updated_at: now,
                    revision: self.next_revision(),
                };
                self.jobs.insert(subject.clone(), job.clone());
                job
            }
        }
    }

    pub(crate) fn claim_oldest(
        &mut self,
        from: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Option<CertificateJob> {
        let subject = self.oldest(from)?.subject;
        self.set_status(&subject, to, now).ok()
    }

    /// Longest-waiting job in `status`.
    pub(crate) fn oldest(&self, status: JobStatus) -> Option<CertificateJob> {
        self.jobs
            .values()
            .filter(|job| job.status == status)
            .min_by_key(|job| job.order_key())
            .cloned()
    }

    pub(crate) fn counts(&self) -> StatusCounts {
        let mut counts: StatusCounts = JobStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for job in self.jobs.values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        counts
    }
}
