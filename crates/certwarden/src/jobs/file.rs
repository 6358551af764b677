//! File-backed job store
//!
//! # Directory Structure
//!
//! ```text
//! jobs/
//! ├── example.com.json
//! └── www.example.com.json
//! ```
//!
//! Each file holds one serialized [`CertificateJob`]. Files are written to a
//! temporary name and renamed into place, so a crash leaves either the old or
//! the new document. The directory is `0700` and every file `0600` on Unix.
//!
//! The whole table is loaded at open and kept in memory; the store assumes it
//! is the only writer of its directory. A write that fails to reach disk is
//! undone in memory as well.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use certwarden_common::Subject;

use super::store::{JobStore, JobTable, StatusCounts};
use super::{CertificateJob, JobStatus, JobStoreError};

const JOB_EXTENSION: &str = "json";

/// Job store persisting one JSON document per subject.
#[derive(Debug)]
pub struct FileJobStore {
    base_path: PathBuf,
    /// Held across the file write so claims stay atomic
    table: Mutex<JobTable>,
}

impl FileJobStore {
    /// Open (creating if needed) the store at `base_path` and load every job.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or any job file is unreadable.
    pub async fn open(base_path: impl AsRef<Path>) -> Result<Self, JobStoreError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&base_path, std::fs::Permissions::from_mode(0o700)).await?;
        }

        let mut table = JobTable::new();
        let mut entries = fs::read_dir(&base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(JOB_EXTENSION) {
                continue;
            }

            let content = fs::read_to_string(&path).await?;
            let job: CertificateJob =
                serde_json::from_str(&content).map_err(|e| JobStoreError::Corrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            trace!(subject = %job.subject, status = %job.status, "Loaded job");
            table.restore(job);
        }

        info!(
            storage_path = %base_path.display(),
            jobs = table.len(),
            "Opened file job store"
        );

        Ok(Self {
            base_path,
            table: Mutex::new(table),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn job_path(&self, subject: &Subject) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", subject.as_str(), JOB_EXTENSION))
    }

    /// Persist `job`, restoring `previous` in memory if the write fails.
    async fn commit(
        &self,
        table: &mut JobTable,
        previous: Option<CertificateJob>,
        job: &CertificateJob,
    ) -> Result<(), JobStoreError> {
        if let Err(e) = self.persist(job).await {
            warn!(subject = %job.subject, error = %e, "Failed to persist job, reverting");
            table.revert(&job.subject, previous);
            return Err(e);
        }
        Ok(())
    }

    async fn persist(&self, job: &CertificateJob) -> Result<(), JobStoreError> {
        let path = self.job_path(&job.subject);
        let tmp_path = path.with_extension(format!("{}.tmp", JOB_EXTENSION));
        let content = serde_json::to_string_pretty(job)?;

        fs::write(&tmp_path, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        fs::rename(&tmp_path, &path).await?;
        debug!(subject = %job.subject, status = %job.status, "Persisted job");
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError> {
        let mut table = self.table.lock().await;
        let job = table.create(subject, status, Utc::now())?;
        self.commit(&mut table, None, &job).await?;
        Ok(job)
    }

    async fn find_by_subject(
        &self,
        subject: &Subject,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        Ok(self.table.lock().await.get(subject))
    }

    async fn find_all_by_status(
        &self,
        status: JobStatus,
    ) -> Result<Vec<CertificateJob>, JobStoreError> {
        Ok(self.table.lock().await.by_status(status))
    }

    async fn set_status(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError> {
        let mut table = self.table.lock().await;
        let previous = table.get(subject);
        let job = table.set_status(subject, status, Utc::now())?;
        self.commit(&mut table, previous, &job).await?;
        Ok(job)
    }

    async fn set_status_unless(
        &self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        let mut table = self.table.lock().await;
        let previous = table.get(subject);
        match table.set_status_unless(subject, status, unless, Utc::now())? {
            Some(job) => {
                self.commit(&mut table, previous, &job).await?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn find_or_create(
        &self,
        subject: &Subject,
        status: JobStatus,
    ) -> Result<CertificateJob, JobStoreError> {
        let mut table = self.table.lock().await;
        let previous = table.get(subject);
        let job = table.find_or_create(subject, status, Utc::now());
        self.commit(&mut table, previous, &job).await?;
        Ok(job)
    }

    async fn find_or_create_unless(
        &self,
        subject: &Subject,
        status: JobStatus,
        unless: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        let mut table = self.table.lock().await;
        let previous = table.get(subject);
        match table.find_or_create_unless(subject, status, unless, Utc::now()) {
            Some(job) => {
                self.commit(&mut table, previous, &job).await?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn claim_oldest(
        &self,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Option<CertificateJob>, JobStoreError> {
        let mut table = self.table.lock().await;
        let Some(previous) = table.oldest(from) else {
            return Ok(None);
        };
        let job = table.set_status(&previous.subject, to, Utc::now())?;
        self.commit(&mut table, Some(previous), &job).await?;
        Ok(Some(job))
    }

    async fn count_by_status(&self) -> Result<StatusCounts, JobStoreError> {
        Ok(self.table.lock().await.counts())
    }
}
