//! Certificate job persistence
//!
//! One [`CertificateJob`] per subject records where that subject is in the
//! issuance lifecycle:
//!
//! ```text
//! QUEUED -> PENDING -> CREATED -> UPLOADED -> DEPLOYED
//!                 \________\__________\___________\-> FAILED
//! ```
//!
//! The store is the single source of truth for outstanding work. Anything the
//! orchestrator holds in memory can be re-derived from it after a restart.

mod error;
mod file;
mod memory;
mod store;

pub use error::JobStoreError;
pub use file::FileJobStore;
pub use memory::MemoryJobStore;
pub use store::{JobStore, StatusCounts};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use certwarden_common::Subject;

/// Lifecycle state of a certificate job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for an issuance token
    Queued,
    /// Token granted, order placed with the CA
    Pending,
    /// The CA holds a certificate; not yet on the CDN
    Created,
    /// Certificate uploaded to the CDN, deployment not confirmed
    Uploaded,
    /// Serving on the CDN
    Deployed,
    Failed,
    /// Removed on request; revived by a new add
    Removed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Queued,
        JobStatus::Pending,
        JobStatus::Created,
        JobStatus::Uploaded,
        JobStatus::Deployed,
        JobStatus::Failed,
        JobStatus::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Pending => "PENDING",
            JobStatus::Created => "CREATED",
            JobStatus::Uploaded => "UPLOADED",
            JobStatus::Deployed => "DEPLOYED",
            JobStatus::Failed => "FAILED",
            JobStatus::Removed => "REMOVED",
        }
    }

    /// Whether the CA is expected to hold certificate material in this state.
    pub fn has_certificate(&self) -> bool {
        matches!(self, JobStatus::Created | JobStatus::Deployed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Persisted record of one subject's certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateJob {
    pub subject: Subject,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Store-assigned, bumped on every write; breaks `updated_at` ties
    pub revision: u64,
}

impl CertificateJob {
    /// Sort key for "oldest first" processing.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.updated_at, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Uploaded).unwrap(),
            "\"UPLOADED\""
        );
        let status: JobStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(status, JobStatus::Failed);
        for status in JobStatus::ALL {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status)
            );
        }
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let now = Utc::now();
        let job = CertificateJob {
            subject: Subject::parse("example.com").unwrap(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            revision: 3,
        };

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["subject"], "example.com");
        assert_eq!(value["status"], "QUEUED");
        assert!(value.get("updatedAt").is_some());

        let back: CertificateJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
