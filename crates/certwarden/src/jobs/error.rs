//! Job store errors

use std::path::PathBuf;

use thiserror::Error;

use certwarden_common::Subject;

#[derive(Debug, Error)]
pub enum JobStoreError {
    /// A job for this subject already exists
    #[error("job for '{0}' already exists")]
    Duplicate(Subject),

    /// No job for this subject
    #[error("no job for '{0}'")]
    NotFound(Subject),

    #[error("job store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted job could not be loaded
    #[error("corrupt job file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}
