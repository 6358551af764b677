//! CA client errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaError {
    /// The CA client could not be reached
    #[error("certificate authority unavailable: {0}")]
    Unavailable(String),

    /// The CA client rejected the request
    #[error("certificate authority request failed: {0}")]
    Request(String),
}
