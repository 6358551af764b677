//! Budget store errors

use thiserror::Error;

/// Errors raised by a [`BudgetStore`](super::BudgetStore).
#[derive(Debug, Error)]
pub enum BudgetError {
    /// The backing store could not be reached or refused the operation
    #[error("budget store unavailable: {0}")]
    Unavailable(String),

    /// Stored state could not be decoded
    #[error("corrupt budget state for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

#[cfg(feature = "distributed-rate-limit-redis")]
impl From<::redis::RedisError> for BudgetError {
    fn from(err: ::redis::RedisError) -> Self {
        BudgetError::Unavailable(err.to_string())
    }
}
