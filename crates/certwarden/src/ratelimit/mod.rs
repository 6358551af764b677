//! Issuance rate limiting
//!
//! - [`RateBudget`]: persisted leaky bucket with consume, penalty, reward and
//!   block operations
//! - [`BudgetStore`]: where the bucket lives ([`MemoryBudgetStore`], or
//!   `RedisBudgetStore` with the `distributed-rate-limit-redis` feature)
//! - [`DispatchQueue`]: waits for a token, then runs a handler

mod budget;
mod error;
mod queue;
#[cfg(feature = "distributed-rate-limit-redis")]
mod redis;
mod storage;

pub use budget::RateBudget;
pub use error::BudgetError;
pub use queue::{DispatchQueue, DispatchSettings};
#[cfg(feature = "distributed-rate-limit-redis")]
pub use self::redis::RedisBudgetStore;
pub use storage::{apply_op, BudgetOp, BudgetReply, BudgetStore, MemoryBudgetStore};

use std::sync::Arc;

use tracing::info;

use certwarden_config::BudgetConfig;

/// Build the budget store selected by configuration.
///
/// Without the `distributed-rate-limit-redis` feature a configured Redis URL
/// is ignored with a warning and the in-memory store is used.
pub async fn build_store(config: &BudgetConfig) -> Result<Arc<dyn BudgetStore>, BudgetError> {
    match config.redis_url.as_deref() {
        #[cfg(feature = "distributed-rate-limit-redis")]
        Some(url) => {
            let store = RedisBudgetStore::new(url).await?;
            info!(key = %config.key, "Using Redis budget store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "distributed-rate-limit-redis"))]
        Some(_) => {
            tracing::warn!(
                "redis-url is set but this build lacks the distributed-rate-limit-redis feature; \
                 using the in-memory budget store"
            );
            Ok(Arc::new(MemoryBudgetStore::new()))
        }
        None => {
            info!(key = %config.key, "Using in-memory budget store");
            Ok(Arc::new(MemoryBudgetStore::new()))
        }
    }
}
