//! Budget state storage
//!
//! A [`BudgetStore`] owns the [`BucketState`] of every budget key and applies
//! one [`BudgetOp`] to it atomically. The arithmetic itself lives in
//! [`certwarden_common::budget`] so every backend agrees on the numbers.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use certwarden_common::{BucketState, BudgetSnapshot, ConsumeOutcome, LeakyBucketPolicy};

use super::BudgetError;

/// A single read-modify-write applied to one budget key
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetOp {
    /// Take `cost` points if capacity allows
    Consume { cost: u32 },
    /// Add points outside the consume path
    Penalty { points: u32 },
    /// Return points
    Reward { points: u32 },
    /// Refuse consumption until the given instant (Unix ms)
    BlockUntil { until_ms: u64 },
    /// Read without modification
    Get,
}

/// Outcome of a [`BudgetOp`].
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetReply {
    /// Set only for [`BudgetOp::Consume`]
    pub outcome: Option<ConsumeOutcome>,
    /// State after the operation
    pub snapshot: BudgetSnapshot,
}

/// Persistent home of budget state.
///
/// Implementations must apply each call as one atomic step: two instances
/// consuming concurrently must never both see the last free point.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Apply `op` to the state at `key` as of `now_ms`.
    async fn apply(
        &self,
        key: &str,
        policy: &LeakyBucketPolicy,
        op: BudgetOp,
        now_ms: u64,
    ) -> Result<BudgetReply, BudgetError>;

    /// Drop all state held at `key`.
    async fn reset(&self, key: &str) -> Result<(), BudgetError>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Apply `op` to `state` in place. Shared by every in-process backend.
pub fn apply_op(
    state: &mut BucketState,
    policy: &LeakyBucketPolicy,
    op: BudgetOp,
    now_ms: u64,
) -> BudgetReply {
    let outcome = match op {
        BudgetOp::Consume { cost } => Some(state.try_consume(policy, cost, now_ms)),
        BudgetOp::Penalty { points } => {
            state.adjust(policy, f64::from(points), now_ms);
            None
        }
        BudgetOp::Reward { points } => {
            state.adjust(policy, -f64::from(points), now_ms);
            None
        }
        BudgetOp::BlockUntil { until_ms } => {
            state.block_until(policy, until_ms, now_ms);
            None
        }
        BudgetOp::Get => None,
    };

    BudgetReply {
        outcome,
        snapshot: state.snapshot(policy, now_ms),
    }
}

/// In-process budget store
///
/// Each key lives in its own `DashMap` shard entry; the entry guard makes the
/// read-modify-write atomic. State is lost on restart and not shared between
/// processes.
#[derive(Debug, Default)]
pub struct MemoryBudgetStore {
    buckets: DashMap<String, BucketState>,
}

impl MemoryBudgetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BudgetStore for MemoryBudgetStore {
    async fn apply(
        &self,
        key: &str,
        policy: &LeakyBucketPolicy,
        op: BudgetOp,
        now_ms: u64,
    ) -> Result<BudgetReply, BudgetError> {
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| BucketState::new(now_ms));

        let reply = apply_op(entry.value_mut(), policy, op, now_ms);
        trace!(key = %key, op = ?op, level = reply.snapshot.level, "Applied budget operation");
        Ok(reply)
    }

    async fn reset(&self, key: &str) -> Result<(), BudgetError> {
        self.buckets.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy() -> LeakyBucketPolicy {
        LeakyBucketPolicy::new(2, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_memory_store_consumes_per_key() {
        let store = MemoryBudgetStore::new();
        let p = policy();

        for _ in 0..2 {
            let reply = store.apply("a", &p, BudgetOp::Consume { cost: 1 }, 0).await.unwrap();
            assert!(reply.outcome.unwrap().is_admitted());
        }
        let reply = store.apply("a", &p, BudgetOp::Consume { cost: 1 }, 0).await.unwrap();
        assert!(!reply.outcome.unwrap().is_admitted());

        // Other keys are independent
        let reply = store.apply("b", &p, BudgetOp::Consume { cost: 1 }, 0).await.unwrap();
        assert!(reply.outcome.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_memory_store_reset() {
        let store = MemoryBudgetStore::new();
        let p = policy();

        store.apply("a", &p, BudgetOp::Penalty { points: 5 }, 0).await.unwrap();
        store.reset("a").await.unwrap();

        let reply = store.apply("a", &p, BudgetOp::Get, 0).await.unwrap();
        assert_eq!(reply.snapshot.level, 0.0);
        assert!(reply.outcome.is_none());
    }

    #[test]
    fn test_apply_op_block_and_reward() {
        let p = policy();
        let mut state = BucketState::new(0);

        let reply = apply_op(&mut state, &p, BudgetOp::BlockUntil { until_ms: 1000 }, 0);
        assert!(reply.snapshot.is_blocked());

        apply_op(&mut state, &p, BudgetOp::Reward { points: 3 }, 0);
        assert_eq!(state.level, 0.0);

        let reply = apply_op(&mut state, &p, BudgetOp::Consume { cost: 1 }, 500);
        assert!(matches!(
            reply.outcome,
            Some(ConsumeOutcome::Blocked { .. })
        ));
    }
}
