//! The issuance budget
//!
//! [`RateBudget`] binds one logical key, a [`LeakyBucketPolicy`], a
//! [`BudgetStore`] and a [`Clock`]. Every call is one round trip to the store;
//! nothing is cached locally, so all instances pointing at the same store and
//! key see the same budget.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use certwarden_common::{BudgetSnapshot, Clock, ConsumeOutcome, LeakyBucketPolicy, SystemClock};

use super::{BudgetError, BudgetOp, BudgetStore};

/// Shared, persisted issuance budget.
#[derive(Clone)]
pub struct RateBudget {
    key: String,
    policy: LeakyBucketPolicy,
    store: Arc<dyn BudgetStore>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RateBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateBudget")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl RateBudget {
    /// Create a budget on the system clock.
    pub fn new(
        key: impl Into<String>,
        policy: LeakyBucketPolicy,
        store: Arc<dyn BudgetStore>,
    ) -> Self {
        Self::with_clock(key, policy, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        key: impl Into<String>,
        policy: LeakyBucketPolicy,
        store: Arc<dyn BudgetStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key: key.into(),
            policy,
            store,
            clock,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn policy(&self) -> &LeakyBucketPolicy {
        &self.policy
    }

    /// Try to take one token.
    pub async fn consume(&self) -> Result<ConsumeOutcome, BudgetError> {
        let reply = self.apply(BudgetOp::Consume { cost: 1 }).await?;
        let outcome = reply.outcome.ok_or_else(|| BudgetError::Corrupt {
            key: self.key.clone(),
            reason: "consume returned no outcome".to_string(),
        })?;

        debug!(
            key = %self.key,
            admitted = outcome.is_admitted(),
            level = reply.snapshot.level,
            "Budget consume"
        );
        Ok(outcome)
    }

    /// Charge `points` without asking; the level may exceed capacity.
    pub async fn penalty(&self, points: u32) -> Result<BudgetSnapshot, BudgetError> {
        let reply = self.apply(BudgetOp::Penalty { points }).await?;
        debug!(key = %self.key, points, level = reply.snapshot.level, "Budget penalty");
        Ok(reply.snapshot)
    }

    /// Give `points` back; the level never drops below zero.
    pub async fn reward(&self, points: u32) -> Result<BudgetSnapshot, BudgetError> {
        let reply = self.apply(BudgetOp::Reward { points }).await?;
        debug!(key = %self.key, points, level = reply.snapshot.level, "Budget reward");
        Ok(reply.snapshot)
    }

    /// Refuse every consume for `duration`. A longer block already in place
    /// is kept.
    pub async fn block(&self, duration: Duration) -> Result<BudgetSnapshot, BudgetError> {
        let until_ms = self
            .clock
            .now_ms()
            .saturating_add(duration.as_millis() as u64);
        let reply = self.apply(BudgetOp::BlockUntil { until_ms }).await?;
        info!(
            key = %self.key,
            duration_secs = duration.as_secs(),
            "Budget blocked"
        );
        Ok(reply.snapshot)
    }

    /// Current state without modification.
    pub async fn get(&self) -> Result<BudgetSnapshot, BudgetError> {
        Ok(self.apply(BudgetOp::Get).await?.snapshot)
    }

    /// Forget all state; the budget starts empty.
    pub async fn reset(&self) -> Result<(), BudgetError> {
        self.store.reset(&self.key).await?;
        info!(key = %self.key, "Budget reset");
        Ok(())
    }

    async fn apply(&self, op: BudgetOp) -> Result<super::BudgetReply, BudgetError> {
        let now_ms = self.clock.now_ms();
        self.store.apply(&self.key, &self.policy, op, now_ms).await
    }
}
