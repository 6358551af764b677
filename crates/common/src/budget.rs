//! Leaky-bucket budget arithmetic.
//!
//! This module holds the pure state machine behind certificate issuance
//! budgets. Storage backends (in-memory, Redis) load a [`BucketState`],
//! apply exactly one operation to it and write it back atomically; none of
//! them re-implement the arithmetic.
//!
//! # Model
//!
//! The bucket has a capacity of `points` and a `level` of points currently
//! held. Each admitted request adds one point. The level drains continuously
//! at `points / window`, so capacity regenerates smoothly instead of all at
//! once when a window rolls over.
//!
//! - **consume** admits while `level + cost <= points`
//! - **penalty** raises the level outside the consume path (may overshoot)
//! - **reward** lowers the level, never below zero
//! - **block** refuses every consume until a deadline

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Default logical key for the shared issuance budget.
pub const DEFAULT_BUDGET_KEY: &str = "limiter";

/// Tolerance for float noise when comparing levels against capacity.
const LEVEL_EPSILON: f64 = 1e-9;

// ============================================================================
// Policy
// ============================================================================

/// Capacity and regeneration window of a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakyBucketPolicy {
    points: u32,
    window: Duration,
}

impl LeakyBucketPolicy {
    /// Create a policy admitting `points` requests per `window`.
    ///
    /// Both values are clamped to a minimum of one (point, millisecond) so the
    /// drain rate is always finite and non-zero.
    pub fn new(points: u32, window: Duration) -> Self {
        Self {
            points: points.max(1),
            window: window.max(Duration::from_millis(1)),
        }
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Capacity as a float level.
    pub fn capacity(&self) -> f64 {
        f64::from(self.points)
    }

    /// Points drained per millisecond.
    pub fn leak_per_ms(&self) -> f64 {
        self.capacity() / self.window.as_millis() as f64
    }

    /// Time between two evenly spaced admissions.
    pub fn emission_interval(&self) -> Duration {
        self.window / self.points
    }

    /// Time needed to drain `amount` points.
    pub fn time_to_drain(&self, amount: f64) -> Duration {
        if amount <= LEVEL_EPSILON {
            return Duration::ZERO;
        }
        let window_ms = self.window.as_millis() as f64;
        Duration::from_millis((amount * window_ms / self.capacity()).ceil() as u64)
    }
}

// ============================================================================
// State
// ============================================================================

/// Persisted state of one budget key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    /// Points currently held; drains over time
    pub level: f64,
    /// Last time the level was brought up to date (Unix ms)
    pub updated_at_ms: u64,
    /// All consumption is refused until this instant (Unix ms)
    #[serde(default)]
    pub blocked_until_ms: Option<u64>,
}

impl BucketState {
    /// An empty bucket (full capacity available).
    pub fn new(now_ms: u64) -> Self {
        Self {
            level: 0.0,
            updated_at_ms: now_ms,
            blocked_until_ms: None,
        }
    }

    /// Drain the level for the time elapsed since the last update and drop
    /// an expired block.
    ///
    /// A clock that moved backwards leaves the level untouched.
    pub fn leak(&mut self, policy: &LeakyBucketPolicy, now_ms: u64) {
        if now_ms > self.updated_at_ms {
            let elapsed = (now_ms - self.updated_at_ms) as f64;
            self.level = (self.level - elapsed * policy.leak_per_ms()).max(0.0);
            self.updated_at_ms = now_ms;
        }

        if matches!(self.blocked_until_ms, Some(until) if until <= now_ms) {
            self.blocked_until_ms = None;
        }
    }

    /// Try to take `cost` points.
    pub fn try_consume(
        &mut self,
        policy: &LeakyBucketPolicy,
        cost: u32,
        now_ms: u64,
    ) -> ConsumeOutcome {
        self.leak(policy, now_ms);

        if let Some(until) = self.blocked_until_ms {
            let retry_after = Duration::from_millis(until.saturating_sub(now_ms));
            trace!(retry_after_ms = retry_after.as_millis() as u64, "Budget blocked");
            return ConsumeOutcome::Blocked { retry_after };
        }

        let cost = f64::from(cost);
        let capacity = policy.capacity();
        if self.level + cost <= capacity + LEVEL_EPSILON {
            self.level += cost;
            ConsumeOutcome::Admitted {
                remaining: capacity - self.level,
            }
        } else {
            let retry_after = policy.time_to_drain(self.level + cost - capacity);
            trace!(
                level = self.level,
                retry_after_ms = retry_after.as_millis() as u64,
                "Budget exhausted"
            );
            ConsumeOutcome::Exhausted { retry_after }
        }
    }

    /// Add (`delta > 0`, penalty) or return (`delta < 0`, reward) points.
    pub fn adjust(&mut self, policy: &LeakyBucketPolicy, delta: f64, now_ms: u64) {
        self.leak(policy, now_ms);
        self.level = (self.level + delta).max(0.0);
    }

    /// Refuse consumption until `until_ms`. An existing longer block is kept.
    pub fn block_until(&mut self, policy: &LeakyBucketPolicy, until_ms: u64, now_ms: u64) {
        self.leak(policy, now_ms);
        if until_ms > now_ms {
            let until = self.blocked_until_ms.map_or(until_ms, |b| b.max(until_ms));
            self.blocked_until_ms = Some(until);
        }
    }

    /// Read-only view of the state as of `now_ms`.
    pub fn snapshot(&self, policy: &LeakyBucketPolicy, now_ms: u64) -> BudgetSnapshot {
        let mut current = self.clone();
        current.leak(policy, now_ms);
        BudgetSnapshot {
            level: current.level,
            capacity: policy.points(),
            blocked_until_ms: current.blocked_until_ms,
        }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of a consume attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// A token was granted
    Admitted {
        /// Points still available after this request
        remaining: f64,
    },
    /// Not enough capacity yet
    Exhausted {
        /// Time until enough capacity has drained back
        retry_after: Duration,
    },
    /// Consumption is blocked after an external rate-limit breach
    Blocked {
        /// Time until the block lifts
        retry_after: Duration,
    },
}

impl ConsumeOutcome {
    /// Returns true if a token was granted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Returns the suggested wait, or zero if admitted.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::Admitted { .. } => Duration::ZERO,
            Self::Exhausted { retry_after } | Self::Blocked { retry_after } => *retry_after,
        }
    }
}

/// Point-in-time view of a budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Points currently held
    pub level: f64,
    /// Configured capacity
    pub capacity: u32,
    /// Active block deadline (Unix ms)
    pub blocked_until_ms: Option<u64>,
}

impl BudgetSnapshot {
    /// Points available; negative after penalties overshoot the capacity.
    pub fn remaining(&self) -> f64 {
        f64::from(self.capacity) - self.level
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_until_ms.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
