//! Redis-backed budget store
//!
//! Every instance of the orchestrator shares one budget through this store.
//! Each operation is a single Lua script evaluated server-side, so the
//! leak-then-modify sequence is atomic across instances without client-side
//! locking.

use std::time::Duration;

use async_trait::async_trait;
use ::redis::aio::ConnectionManager;
use tracing::{debug, trace, warn};

use certwarden_common::{BudgetSnapshot, ConsumeOutcome, LeakyBucketPolicy};

use super::{BudgetError, BudgetOp, BudgetReply, BudgetStore};

/// Prefix applied to every budget key in Redis
const KEY_PREFIX: &str = "certwarden:budget:";

/// Leaky-bucket arithmetic mirrored from `BucketState`.
///
/// ARGV: op, amount, capacity, window_ms, now_ms.
/// Returns: outcome code (0 none, 1 admitted, 2 exhausted, 3 blocked),
/// retry-after ms, level, blocked-until ms (empty when unblocked).
const BUDGET_SCRIPT: &str = r#"
local key = KEYS[1]
local op = ARGV[1]
local amount = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])
local window_ms = tonumber(ARGV[4])
local now = tonumber(ARGV[5])
local epsilon = 1e-9

local level = tonumber(redis.call('HGET', key, 'level')) or 0
local updated = tonumber(redis.call('HGET', key, 'updated_at')) or now
local blocked = tonumber(redis.call('HGET', key, 'blocked_until'))

if now > updated then
  level = math.max(0, level - (now - updated) * capacity / window_ms)
  updated = now
end
if blocked and blocked <= now then
  blocked = nil
end

local code = 0
local retry = 0
if op == 'consume' then
  if blocked then
    code = 3
    retry = blocked - now
  elseif level + amount <= capacity + epsilon then
    level = level + amount
    code = 1
  else
    code = 2
    retry = math.ceil((level + amount - capacity) * window_ms / capacity)
  end
elseif op == 'penalty' then
  level = level + amount
elseif op == 'reward' then
  level = math.max(0, level - amount)
elseif op == 'block' then
  if amount > now and ((not blocked) or amount > blocked) then
    blocked = amount
  end
end

if op ~= 'get' then
  redis.call('HSET', key, 'level', tostring(level), 'updated_at', tostring(updated))
  if blocked then
    redis.call('HSET', key, 'blocked_until', tostring(blocked))
  else
    redis.call('HDEL', key, 'blocked_until')
  end
end

local blocked_str = ''
if blocked then
  blocked_str = tostring(blocked)
end
return {code, tostring(retry), tostring(level), blocked_str}
"#;

/// Budget store shared through Redis (or any protocol-compatible server).
#[derive(Clone)]
pub struct RedisBudgetStore {
    connection_manager: ConnectionManager,
    script: ::redis::Script,
}

impl std::fmt::Debug for RedisBudgetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBudgetStore").finish_non_exhaustive()
    }
}

impl RedisBudgetStore {
    /// Connect to `url` and verify the server answers.
    pub async fn new(url: &str) -> Result<Self, BudgetError> {
        let client = ::redis::Client::open(url).map_err(|e| {
            warn!(error = %e, "Failed to create Redis client for budget store");
            BudgetError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!(error = %e, "Failed to create connection manager for budget store");
            BudgetError::Unavailable(format!("Failed to create connection manager: {}", e))
        })?;

        let mut conn = connection_manager.clone();
        let _pong: String = ::redis::cmd("PING").query_async(&mut conn).await?;

        debug!("Connected to Redis budget store");

        Ok(Self {
            connection_manager,
            script: ::redis::Script::new(BUDGET_SCRIPT),
        })
    }
}

#[async_trait]
impl BudgetStore for RedisBudgetStore {
    async fn apply(
        &self,
        key: &str,
        policy: &LeakyBucketPolicy,
        op: BudgetOp,
        now_ms: u64,
    ) -> Result<BudgetReply, BudgetError> {
        let (name, amount) = script_args(op);
        let redis_key = format!("{}{}", KEY_PREFIX, key);
        let mut conn = self.connection_manager.clone();

        let raw: (i64, String, String, String) = self
            .script
            .key(&redis_key)
            .arg(name)
            .arg(amount)
            .arg(policy.points())
            .arg(policy.window().as_millis() as u64)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;

        let reply = decode_reply(key, policy, raw)?;
        trace!(key = %key, op = ?op, level = reply.snapshot.level, "Applied budget operation");
        Ok(reply)
    }

    async fn reset(&self, key: &str) -> Result<(), BudgetError> {
        let mut conn = self.connection_manager.clone();
        let _deleted: i64 = ::redis::cmd("DEL")
            .arg(format!("{}{}", KEY_PREFIX, key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

fn script_args(op: BudgetOp) -> (&'static str, u64) {
    match op {
        BudgetOp::Consume { cost } => ("consume", u64::from(cost)),
        BudgetOp::Penalty { points } => ("penalty", u64::from(points)),
        BudgetOp::Reward { points } => ("reward", u64::from(points)),
        BudgetOp::BlockUntil { until_ms } => ("block", until_ms),
        BudgetOp::Get => ("get", 0),
    }
}

fn decode_reply(
    key: &str,
    policy: &LeakyBucketPolicy,
    (code, retry, level, blocked): (i64, String, String, String),
) -> Result<BudgetReply, BudgetError> {
    let corrupt = |reason: String| BudgetError::Corrupt {
        key: key.to_string(),
        reason,
    };

    let retry_ms: f64 = retry
        .parse()
        .map_err(|_| corrupt(format!("retry-after '{}'", retry)))?;
    let level: f64 = level
        .parse()
        .map_err(|_| corrupt(format!("level '{}'", level)))?;
    let blocked_until_ms = if blocked.is_empty() {
        None
    } else {
        let until: f64 = blocked
            .parse()
            .map_err(|_| corrupt(format!("blocked-until '{}'", blocked)))?;
        Some(until as u64)
    };

    let retry_after = Duration::from_millis(retry_ms.max(0.0) as u64);
    let capacity = policy.capacity();
    let outcome = match code {
        0 => None,
        1 => Some(ConsumeOutcome::Admitted {
            remaining: capacity - level,
        }),
        2 => Some(ConsumeOutcome::Exhausted { retry_after }),
        3 => Some(ConsumeOutcome::Blocked { retry_after }),
        other => return Err(corrupt(format!("outcome code {}", other))),
    };

    Ok(BudgetReply {
        outcome,
        snapshot: BudgetSnapshot {
            level,
            capacity: policy.points(),
            blocked_until_ms,
        },
    })
}
