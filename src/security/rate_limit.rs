//! Per-identity token bucket rate limiting.
//!
//! # Responsibilities
//! - Track one bucket per client identity (burst capacity, sustained rate)
//! - Delay callers until their identity has a token available
//! - Forget identities that stay idle for the expiration period
//! - Group limiters under names so groups can have different policies
//!
//! # Design Decisions
//! - Buckets refill arithmetically on access; no task per identity
//! - A caller reserves its token up front and sleeps until it is due,
//!   so concurrent callers of one identity queue in arrival order
//! - No caller waits longer than the expiration period
//! - Idle buckets are swept opportunistically, at most once per expiration

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ProxyError, ProxyResult};

/// Limits applied to every identity of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Idle time after which an identity's state is dropped.
    pub expiration: Duration,
    /// Sustained requests per second.
    pub max_rps: u32,
    /// Requests allowed back to back before throttling starts.
    pub burst: u32,
}

impl RateLimitPolicy {
    pub fn new(expiration: Duration, max_rps: u32, burst: u32) -> ProxyResult<Self> {
        let policy = Self {
            expiration,
            max_rps,
            burst,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> ProxyResult<()> {
        if self.max_rps == 0 {
            return Err(ProxyError::Construction("max_rps must be greater than zero".into()));
        }
        if self.burst == 0 {
            return Err(ProxyError::Construction("burst must be greater than zero".into()));
        }
        if self.expiration.is_zero() {
            return Err(ProxyError::Construction("expiration must be greater than zero".into()));
        }
        Ok(())
    }

    /// Time between two token refills (`1000 / max_rps` ms).
    pub fn refill_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.max_rps))
    }
}

/// How a `limit` call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOutcome {
    /// A token was available immediately.
    Passed,
    /// The caller waited for a token.
    Throttled(Duration),
    /// The wait hit the expiration bound and the caller was let through.
    TimedOut(Duration),
}

#[derive(Debug)]
struct ClientBucket {
    tokens: f64,
    last_refill: Instant,
    /// When the most recent caller was (or will be) let through.
    last_drain: Instant,
}

impl ClientBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
            last_drain: now,
        }
    }

    fn refill(&mut self, now: Instant, interval: Duration, capacity: u32) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() / interval.as_secs_f64())
            .min(f64::from(capacity));
        self.last_refill = now;
    }

    fn is_idle(&self, now: Instant, expiration: Duration) -> bool {
        now.saturating_duration_since(self.last_drain) >= expiration
    }
}

/// Token bucket limiter keyed by an opaque client identity.
#[derive(Debug)]
pub struct IdentityRateLimiter {
    policy: RateLimitPolicy,
    interval: Duration,
    clients: DashMap<String, ClientBucket>,
    last_sweep: Mutex<Instant>,
}

impl IdentityRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> ProxyResult<Self> {
        policy.validate()?;
        Ok(Self {
            interval: policy.refill_interval(),
            policy,
            clients: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        })
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.clients.len()
    }

    /// Wait until `identity` may proceed.
    pub async fn limit(&self, identity: &str) -> LimitOutcome {
        let delay = self.reserve(identity);
        if delay.is_zero() {
            return LimitOutcome::Passed;
        }

        if delay >= self.policy.expiration {
            tokio::time::sleep(self.policy.expiration).await;
            tracing::warn!(
                identity = %identity,
                waited = ?self.policy.expiration,
                "Rate limit wait capped at expiration"
            );
            return LimitOutcome::TimedOut(self.policy.expiration);
        }

        tracing::debug!(identity = %identity, delay = ?delay, "Rate limited");
        tokio::time::sleep(delay).await;
        LimitOutcome::Throttled(delay)
    }

    /// Take one token for `identity` and return how long until it is due.
    fn reserve(&self, identity: &str) -> Duration {
        let now = Instant::now();
        self.sweep(now);

        let mut bucket = self
            .clients
            .entry(identity.to_string())
            .or_insert_with(|| ClientBucket::full(self.policy.burst, now));

        if bucket.is_idle(now, self.policy.expiration) {
            *bucket = ClientBucket::full(self.policy.burst, now);
        }
        bucket.refill(now, self.interval, self.policy.burst);
        bucket.tokens -= 1.0;

        let delay = if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            self.interval.mul_f64(-bucket.tokens)
        };

        // A caller that will time out never receives its token.
        if delay >= self.policy.expiration {
            bucket.tokens += 1.0;
            bucket.last_drain = bucket.last_drain.max(now);
        } else {
            bucket.last_drain = now + delay;
        }
        delay
    }

    /// Drop buckets idle for longer than the expiration period.
    fn sweep(&self, now: Instant) {
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last_sweep) < self.policy.expiration {
            return;
        }
        *last_sweep = now;

        let expiration = self.policy.expiration;
        let before = self.clients.len();
        self.clients.retain(|_, bucket| !bucket.is_idle(now, expiration));
        let removed = before.saturating_sub(self.clients.len());
        if removed > 0 {
            tracing::debug!(removed, "Expired idle rate limit buckets");
        }
    }
}

/// What to do when `limit` names a group that does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownGroupPolicy {
    /// Let the caller through unthrottled.
    #[default]
    Allow,
    /// Reject the caller with [`ProxyError::UnknownRateLimitGroup`].
    Deny,
}

/// Named collection of identity limiters, one per policy group.
#[derive(Debug, Default)]
pub struct GroupRateLimiter {
    groups: RwLock<HashMap<String, Arc<IdentityRateLimiter>>>,
    unknown: UnknownGroupPolicy,
}

impl GroupRateLimiter {
    /// A limiter without groups.
    pub fn new(unknown: UnknownGroupPolicy) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            unknown,
        }
    }

    pub fn unknown_group_policy(&self) -> UnknownGroupPolicy {
        self.unknown
    }

    /// Create or replace a group. Replacing drops all per-identity state.
    pub fn set_group(&self, group_id: impl Into<String>, policy: RateLimitPolicy) -> ProxyResult<()> {
        let limiter = Arc::new(IdentityRateLimiter::new(policy)?);
        let group_id = group_id.into();
        tracing::info!(
            group = %group_id,
            max_rps = policy.max_rps,
            burst = policy.burst,
            expiration = ?policy.expiration,
            "Rate limit group set"
        );
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group_id, limiter);
        Ok(())
    }

    /// Remove a group. Returns whether it existed.
    pub fn del_group(&self, group_id: &str) -> bool {
        let removed = self
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(group_id)
            .is_some();
        if removed {
            tracing::info!(group = %group_id, "Rate limit group removed");
        }
        removed
    }

    /// Policies of all configured groups, sorted by name.
    pub fn groups(&self) -> Vec<(String, RateLimitPolicy)> {
        let mut groups: Vec<_> = self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, limiter)| (name.clone(), *limiter.policy()))
            .collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        groups
    }

    pub fn group(&self, group_id: &str) -> Option<Arc<IdentityRateLimiter>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group_id)
            .cloned()
    }

    /// Wait until `identity` may proceed under `group_id`'s policy.
    pub async fn limit(&self, group_id: &str, identity: &str) -> ProxyResult<LimitOutcome> {
        match self.group(group_id) {
            Some(limiter) => Ok(limiter.limit(identity).await),
            None => match self.unknown {
                UnknownGroupPolicy::Allow => Ok(LimitOutcome::Passed),
                UnknownGroupPolicy::Deny => {
                    Err(ProxyError::UnknownRateLimitGroup(group_id.to_string()))
                }
            },
        }
    }
}
