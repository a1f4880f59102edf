//! Rate limiter orchestration
//!
//! [`RateLimiter`] composes license context, category, quota lookup, and
//! the counter store's conditional-write protocol into an allow/deny
//! [`Decision`]. It is constructed once at process start and shared by
//! reference into every handler; it holds no per-request state, and a check
//! is safe to retry at any point.
//!
//! A check makes at least one store round trip before the guarded handler
//! may run. Write contention is retried a bounded number of times with
//! jittered backoff; exhausted retries and store errors fall through to the
//! configured [`FailurePolicy`] instead of surfacing to the client.

use super::category::EndpointCategory;
use super::license::LicenseContext;
use super::quota::{Quota, QuotaTable};
use super::store::{CounterKey, CounterStore, IncrementOutcome, StoreError};
use rand::Rng;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Attempts per check, counting the first one.
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 5;
const BACKOFF_JITTER_MS: u64 = 5;

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(1000);
const DEFAULT_TTL_GRACE: Duration = Duration::from_secs(60);

/// What a degraded check does when the store itself is unreachable.
///
/// `Closed` denies, protecting tenant isolation at the cost of
/// availability; `Open` admits, favoring availability over enforcement.
/// The policy is always an explicit configuration choice — the default is
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Closed,
    Open,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Closed => "closed",
            FailurePolicy::Open => "open",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "closed" => Ok(FailurePolicy::Closed),
            "open" => Ok(FailurePolicy::Open),
            _ => Err(format!(
                "invalid failure policy: {s}. Valid options are: closed, open"
            )),
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The limit in force for this tier and category
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Instant at which the window elapses
    pub reset_at: SystemTime,
    /// The store was unreachable and the failure policy decided instead of
    /// the counter
    pub degraded: bool,
}

impl Decision {
    /// Time until the window elapses; zero once it has. Never exceeds the
    /// window length.
    pub fn retry_after(&self, now: SystemTime) -> Duration {
        self.reset_at.duration_since(now).unwrap_or_default()
    }
}

/// License-tiered admission control over a conditional-write counter store.
///
/// # Example
///
/// ```
/// use syncgate::{FailurePolicy, MemoryStore, QuotaTable, RateLimiter};
/// use std::time::Duration;
///
/// let limiter = RateLimiter::builder(MemoryStore::new(), QuotaTable::default())
///     .failure_policy(FailurePolicy::Closed)
///     .store_timeout(Duration::from_millis(500))
///     .build();
/// # let _ = limiter;
/// ```
pub struct RateLimiter<S> {
    store: S,
    quotas: QuotaTable,
    policy: FailurePolicy,
    store_timeout: Duration,
    ttl_grace: Duration,
}

/// Builder for configuring a [`RateLimiter`].
pub struct RateLimiterBuilder<S> {
    store: S,
    quotas: QuotaTable,
    policy: FailurePolicy,
    store_timeout: Duration,
    ttl_grace: Duration,
}

impl<S> RateLimiter<S> {
    /// Create a limiter with the default policy (fail closed), store
    /// timeout, and TTL grace.
    pub fn new(store: S, quotas: QuotaTable) -> Self {
        Self::builder(store, quotas).build()
    }

    pub fn builder(store: S, quotas: QuotaTable) -> RateLimiterBuilder<S> {
        RateLimiterBuilder {
            store,
            quotas,
            policy: FailurePolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            ttl_grace: DEFAULT_TTL_GRACE,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }
}

impl<S: CounterStore> RateLimiter<S> {
    /// Check whether one request for this license and category is admitted.
    ///
    /// Infallible by design: quota gaps degrade to conservative limits and
    /// store failures degrade to the failure policy, so the only signals a
    /// caller ever sees are the decision itself and its `degraded` flag.
    pub async fn check(
        &self,
        ctx: &LicenseContext,
        category: EndpointCategory,
        now: SystemTime,
    ) -> Decision {
        let quota = self.quotas.lookup(ctx.tier, category);
        let key = CounterKey::new(ctx.license_hash.clone(), category);

        match self.try_admit(&key, quota, now).await {
            Ok(decision) => {
                if decision.allowed {
                    tracing::debug!(
                        key = %key,
                        remaining = decision.remaining,
                        limit = decision.limit,
                        "rate limit check passed"
                    );
                } else {
                    tracing::info!(
                        key = %key,
                        limit = decision.limit,
                        "rate limit exceeded"
                    );
                }
                decision
            }
            Err(err) => {
                tracing::warn!(
                    key = %key,
                    error = %err,
                    policy = self.policy.as_str(),
                    "rate limit store unavailable, applying failure policy"
                );
                self.degraded_decision(quota, now)
            }
        }
    }

    /// Run the conditional-increment protocol against the store.
    ///
    /// Each attempt is one guarded increment; a failed condition is
    /// disambiguated by reading the entry. An exhausted open window is a
    /// final deny. A stale window enters the reset race: the winner is
    /// admitted as the first request of the fresh window, losers back off
    /// and retry against the entry the winner wrote. Requests that raced a
    /// legitimate rollover may be counted against the dying window — that
    /// small over-admission is the accepted tolerance of the protocol.
    async fn try_admit(
        &self,
        key: &CounterKey,
        quota: Quota,
        now: SystemTime,
    ) -> Result<Decision, StoreError> {
        let window = quota.window();

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let outcome = self
                .store_call(self.store.try_increment(
                    key,
                    quota.limit,
                    window,
                    self.ttl_grace,
                    now,
                ))
                .await?;

            if let IncrementOutcome::Admitted(entry) = outcome {
                return Ok(Decision {
                    allowed: true,
                    limit: quota.limit,
                    remaining: quota.limit.saturating_sub(entry.request_count),
                    reset_at: entry.reset_at(window),
                    degraded: false,
                });
            }

            // The condition failed; read to find out why. The entry can be
            // gone by now (TTL expiry between the two calls) — retry, the
            // next increment will insert fresh.
            let Some(entry) = self.store_call(self.store.read(key, now)).await? else {
                continue;
            };

            if !entry.is_stale(window, now) {
                if entry.request_count >= quota.limit {
                    // Window still open and the counter is full.
                    return Ok(Decision {
                        allowed: false,
                        limit: quota.limit,
                        remaining: 0,
                        reset_at: entry.reset_at(window),
                        degraded: false,
                    });
                }
                // Open and under the limit: the entry changed between the
                // failed write and this read (a concurrent rollover).
                // Retry against the current entry.
                continue;
            }

            // Stale window: race for the reset. Exactly one observer wins.
            let won = self
                .store_call(self.store.try_reset_window(
                    key,
                    entry.window_start,
                    window,
                    self.ttl_grace,
                    now,
                ))
                .await?;

            if won {
                return Ok(Decision {
                    allowed: true,
                    limit: quota.limit,
                    remaining: quota.limit.saturating_sub(1),
                    reset_at: now + window,
                    degraded: false,
                });
            }
            // Lost the reset race; loop and increment the fresh entry.
        }

        Err(StoreError::Contention(MAX_ATTEMPTS))
    }

    async fn store_call<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        }
    }

    fn degraded_decision(&self, quota: Quota, now: SystemTime) -> Decision {
        match self.policy {
            FailurePolicy::Closed => Decision {
                allowed: false,
                limit: quota.limit,
                remaining: 0,
                reset_at: now + quota.window(),
                degraded: true,
            },
            FailurePolicy::Open => Decision {
                allowed: true,
                limit: quota.limit,
                remaining: quota.limit.saturating_sub(1),
                reset_at: now + quota.window(),
                degraded: true,
            },
        }
    }
}

impl<S> RateLimiterBuilder<S> {
    /// Behavior when the store is unreachable.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper bound on each store round trip.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Buffer added to entry TTLs past the window end, so native expiry
    /// never reaps a live counter.
    pub fn ttl_grace(mut self, grace: Duration) -> Self {
        self.ttl_grace = grace;
        self
    }

    pub fn build(self) -> RateLimiter<S> {
        RateLimiter {
            store: self.store,
            quotas: self.quotas,
            policy: self.policy,
            store_timeout: self.store_timeout,
            ttl_grace: self.ttl_grace,
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS << attempt;
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!(FailurePolicy::from_str("closed"), Ok(FailurePolicy::Closed));
        assert_eq!(FailurePolicy::from_str("OPEN"), Ok(FailurePolicy::Open));
        assert!(FailurePolicy::from_str("maybe").is_err());
    }

    #[test]
    fn test_default_policy_is_closed() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Closed);
    }

    #[test]
    fn test_backoff_is_bounded() {
        for attempt in 1..MAX_ATTEMPTS {
            let delay = backoff_delay(attempt);
            assert!(delay >= Duration::from_millis(BACKOFF_BASE_MS << attempt));
            assert!(
                delay <= Duration::from_millis((BACKOFF_BASE_MS << attempt) + BACKOFF_JITTER_MS)
            );
        }
    }

    #[test]
    fn test_retry_after_never_negative() {
        let now = SystemTime::now();
        let decision = Decision {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_at: now,
            degraded: false,
        };
        assert_eq!(decision.retry_after(now + Duration::from_secs(10)), Duration::ZERO);
    }
}
