//! Counter store protocol
//!
//! Request handlers share no memory; the rows of this store are the only
//! shared mutable state in the system, and the sole coordination primitive
//! is the store's atomic conditional write. The [`CounterStore`] trait
//! expresses the fixed-window admission protocol as exactly that primitive:
//! a guarded increment, a plain read, and a guarded window reset. Anything
//! exposing a compare-and-swap / conditional write — an in-process map, a
//! DynamoDB-style table — can host the protocol; a store without one
//! cannot, short of adding a real distributed lock.

use super::category::EndpointCategory;
use super::license::truncate_hash;
use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, SystemTime};
use thiserror::Error;

mod memory;

pub use memory::{MemoryStore, MemoryStoreBuilder};

#[cfg(test)]
mod tests;

/// Rate-limit partition key. Counters for distinct keys are fully
/// independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub license_hash: String,
    pub category: EndpointCategory,
}

impl CounterKey {
    pub fn new(license_hash: impl Into<String>, category: EndpointCategory) -> Self {
        CounterKey {
            license_hash: license_hash.into(),
            category,
        }
    }
}

impl fmt::Display for CounterKey {
    /// Log form; the full hash stays out of log lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", truncate_hash(&self.license_hash), self.category)
    }
}

/// One persisted counter row.
///
/// `request_count` is monotonic non-decreasing within a window, and
/// `expires_at` always covers the active window plus a grace buffer, so
/// storage-level expiry can only reap counters that are already stale.
/// Expiry is hygiene, never load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub window_start: SystemTime,
    pub request_count: u32,
    pub expires_at: SystemTime,
}

impl RateLimitEntry {
    /// Instant at which the current window elapses and the counter may be
    /// reset.
    pub fn reset_at(&self, window: Duration) -> SystemTime {
        self.window_start + window
    }

    /// A stale entry belongs to an elapsed window and is waiting for one
    /// racer to win the reset.
    pub fn is_stale(&self, window: Duration, now: SystemTime) -> bool {
        now >= self.reset_at(window)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// Result of the conditional increment write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The conditional write succeeded; the post-increment entry is
    /// authoritative.
    Admitted(RateLimitEntry),
    /// The write condition failed. The store does not say why — the caller
    /// must read the entry to distinguish an exhausted open window from a
    /// stale one.
    ConditionFailed,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("conditional write contention persisted after {0} attempts")]
    Contention(u32),
}

/// The shared counter store.
///
/// All three operations are independent round trips; none of them assumes
/// any other request-local state, so a check is always safe to retry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomic conditional increment.
    ///
    /// The write succeeds when the entry is absent (inserted with a count
    /// of 1 and a window starting at `now`) or when its window is still
    /// open (`window_start` within `[now - window, now]`) and
    /// `request_count < limit`. Any other state fails the condition
    /// without modifying the row.
    async fn try_increment(
        &self,
        key: &CounterKey,
        limit: u32,
        window: Duration,
        grace: Duration,
        now: SystemTime,
    ) -> Result<IncrementOutcome, StoreError>;

    /// Read the current entry, if any. Entries past their TTL read as
    /// absent.
    async fn read(
        &self,
        key: &CounterKey,
        now: SystemTime,
    ) -> Result<Option<RateLimitEntry>, StoreError>;

    /// Atomic conditional window reset.
    ///
    /// Resets the entry to a fresh window (`window_start = now`,
    /// `request_count = 1`, new TTL) only if its `window_start` still
    /// equals the value the caller previously observed. Of several racing
    /// stale-window observers exactly one wins; losers must re-read and
    /// retry against the freshly reset entry.
    async fn try_reset_window(
        &self,
        key: &CounterKey,
        observed_window_start: SystemTime,
        window: Duration,
        grace: Duration,
        now: SystemTime,
    ) -> Result<bool, StoreError>;

    /// All live entries for one license hash, for the status surface.
    async fn scan_license(
        &self,
        license_hash: &str,
        now: SystemTime,
    ) -> Result<Vec<(EndpointCategory, RateLimitEntry)>, StoreError>;
}
