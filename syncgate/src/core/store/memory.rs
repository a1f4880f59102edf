use super::{CounterKey, CounterStore, IncrementOutcome, RateLimitEntry, StoreError};
use crate::core::category::EndpointCategory;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_CAPACITY: usize = 10_000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// In-process [`CounterStore`] implementation.
///
/// Provides the same conditional-write semantics as a remote counter table,
/// evaluated under a single lock, so tests and single-node deployments run
/// against the exact protocol the limiter speaks to production stores.
/// Entries past their TTL are treated as absent immediately and physically
/// removed by a periodic sweep.
///
/// # Example
///
/// ```
/// use syncgate::MemoryStore;
/// use std::time::Duration;
///
/// let store = MemoryStore::builder()
///     .capacity(100_000)
///     .cleanup_interval(Duration::from_secs(300))
///     .build();
/// ```
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    data: HashMap<CounterKey, RateLimitEntry>,
    // Track when the next cleanup sweep is due
    next_cleanup: SystemTime,
    cleanup_interval: Duration,
    // Entries removed by the last sweep
    expired_count: usize,
}

/// Builder for configuring a [`MemoryStore`].
pub struct MemoryStoreBuilder {
    capacity: usize,
    cleanup_interval: Duration,
}

impl MemoryStore {
    /// Create a store with default capacity and cleanup interval.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder {
            capacity: DEFAULT_CAPACITY,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }

    fn with_config(capacity: usize, cleanup_interval: Duration) -> Self {
        MemoryStore {
            inner: Mutex::new(Inner {
                // Pre-allocate with overhead to avoid rehashing
                data: HashMap::with_capacity(
                    (capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize,
                ),
                next_cleanup: SystemTime::now() + cleanup_interval,
                cleanup_interval,
                expired_count: 0,
            }),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    #[cfg(test)]
    pub fn expired_count(&self) -> usize {
        self.inner.lock().expired_count
    }
}

impl Inner {
    fn maybe_clean_expired(&mut self, now: SystemTime) {
        if now >= self.next_cleanup {
            let before_count = self.data.len();
            self.data.retain(|_, entry| !entry.is_expired(now));
            self.expired_count = before_count.saturating_sub(self.data.len());
            self.next_cleanup = now + self.cleanup_interval;
        }
    }

    /// Entries past their TTL read as absent even before the sweep removes
    /// them.
    fn live_entry(&self, key: &CounterKey, now: SystemTime) -> Option<RateLimitEntry> {
        self.data
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .copied()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn try_increment(
        &self,
        key: &CounterKey,
        limit: u32,
        window: Duration,
        grace: Duration,
        now: SystemTime,
    ) -> Result<IncrementOutcome, StoreError> {
        let mut inner = self.inner.lock();
        inner.maybe_clean_expired(now);

        match inner.live_entry(key, now) {
            None => {
                let entry = RateLimitEntry {
                    window_start: now,
                    request_count: 1,
                    expires_at: now + window + grace,
                };
                inner.data.insert(key.clone(), entry);
                Ok(IncrementOutcome::Admitted(entry))
            }
            Some(entry) if !entry.is_stale(window, now) && entry.request_count < limit => {
                let entry = RateLimitEntry {
                    request_count: entry.request_count + 1,
                    ..entry
                };
                inner.data.insert(key.clone(), entry);
                Ok(IncrementOutcome::Admitted(entry))
            }
            Some(_) => Ok(IncrementOutcome::ConditionFailed),
        }
    }

    async fn read(
        &self,
        key: &CounterKey,
        now: SystemTime,
    ) -> Result<Option<RateLimitEntry>, StoreError> {
        Ok(self.inner.lock().live_entry(key, now))
    }

    async fn try_reset_window(
        &self,
        key: &CounterKey,
        observed_window_start: SystemTime,
        window: Duration,
        grace: Duration,
        now: SystemTime,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        inner.maybe_clean_expired(now);

        match inner.live_entry(key, now) {
            Some(entry) if entry.window_start == observed_window_start => {
                inner.data.insert(
                    key.clone(),
                    RateLimitEntry {
                        window_start: now,
                        request_count: 1,
                        expires_at: now + window + grace,
                    },
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_license(
        &self,
        license_hash: &str,
        now: SystemTime,
    ) -> Result<Vec<(EndpointCategory, RateLimitEntry)>, StoreError> {
        let inner = self.inner.lock();
        let mut entries: Vec<_> = inner
            .data
            .iter()
            .filter(|(key, entry)| key.license_hash == license_hash && !entry.is_expired(now))
            .map(|(key, entry)| (key.category, *entry))
            .collect();
        entries.sort_by_key(|(category, _)| category.as_str());
        Ok(entries)
    }
}

impl MemoryStoreBuilder {
    /// Expected number of live (license hash, category) keys.
    ///
    /// The store allocates 30% more space to reduce hash collisions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Interval between sweeps of expired entries.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn build(self) -> MemoryStore {
        MemoryStore::with_config(self.capacity, self.cleanup_interval)
    }
}
