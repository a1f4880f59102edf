use super::{CounterKey, CounterStore, IncrementOutcome, MemoryStore, RateLimitEntry};
use crate::core::category::EndpointCategory;
use std::time::{Duration, SystemTime};

const WINDOW: Duration = Duration::from_secs(60);
const GRACE: Duration = Duration::from_secs(60);

fn key(hash: &str, category: EndpointCategory) -> CounterKey {
    CounterKey::new(hash, category)
}

async fn admit(store: &MemoryStore, key: &CounterKey, limit: u32, now: SystemTime) -> RateLimitEntry {
    match store
        .try_increment(key, limit, WINDOW, GRACE, now)
        .await
        .unwrap()
    {
        IncrementOutcome::Admitted(entry) => entry,
        IncrementOutcome::ConditionFailed => panic!("expected admission"),
    }
}

#[tokio::test]
async fn test_insert_on_absent_key() {
    let store = MemoryStore::new();
    let key = key("sha256:aaa", EndpointCategory::Auth);
    let now = SystemTime::now();

    let entry = admit(&store, &key, 5, now).await;
    assert_eq!(entry.request_count, 1);
    assert_eq!(entry.window_start, now);
    assert_eq!(entry.expires_at, now + WINDOW + GRACE);
}

#[tokio::test]
async fn test_increment_preserves_window_start() {
    let store = MemoryStore::new();
    let key = key("sha256:aaa", EndpointCategory::File);
    let start = SystemTime::now();

    admit(&store, &key, 5, start).await;
    let entry = admit(&store, &key, 5, start + Duration::from_secs(10)).await;

    assert_eq!(entry.request_count, 2);
    assert_eq!(entry.window_start, start);
}

#[tokio::test]
async fn test_condition_fails_at_limit() {
    let store = MemoryStore::new();
    let key = key("sha256:aaa", EndpointCategory::Auth);
    let now = SystemTime::now();

    for _ in 0..3 {
        admit(&store, &key, 3, now).await;
    }

    let outcome = store.try_increment(&key, 3, WINDOW, GRACE, now).await.unwrap();
    assert_eq!(outcome, IncrementOutcome::ConditionFailed);

    // The failed write must not have bumped the counter
    let entry = store.read(&key, now).await.unwrap().unwrap();
    assert_eq!(entry.request_count, 3);
}

#[tokio::test]
async fn test_condition_fails_on_stale_window() {
    let store = MemoryStore::new();
    let key = key("sha256:aaa", EndpointCategory::Workspace);
    let start = SystemTime::now();

    admit(&store, &key, 10, start).await;

    // Window elapsed but not expired: the increment condition fails and
    // only a reset can revive the key
    let later = start + WINDOW + Duration::from_secs(1);
    let outcome = store
        .try_increment(&key, 10, WINDOW, GRACE, later)
        .await
        .unwrap();
    assert_eq!(outcome, IncrementOutcome::ConditionFailed);
}

#[tokio::test]
async fn test_reset_race_has_single_winner() {
    let store = MemoryStore::new();
    let key = key("sha256:aaa", EndpointCategory::Workspace);
    let start = SystemTime::now();

    admit(&store, &key, 10, start).await;

    let later = start + WINDOW + Duration::from_secs(1);
    let observed = store.read(&key, later).await.unwrap().unwrap().window_start;

    // First observer wins the reset
    assert!(
        store
            .try_reset_window(&key, observed, WINDOW, GRACE, later)
            .await
            .unwrap()
    );
    let entry = store.read(&key, later).await.unwrap().unwrap();
    assert_eq!(entry.request_count, 1);
    assert_eq!(entry.window_start, later);

    // Second observer holds the old window_start and must lose
    assert!(
        !store
            .try_reset_window(&key, observed, WINDOW, GRACE, later)
            .await
            .unwrap()
    );
    let entry = store.read(&key, later).await.unwrap().unwrap();
    assert_eq!(entry.request_count, 1);
    assert_eq!(entry.window_start, later);
}

#[tokio::test]
async fn test_reset_on_absent_key_loses() {
    let store = MemoryStore::new();
    let key = key("sha256:aaa", EndpointCategory::Auth);
    let now = SystemTime::now();

    assert!(
        !store
            .try_reset_window(&key, now, WINDOW, GRACE, now)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_expired_entry_reads_as_absent() {
    let store = MemoryStore::new();
    let key = key("sha256:aaa", EndpointCategory::Auth);
    let start = SystemTime::now();

    admit(&store, &key, 5, start).await;

    let past_ttl = start + WINDOW + GRACE + Duration::from_secs(1);
    assert_eq!(store.read(&key, past_ttl).await.unwrap(), None);

    // A fresh increment starts a new window at count 1
    let entry = admit(&store, &key, 5, past_ttl).await;
    assert_eq!(entry.request_count, 1);
    assert_eq!(entry.window_start, past_ttl);
}

#[tokio::test]
async fn test_distinct_keys_do_not_interfere() {
    let store = MemoryStore::new();
    let now = SystemTime::now();

    let a = key("sha256:aaa", EndpointCategory::Auth);
    let b = key("sha256:bbb", EndpointCategory::Auth);
    let c = key("sha256:aaa", EndpointCategory::File);

    admit(&store, &a, 1, now).await;

    // Same hash + different category, and different hash + same category,
    // both start their own counters
    assert_eq!(admit(&store, &b, 1, now).await.request_count, 1);
    assert_eq!(admit(&store, &c, 1, now).await.request_count, 1);

    // While key `a` is exhausted
    let outcome = store.try_increment(&a, 1, WINDOW, GRACE, now).await.unwrap();
    assert_eq!(outcome, IncrementOutcome::ConditionFailed);
}

#[tokio::test]
async fn test_cleanup_sweeps_expired_entries() {
    let store = MemoryStore::builder()
        .capacity(16)
        .cleanup_interval(Duration::from_secs(30))
        .build();
    let now = SystemTime::now();

    for i in 0..5 {
        let key = key(&format!("sha256:{i}"), EndpointCategory::Auth);
        admit(&store, &key, 5, now).await;
    }
    assert_eq!(store.len(), 5);

    // Past every TTL and past the cleanup deadline: the next write sweeps
    let later = now + WINDOW + GRACE + Duration::from_secs(1);
    let fresh = key("sha256:fresh", EndpointCategory::Auth);
    admit(&store, &fresh, 5, later).await;

    assert!(!store.is_empty());
    assert_eq!(store.len(), 1);
    assert_eq!(store.expired_count(), 5);
}

#[tokio::test]
async fn test_scan_license_filters_by_hash() {
    let store = MemoryStore::new();
    let now = SystemTime::now();

    admit(&store, &key("sha256:aaa", EndpointCategory::Auth), 5, now).await;
    admit(&store, &key("sha256:aaa", EndpointCategory::File), 5, now).await;
    admit(&store, &key("sha256:aaa", EndpointCategory::File), 5, now).await;
    admit(&store, &key("sha256:bbb", EndpointCategory::Auth), 5, now).await;

    let entries = store.scan_license("sha256:aaa", now).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, EndpointCategory::Auth);
    assert_eq!(entries[0].1.request_count, 1);
    assert_eq!(entries[1].0, EndpointCategory::File);
    assert_eq!(entries[1].1.request_count, 2);

    assert!(store.scan_license("sha256:ccc", now).await.unwrap().is_empty());
}
