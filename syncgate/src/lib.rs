//! # syncgate
//!
//! License-tiered admission control for the sync API.
//!
//! Every tenant-facing operation of the sync service is gated by a quota
//! keyed on the caller's pseudonymous license hash and the coarse category
//! of the endpoint being hit. Request handlers are stateless and share no
//! memory; the only coordination mechanism is the counter store's atomic
//! conditional write, so the same admission decision comes out no matter
//! which process (or host) evaluates it.
//!
//! ## Overview
//!
//! A check runs through four small pieces:
//!
//! - [`LicenseContext`]: tenant key and tier, extracted from the verified
//!   claims the upstream authorizer attached to the request
//! - [`EndpointCategory`]: coarse route classification (auth, workspace,
//!   file, annotation, member, location, other)
//! - [`QuotaTable`]: static tier × category limits with conservative
//!   fallbacks for configuration gaps
//! - [`CounterStore`]: the shared counter rows, driven exclusively through
//!   conditional check-and-increment writes
//!
//! [`RateLimiter::check`] composes them into a [`Decision`] carrying the
//! remaining quota and reset time.
//!
//! ## Quick start
//!
//! ```
//! use syncgate::{Claims, EndpointCategory, LicenseContext, MemoryStore};
//! use syncgate::{QuotaTable, RateLimiter};
//! use std::time::SystemTime;
//!
//! # tokio_test::block_on(async {
//! let limiter = RateLimiter::new(MemoryStore::new(), QuotaTable::default());
//!
//! let mut claims = Claims::new();
//! claims.insert("license_key_hash", "sha256:9f86d081884c7d65");
//! claims.insert("license_tier", "premium");
//!
//! let ctx = LicenseContext::from_claims(&claims).unwrap();
//! let category = EndpointCategory::resolve("/workspaces/w1/files");
//!
//! let decision = limiter.check(&ctx, category, SystemTime::now()).await;
//! assert!(decision.allowed);
//! assert_eq!(decision.limit, 500);
//! # });
//! ```
//!
//! ## Counting model
//!
//! The store keeps one fixed-window counter per (license hash, category)
//! key, rolled over atomically when the window elapses. This is not a
//! sliding window: a burst right at a window boundary can briefly see up to
//! twice the limit across the two windows, and concurrent checks racing a
//! rollover can admit a small number of extra requests against the dying
//! window. Both are accepted tolerances of the single-conditional-write
//! coordination model.
//!
//! ## Failure policy
//!
//! When the store is unreachable the limiter does not guess: the configured
//! [`FailurePolicy`] decides whether degraded checks admit or deny, and the
//! resulting [`Decision`] is marked `degraded` so the embedding layer can
//! count enforcement outages separately from tenant quota exhaustion.
//!
//! ## Features
//!
//! - `ahash` (default): use AHash for the in-memory store's key map

pub mod core;

pub use core::category::EndpointCategory;
pub use core::license::{
    AuthError, Claims, LICENSE_HASH_CLAIM, LICENSE_TIER_CLAIM, LicenseContext, LicenseTier,
};
pub use core::limiter::{Decision, FailurePolicy, RateLimiter, RateLimiterBuilder};
pub use core::quota::{InvalidQuota, Quota, QuotaTable};
pub use core::store::{
    CounterKey, CounterStore, IncrementOutcome, MemoryStore, MemoryStoreBuilder, RateLimitEntry,
    StoreError,
};
