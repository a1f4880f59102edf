//! # syncgate-server
//!
//! The service embedding of the [`syncgate`] admission-control library.
//!
//! ## Purpose
//!
//! The sync API runs as a fleet of stateless request handlers that all
//! enforce the same per-license quotas. This crate provides the two ways
//! those handlers meet the limiter:
//!
//! - **In-process**: [`middleware::GateState::apply_rate_limiting`] wraps an
//!   axum router so every tenant route is checked before its handler runs.
//!   Denied requests short-circuit into a 429 with standard rate-limit
//!   headers; admitted responses carry the same headers so clients can tune
//!   their backoff.
//! - **Out-of-process**: the binary serves `POST /v1/check`, letting
//!   handlers written in other stacks consult the same limiter over HTTP,
//!   plus `GET /v1/status/{license_hash}` for current counters, `/health`,
//!   and Prometheus `/metrics`.
//!
//! ## Quick start
//!
//! ```bash
//! # Built-in quota table, fail-closed (the default)
//! syncgate --port 8080
//!
//! # Operator-supplied quotas, fail-open while the store is migrated
//! syncgate --quotas quotas.json --failure-policy open
//! ```
//!
//! Configuration comes from CLI arguments or `SYNCGATE_*` environment
//! variables; CLI takes precedence.

pub mod config;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod types;
