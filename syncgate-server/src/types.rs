//! Wire types for the admission API
//!
//! JSON shapes shared by the middleware's error responses and the
//! check/status endpoints.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use syncgate::{Decision, EndpointCategory, RateLimitEntry};

/// Request body for `POST /v1/check`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Pseudonymous license key hash (the rate-limit partition key)
    pub license_hash: String,
    /// License tier name; unknown or absent tiers serve under basic limits
    pub tier: Option<String>,
    /// Request path, resolved to an endpoint category
    pub path: String,
}

/// Response body for `POST /v1/check`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Limit in force for this tier and category
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Unix seconds at which the window elapses
    pub reset_at: u64,
    /// Seconds to wait before retrying (0 when allowed)
    pub retry_after: u64,
}

impl CheckResponse {
    pub fn from_decision(decision: &Decision, now: SystemTime) -> Self {
        CheckResponse {
            allowed: decision.allowed,
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: unix_secs(decision.reset_at),
            retry_after: if decision.allowed {
                0
            } else {
                ceil_secs(decision.retry_after(now))
            },
        }
    }
}

/// One live counter in a `GET /v1/status/{license_hash}` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusEntry {
    pub category: EndpointCategory,
    pub request_count: u32,
    /// Unix seconds at which the current window opened
    pub window_start: u64,
    /// Unix seconds at which the row's TTL elapses
    pub expires_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub license_hash: String,
    pub entries: Vec<StatusEntry>,
}

impl StatusResponse {
    pub fn from_entries(
        license_hash: impl Into<String>,
        entries: Vec<(EndpointCategory, RateLimitEntry)>,
    ) -> Self {
        StatusResponse {
            license_hash: license_hash.into(),
            entries: entries
                .into_iter()
                .map(|(category, entry)| StatusEntry {
                    category,
                    request_count: entry.request_count,
                    window_start: unix_secs(entry.window_start),
                    expires_at: unix_secs(entry.expires_at),
                })
                .collect(),
        }
    }
}

/// Error body shape shared by every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorBody {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthenticated() -> Self {
        ErrorBody::new(
            "unauthenticated",
            "License claims missing from request context.",
        )
    }
}

pub(crate) fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub(crate) fn ceil_secs(d: std::time::Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 { secs + 1 } else { secs }
}
