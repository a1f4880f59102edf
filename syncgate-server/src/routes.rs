//! HTTP surface of the admission service
//!
//! - `POST /v1/check` — admission decision for out-of-process callers
//! - `GET /v1/status/{license_hash}` — current counters for one license
//! - `GET /health` — liveness
//! - `GET /metrics` — Prometheus text format

use crate::middleware::GateState;
use crate::types::{CheckRequest, CheckResponse, ErrorBody, StatusResponse};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use std::time::SystemTime;
use syncgate::{
    AuthError, Claims, CounterStore, EndpointCategory, LICENSE_HASH_CLAIM, LICENSE_TIER_CLAIM,
    LicenseContext,
};

/// Build the service router.
pub fn router<S: CounterStore + 'static>(state: GateState<S>) -> Router {
    Router::new()
        .route("/v1/check", post(check::<S>))
        .route("/v1/status/{license_hash}", get(status::<S>))
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics::<S>))
        .with_state(state)
}

/// Run one admission check on behalf of an out-of-process handler.
///
/// The body carries the same claims the in-process middleware reads from
/// the request extension, so both paths share one extraction rule.
async fn check<S: CounterStore + 'static>(
    State(state): State<GateState<S>>,
    Json(request): Json<CheckRequest>,
) -> Response {
    let now = SystemTime::now();

    let mut claims = Claims::new();
    claims.insert(LICENSE_HASH_CLAIM, request.license_hash);
    if let Some(tier) = request.tier {
        claims.insert(LICENSE_TIER_CLAIM, tier);
    }

    let ctx = match LicenseContext::from_claims(&claims) {
        Ok(ctx) => ctx,
        Err(AuthError::Unauthenticated) => {
            state.metrics.record_unauthenticated();
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::unauthenticated()),
            )
                .into_response();
        }
    };

    let category = EndpointCategory::resolve(&request.path);
    let decision = state.limiter.check(&ctx, category, now).await;
    state.metrics.record_decision(category, &decision);

    Json(CheckResponse::from_decision(&decision, now)).into_response()
}

/// Current per-category counters for one license hash.
async fn status<S: CounterStore + 'static>(
    State(state): State<GateState<S>>,
    Path(license_hash): Path<String>,
) -> Response {
    let now = SystemTime::now();

    match state.limiter.store().scan_license(&license_hash, now).await {
        Ok(entries) => Json(StatusResponse::from_entries(license_hash, entries)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "rate limit status query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(
                    "internal_error",
                    "Failed to query rate limit status.",
                )),
            )
                .into_response()
        }
    }
}

async fn metrics<S: CounterStore + 'static>(State(state): State<GateState<S>>) -> String {
    state.metrics.export_prometheus()
}
