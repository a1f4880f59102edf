//! Rate-limiting middleware
//!
//! Wraps tenant routes so every request is checked against the limiter
//! before its handler runs. The upstream auth layer has already verified
//! the token and attached a [`Claims`] extension; this layer only consumes
//! it. Denials short-circuit into a 429 with the standard rate-limit
//! headers, admitted responses are annotated with the same headers, and a
//! degraded check (store unreachable, policy decided) is flagged with
//! `X-RateLimit-Error` instead of quota headers it cannot vouch for.

use crate::metrics::Metrics;
use crate::types::{ErrorBody, ceil_secs, unix_secs};
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use std::time::SystemTime;
use syncgate::{
    AuthError, Claims, CounterStore, Decision, EndpointCategory, LicenseContext, RateLimiter,
};

pub const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
/// Present instead of the quota headers when the failure policy decided.
pub const X_RATE_LIMIT_ERROR: HeaderName = HeaderName::from_static("x-ratelimit-error");

/// Shared handle to the limiter and metrics, injected into every gated
/// route. Constructed once at process start; there is no other state.
pub struct GateState<S> {
    pub limiter: Arc<RateLimiter<S>>,
    pub metrics: Arc<Metrics>,
}

impl<S> GateState<S> {
    pub fn new(limiter: Arc<RateLimiter<S>>, metrics: Arc<Metrics>) -> Self {
        GateState { limiter, metrics }
    }
}

impl<S> Clone for GateState<S> {
    fn clone(&self) -> Self {
        GateState {
            limiter: Arc::clone(&self.limiter),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S: CounterStore + 'static> GateState<S> {
    /// Wrap a router's routes with admission control.
    ///
    /// Every route in `router` gets the full check; handlers run only for
    /// admitted requests.
    pub fn apply_rate_limiting(&self, router: Router) -> Router {
        router.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            enforce::<S>,
        ))
    }
}

/// The admission check itself, usable directly with
/// [`axum::middleware::from_fn_with_state`].
pub async fn enforce<S: CounterStore + 'static>(
    State(state): State<GateState<S>>,
    request: Request,
    next: Next,
) -> Response {
    let now = SystemTime::now();

    let Some(claims) = request.extensions().get::<Claims>().cloned() else {
        state.metrics.record_unauthenticated();
        tracing::warn!(
            path = %request.uri().path(),
            "request reached rate limiting without license claims"
        );
        return unauthenticated_response();
    };

    let ctx = match LicenseContext::from_claims(&claims) {
        Ok(ctx) => ctx,
        Err(AuthError::Unauthenticated) => {
            state.metrics.record_unauthenticated();
            tracing::warn!(
                path = %request.uri().path(),
                "license key hash missing from claims"
            );
            return unauthenticated_response();
        }
    };

    let category = EndpointCategory::resolve(request.uri().path());
    let decision = state.limiter.check(&ctx, category, now).await;
    state.metrics.record_decision(category, &decision);

    if !decision.allowed {
        tracing::warn!(
            path = %request.uri().path(),
            method = %request.method(),
            category = %category,
            license_hash = %ctx.hash_prefix(),
            limit = decision.limit,
            "request blocked by rate limit"
        );
        return rate_limited_response(category, &decision, now);
    }

    let mut response = next.run(request).await;
    annotate_response(&mut response, &decision);
    response
}

/// 429 with the standard rate-limit headers and a category-specific body.
fn rate_limited_response(
    category: EndpointCategory,
    decision: &Decision,
    now: SystemTime,
) -> Response {
    let retry_after = ceil_secs(decision.retry_after(now));
    let headers = [
        (X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit)),
        (X_RATE_LIMIT_REMAINING, HeaderValue::from(0u32)),
        (
            X_RATE_LIMIT_RESET,
            HeaderValue::from(unix_secs(decision.reset_at)),
        ),
        (header::RETRY_AFTER, HeaderValue::from(retry_after)),
    ];

    let message = format!(
        "Rate limit exceeded for {} operations (limit {}). Please wait {} seconds before retrying.",
        category.label(),
        decision.limit,
        retry_after,
    );

    (
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        Json(ErrorBody::new("rate_limited", message)),
    )
        .into_response()
}

fn unauthenticated_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::unauthenticated()),
    )
        .into_response()
}

/// Annotate an admitted response with quota headers for client-side
/// backoff tuning. A degraded decision has no trustworthy counts, so it is
/// flagged instead.
fn annotate_response(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();
    if decision.degraded {
        headers.insert(
            X_RATE_LIMIT_ERROR,
            HeaderValue::from_static("rate_limit_check_failed"),
        );
        return;
    }

    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATE_LIMIT_RESET,
        HeaderValue::from(unix_secs(decision.reset_at)),
    );
}
