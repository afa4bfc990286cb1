//! Axum middleware that puts a [`RateLimiter`] in front of request handling.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, instrument};

use crate::ratelimit::{Decision, RateLimiter, RequestIdentity};

pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Shared state for the rate limit middleware.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    path_prefix: Option<Arc<str>>,
}

impl RateLimitState {
    /// Limit every request with `limiter`.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            path_prefix: None,
        }
    }

    /// Only limit requests whose path starts with `prefix`.
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(Arc::from(prefix.into()));
        self
    }

    /// The limiter behind this middleware.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn applies_to(&self, path: &str) -> bool {
        self.path_prefix
            .as_deref()
            .map_or(true, |prefix| path.starts_with(prefix))
    }
}

/// Count the request and either pass it on or answer `429 Too Many Requests`.
///
/// Install with `axum::middleware::from_fn_with_state`. The peer address is
/// read from [`ConnectInfo`] when the server provides it.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.applies_to(request.uri().path()) {
        return next.run(request).await;
    }

    let identity = request_identity(&request);
    let decision = state.limiter.check_request(&identity);

    if decision.admitted {
        let mut response = next.run(request).await;
        apply_headers(response.headers_mut(), &decision);
        response
    } else {
        debug!(
            remote_addr = ?identity.remote_addr,
            retry_after_secs = ?decision.retry_after_secs,
            "Rejecting request over rate limit"
        );
        rejection(state.limiter.message(), &decision)
    }
}

/// Collect the attributes a key strategy may use.
pub fn request_identity(request: &Request) -> RequestIdentity {
    RequestIdentity {
        remote_addr: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip()),
        forwarded_for: request
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
        path: request.uri().path().to_owned(),
    }
}

/// Write the limit, remaining and reset headers, plus `Retry-After` on rejection.
pub fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET.clone(), HeaderValue::from(decision.reset_at_secs()));
    if let Some(retry_after) = decision.retry_after_secs {
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    }
}

fn rejection(message: &str, decision: &Decision) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({ "message": message })),
    )
        .into_response();
    apply_headers(response.headers_mut(), decision);
    response
}
