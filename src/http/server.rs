//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{rate_limit, RateLimitState};
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::RateLimiter;

/// HTTP server with the rate limiter installed in front of its routes.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
    /// Only paths under this prefix are limited
    path_prefix: Option<String>,
}

impl HttpServer {
    /// Create a new HTTP server that limits every path.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            addr,
            rate_limiter,
            path_prefix: None,
        }
    }

    /// Restrict limiting to paths under `prefix`.
    pub fn with_path_prefix(mut self, prefix: Option<String>) -> Self {
        self.path_prefix = prefix;
        self
    }

    /// Build the router with the rate limit layer applied.
    pub fn router(&self) -> Router {
        let mut state = RateLimitState::new(self.rate_limiter.clone());
        if let Some(prefix) = &self.path_prefix {
            state = state.with_path_prefix(prefix.clone());
        }

        Router::new()
            .route("/health", get(health))
            .route("/api/status", get(status))
            .with_state(self.rate_limiter.clone())
            .layer(axum::middleware::from_fn_with_state(state, rate_limit))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GatekeeperError::Io(e)
        })?;

        info!(
            addr = %self.addr,
            path_prefix = ?self.path_prefix,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GatekeeperError::Io(e)
        })
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn status(State(limiter): State<Arc<RateLimiter>>) -> impl IntoResponse {
    let options = limiter.options();
    Json(serde_json::json!({
        "limit": options.max,
        "window_ms": options.window_ms,
        "key_strategy": options.key_strategy,
        "tracked_keys": limiter.tracked_keys(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimiterOptions, ManualClock};
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server(max: u64) -> HttpServer {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::with_clock(LimiterOptions::new(60_000, max), clock).unwrap();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        HttpServer::new(addr, Arc::new(limiter)).with_path_prefix(Some("/api".to_string()))
    }

    fn get_request(path: &str) -> axum::extract::Request {
        axum::http::Request::builder()
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_not_limited() {
        let router = server(1).router();

        for _ in 0..3 {
            let response = router.clone().oneshot(get_request("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_status_reports_limiter_state() {
        let router = server(2).router();

        let response = router.oneshot(get_request("/api/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["limit"], 2);
        assert_eq!(body["window_ms"], 60_000);
        assert_eq!(body["key_strategy"], "address");
        // The status request itself has been counted.
        assert_eq!(body["tracked_keys"], 1);
    }

    #[tokio::test]
    async fn test_api_routes_are_limited() {
        let router = server(1).router();

        let first = router.clone().oneshot(get_request("/api/status")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = router.oneshot(get_request("/api/status")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_stops_on_signal() {
        let server = server(10);
        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
