//! HTTP pipeline integration.
//!
//! The middleware maps each limiter decision to response headers or a
//! `429` JSON body; the server wires it in front of a small router.

mod middleware;
mod server;

pub use middleware::{
    apply_headers, rate_limit, request_identity, RateLimitState, X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::HttpServer;
