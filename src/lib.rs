//! Gatekeeper - Per-key Rate Limiting Middleware
//!
//! This crate implements a fixed-window admission-control gate for HTTP
//! services. Each limiter owns an in-memory store of per-key counters, expires
//! them with a background sweep, and plugs into an axum pipeline as middleware
//! that answers `429 Too Many Requests` once a caller exceeds its budget.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
