//! # Health Check Module
//!
//! Liveness check for load balancers and orchestrators. It reports that the
//! process is serving HTTP and performs no dependency checks.

use axum::{routing::get, Router};

/// Body returned by the liveness check.
pub const HEALTHY: &str = "OK";

/// Create health check routes.
pub fn health_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(liveness))
}

/// Liveness handler.
async fn liveness() -> &'static str {
    HEALTHY
}
