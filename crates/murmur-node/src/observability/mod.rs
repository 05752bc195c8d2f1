//! # Observability Module
//!
//! Observability for the Murmur node:
//!
//! - **Structured Logging**: JSON or pretty logs with request IDs
//! - **Prometheus Metrics**: HTTP traffic plus live connection and hub counters
//! - **Request Tracing**: Request ID propagation through `x-request-id`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::{middleware, Router};
//! use murmur_node::observability::{init_logging, request_id_middleware, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//!
//! let app: Router<()> = Router::new()
//!     .layer(middleware::from_fn(request_id_middleware));
//! ```

mod logging;
mod metrics;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use metrics::{MetricsState, METRICS};
pub use middleware::{metrics_handler, metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
