//! # Murmur Node
//!
//! HTTP and WebSocket server for the Murmur real-time messaging backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Murmur Node                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                    HTTP API Layer                     │  │
//! │  │  • Messages REST (list, create, get, delete)          │  │
//! │  │  • Live connections (/ws?sender=...)                  │  │
//! │  │  • Health, stats and Prometheus metrics               │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                              │                              │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                 Real-time Layer (Hub)                 │  │
//! │  │  • Connection membership                              │  │
//! │  │  • Persist, then fan out to every peer                │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                              │                              │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                    Storage Layer                      │  │
//! │  │  • In-memory store                                    │  │
//! │  │  • PostgreSQL store                                   │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin murmur-node -- --port 8080 --storage memory
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Message REST endpoints and router assembly
//! - [`realtime_api`] - WebSocket endpoint and live connection stats
//! - [`config`] - Command-line and environment configuration
//! - [`observability`] - Structured logging, metrics, and request tracing
//! - [`health`] - Liveness endpoint
//!
//! ## Example: Creating an AppState
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use murmur_node::api::{create_router, AppState};
//! use murmur_realtime::{ConnectionConfig, HubConfig};
//! use murmur_storage::MemoryStore;
//!
//! # async fn demo() {
//! let state = AppState::new(
//!     Arc::new(MemoryStore::new()),
//!     HubConfig::default(),
//!     ConnectionConfig::default(),
//! );
//! let app = create_router(state);
//! # }
//! ```

pub mod api;
pub mod config;
pub mod health;
pub mod observability;
pub mod realtime_api;

pub use api::{create_router, ApiError, AppState};
pub use config::{Args, NodeConfig, StorageConfig};
