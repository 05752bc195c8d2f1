//! # Murmur Real-time
//!
//! Live message delivery for the Murmur messaging backend.
//!
//! Peers hold a persistent connection; every chat frame a peer sends is
//! persisted through a [`murmur_storage::MessageStore`] and then delivered to
//! every connected peer, the sender included.
//!
//! ## Features
//!
//! - **Hub**: a single coordinating task that owns connection membership and
//!   serializes register, unregister and broadcast through message passing
//! - **Connections**: one reader and one writer per peer, with ping/pong
//!   liveness and a bounded outbound queue
//! - **Backpressure**: a peer whose queue is full is evicted instead of
//!   stalling the broadcaster
//!
//! ## Example
//!
//! ```rust
//! use murmur_realtime::{Hub, HubConfig};
//! use murmur_storage::MemoryStore;
//!
//! # async fn demo() -> Result<(), murmur_realtime::RealtimeError> {
//! let hub = Hub::spawn(MemoryStore::new(), HubConfig::default());
//!
//! let (_id, mut outbound) = hub.register("bob").await?;
//! hub.broadcast("alice", "Hello").await?;
//!
//! let frame = outbound.recv().await.unwrap();
//! assert!(frame.contains("Hello"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Wire Protocol
//!
//! ### Client -> Server Messages
//!
//! ```json
//! {"type": "message", "content": "Hi"}
//! ```
//!
//! Any other `type` is ignored.
//!
//! ### Server -> Client Messages
//!
//! ```json
//! {"type": "message", "id": "...", "sender": "alice", "content": "Hi", "created_at": "..."}
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  register / unregister  ┌──────────────────────────┐
//! │  Connection   │ ──────────────────────► │           Hub            │
//! │  reader task  │  broadcast(sender, msg) │  membership map (owned)  │
//! └───────────────┘ ──────────────────────► │  store.save() then       │
//!                                           │  try_send to each queue  │
//! ┌───────────────┐   outbound queue        └────────────┬─────────────┘
//! │  Connection   │ ◄────────────────────────────────────┘
//! │  writer task  │ ──► transport (text frames, pings, close)
//! └───────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod hub;
pub mod protocol;

// Re-export main types
pub use connection::{serve_connection, ConnectionConfig};
pub use error::RealtimeError;
pub use hub::{
    ConnectionId, Hub, HubConfig, HubHandle, HubStats, OutboundFrame, OutboundReceiver,
};
pub use protocol::{Frame, InboundEnvelope, OutboundEnvelope, MESSAGE_TYPE};
