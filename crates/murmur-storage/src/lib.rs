//! Message storage for Murmur.
//!
//! This crate provides the durable record of chat messages and the narrow
//! contract every backend satisfies:
//!
//! - [`MemoryStore`] keeps messages in an ordered vector (volatile).
//! - [`PostgresStore`] maps the contract onto a single `messages` table
//!   (requires the `postgres` feature).
//!
//! ## Example
//!
//! ```rust
//! use murmur_storage::{MemoryStore, Message, MessageStore};
//!
//! # async fn demo() -> murmur_storage::Result<()> {
//! let store = MemoryStore::new();
//! let message = Message::new("alice", "Hello")?;
//! store.save(&message).await?;
//!
//! let fetched = store.get(&message.id).await?;
//! assert_eq!(fetched, message);
//! # Ok(())
//! # }
//! ```

mod error;
mod memory;
mod message;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use message::{next_timestamp, Message};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStore};
pub use traits::MessageStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
