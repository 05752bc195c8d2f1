//! Error types for the real-time module.

use murmur_storage::StorageError;
use thiserror::Error;

/// Errors that can occur in real-time operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// An inbound frame could not be decoded.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A frame exceeded the configured size limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Persisting a broadcast message failed; nothing was fanned out.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The peer did not answer pings in time.
    #[error("read deadline expired")]
    DeadlineExpired,

    /// Reading from or writing to the transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The hub coordination loop is no longer running.
    #[error("hub closed")]
    HubClosed,
}
