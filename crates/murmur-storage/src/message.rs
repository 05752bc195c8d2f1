//! The persisted chat message.

use crate::{Result, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Microsecond timestamp of the most recently issued message.
static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// A chat message. Immutable once persisted; deletion is the only mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-generated unique identifier.
    pub id: String,
    /// Free-form, unauthenticated sender label.
    pub sender: String,
    /// Message body.
    pub content: String,
    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a new message with a fresh id and the next creation timestamp.
    ///
    /// Fails with [`StorageError::Validation`] if `sender` or `content` is empty.
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        let sender = sender.into();
        let content = content.into();

        if sender.is_empty() {
            return Err(StorageError::Validation("sender is required".to_string()));
        }
        if content.is_empty() {
            return Err(StorageError::Validation("content is required".to_string()));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            content,
            created_at: next_timestamp(),
        })
    }
}

/// Returns the current time truncated to microseconds, strictly later than
/// any timestamp previously returned in this process.
///
/// Microsecond precision matches `timestamptz`, so a message read back from
/// the relational backend compares equal to the one that was written.
pub fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let previous = LAST_TIMESTAMP_MICROS
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or(now);
    let issued = now.max(previous.saturating_add(1));

    DateTime::from_timestamp_micros(issued).unwrap_or_else(Utc::now)
}
