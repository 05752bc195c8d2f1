//! Volatile in-memory message store.

use crate::{Message, MessageStore, Result, StorageError};
use async_trait::async_trait;
use parking_lot::RwLock;

/// An in-memory message store.
///
/// Messages are kept ordered by `created_at`; lookups and deletes scan
/// linearly.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<Message>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Returns true if no messages are stored.
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save(&self, message: &Message) -> Result<()> {
        let mut messages = self.messages.write();
        let index = messages.partition_point(|m| m.created_at <= message.created_at);
        messages.insert(index, message.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Message>> {
        Ok(self.messages.read().clone())
    }

    async fn get(&self, id: &str) -> Result<Message> {
        self.messages
            .read()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut messages = self.messages.write();
        let index = messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        messages.remove(index);
        Ok(())
    }
}
