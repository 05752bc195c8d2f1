//! Message store contract.
//!
//! Defines the interface that every message backend implements, so the
//! REST handler and the realtime hub never depend on a concrete store.

use crate::{Message, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable append/read/delete of messages keyed by opaque id.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a new message.
    async fn save(&self, message: &Message) -> Result<()>;

    /// Returns every message ordered by creation time, oldest first.
    async fn list(&self) -> Result<Vec<Message>>;

    /// Returns the message with the given id.
    async fn get(&self, id: &str) -> Result<Message>;

    /// Removes the message with the given id.
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn save(&self, message: &Message) -> Result<()> {
        (**self).save(message).await
    }

    async fn list(&self) -> Result<Vec<Message>> {
        (**self).list().await
    }

    async fn get(&self, id: &str) -> Result<Message> {
        (**self).get(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id).await
    }
}
