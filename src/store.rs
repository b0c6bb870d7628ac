//! Collaborator seams shared by the server and client halves.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::ChatError,
    model::{Conversation, Message, NewMessage, Notification},
};

/// Append-only chat history keyed by conversation.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Up to `limit` messages strictly older than `before`, newest first.
    /// `before = None` starts from the latest message.
    async fn history(
        &self,
        conversation: &Conversation,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError>;

    /// Persists a message and returns it with its assigned id and timestamp.
    async fn append(&self, message: NewMessage) -> Result<Message, ChatError>;
}

#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Newest first.
    async fn list(&self, limit: u32, skip: u32) -> Result<Vec<Notification>, ChatError>;

    async fn unread_count(&self) -> Result<u64, ChatError>;

    async fn mark_read(&self, id: Uuid) -> Result<(), ChatError>;

    async fn mark_all_read(&self) -> Result<(), ChatError>;
}
