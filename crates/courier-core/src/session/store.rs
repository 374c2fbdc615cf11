//! Conversation store trait.

use super::message::ConversationRecord;
use crate::error::Result;
use async_trait::async_trait;

/// Durable storage for conversation records.
///
/// `session/load` only succeeds for ids this store already knows about.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Loads a conversation by id.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: Conversation found
    /// - `Ok(None)`: No conversation with this id
    /// - `Err(_)`: Storage failure
    async fn load(&self, id: &str) -> Result<Option<ConversationRecord>>;

    /// Saves (creates or replaces) a conversation.
    async fn save(&self, record: &ConversationRecord) -> Result<()>;
}
