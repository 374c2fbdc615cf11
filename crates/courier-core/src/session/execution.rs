//! Contracts between the session layer and the execution engine.

use super::message::ConversationRecord;
use crate::client::ClientRpc;
use crate::error::Result;
use crate::protocol::types::{ContentBlock, LoadSessionRequest, NewSessionRequest, SessionId, StopReason};
use crate::protocol::update::SessionUpdate;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sink for `session/update` events.
///
/// The router implements this by writing a notification to the client and
/// appending the event to update storage.
#[async_trait]
pub trait UpdateSender: Send + Sync {
    async fn send_update(&self, session_id: &SessionId, update: SessionUpdate) -> Result<()>;
}

/// Everything one prompt turn needs.
#[derive(Clone)]
pub struct PromptContext {
    pub session_id: SessionId,
    pub prompt: Vec<ContentBlock>,
    pub sender: Arc<dyn UpdateSender>,
    pub client: ClientRpc,
    /// Fires when the client cancels the turn.
    pub cancel: CancellationToken,
}

/// A live conversation owned by the execution engine.
#[async_trait]
pub trait ExecutionHandle: Send + Sync {
    /// Identifier of the underlying conversation. Used as the session id.
    fn conversation_id(&self) -> &str;

    /// Runs one prompt turn, streaming events through `ctx.sender`.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Cancelled` when `ctx.cancel` fires before the
    /// turn completes.
    async fn send_message(&self, ctx: PromptContext) -> Result<StopReason>;
}

/// Creates and rehydrates execution handles.
#[async_trait]
pub trait ExecutionFactory: Send + Sync {
    async fn create(&self, request: &NewSessionRequest) -> Result<Arc<dyn ExecutionHandle>>;

    /// Rebinds a handle to an existing conversation.
    async fn resume(
        &self,
        record: ConversationRecord,
        request: &LoadSessionRequest,
    ) -> Result<Arc<dyn ExecutionHandle>>;
}
