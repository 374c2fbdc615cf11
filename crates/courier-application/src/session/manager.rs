use super::model::Session;
use courier_core::protocol::{LoadSessionRequest, NewSessionRequest, SessionId};
use courier_core::session::{ConversationStore, ExecutionFactory};
use courier_core::{CourierError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns the `SessionId → Session` map.
///
/// `SessionManager` is responsible for:
/// - Creating sessions through the execution factory
/// - Rehydrating sessions from the conversation store
/// - Routing cancellation to the right session
///
/// Whether a session currently has a prompt in flight is tracked by the
/// router, not here.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    factory: Arc<dyn ExecutionFactory>,
    /// Absent when the agent runs without persistence; `load_session` then fails.
    store: Option<Arc<dyn ConversationStore>>,
}

impl SessionManager {
    /// Creates a new `SessionManager`.
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds execution handles for new and loaded sessions
    /// * `store` - Conversation store consulted by `load_session`
    pub fn new(factory: Arc<dyn ExecutionFactory>, store: Option<Arc<dyn ConversationStore>>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            store,
        }
    }

    /// Creates a session whose id is the new conversation's id.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if the execution handle cannot be built.
    pub async fn new_session(&self, request: &NewSessionRequest) -> Result<Arc<Session>> {
        let handle = self.factory.create(request).await?;
        let id = SessionId::new(handle.conversation_id());
        let session = Arc::new(Session::new(id.clone(), handle));

        self.sessions.write().await.insert(id.clone(), session.clone());
        tracing::info!(session_id = %id, cwd = %request.cwd, "Created session");
        Ok(session)
    }

    /// Rehydrates a session from the conversation store.
    ///
    /// Loading an id that is already live replaces the in-memory entry.
    ///
    /// # Errors
    ///
    /// - `CourierError::StoreUnavailable` when no store is configured
    /// - `CourierError::LoadFailed` when the store fails or has no record
    pub async fn load_session(&self, request: &LoadSessionRequest) -> Result<Arc<Session>> {
        let store = self.store.as_ref().ok_or(CourierError::StoreUnavailable)?;
        let id = &request.session_id;

        let record = store
            .load(id.as_str())
            .await
            .map_err(|e| CourierError::load_failed(e.to_string()))?
            .ok_or_else(|| CourierError::load_failed(format!("conversation not found: {id}")))?;

        let handle = self.factory.resume(record, request).await?;
        let session = Arc::new(Session::new(id.clone(), handle));

        let replaced = self.sessions.write().await.insert(id.clone(), session.clone());
        tracing::info!(session_id = %id, replaced = replaced.is_some(), "Loaded session");
        Ok(session)
    }

    /// Looks up a live session.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::NotFound` ("session not found: <id>") if absent.
    pub async fn get_session(&self, id: &SessionId) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CourierError::not_found("session", id.as_str()))
    }

    /// Cancels the session's current prompt, if any.
    pub async fn cancel(&self, id: &SessionId) -> Result<()> {
        let session = self.get_session(id).await?;
        session.cancel();
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
