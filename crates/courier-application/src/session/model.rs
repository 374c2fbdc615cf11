//! A live session and its prompt state machine.
//!
//! ```text
//! Idle ──handle_prompt──▶ Prompting ──(return, any path)──▶ Idle
//! ```
//!
//! `cancel` is valid in either state. While idle it only raises the flag,
//! which the next prompt clears on entry. A cancelled turn may still be
//! winding down when the next one starts; each turn only clears its own
//! cancel handle.

use courier_core::client::ClientRpc;
use courier_core::protocol::{ContentBlock, SessionId, StopReason};
use courier_core::session::{ExecutionHandle, PromptContext, UpdateSender};
use courier_core::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct PromptState {
    cancel: Option<CancellationToken>,
    cancelled: bool,
    turn: u64,
}

/// One conversation bound to an execution handle.
pub struct Session {
    id: SessionId,
    execution: Arc<dyn ExecutionHandle>,
    state: Mutex<PromptState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(id: SessionId, execution: Arc<dyn ExecutionHandle>) -> Self {
        Self {
            id,
            execution,
            state: Mutex::new(PromptState::default()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn execution(&self) -> &Arc<dyn ExecutionHandle> {
        &self.execution
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock_state().cancelled
    }

    /// True while a prompt holds a cancel handle.
    pub fn is_prompting(&self) -> bool {
        self.lock_state().cancel.is_some()
    }

    /// Marks the session cancelled and fires the running prompt's scope.
    ///
    /// Idempotent. Safe to call from any task.
    pub fn cancel(&self) {
        let mut state = self.lock_state();
        state.cancelled = true;
        if let Some(cancel) = &state.cancel {
            cancel.cancel();
        }
        tracing::debug!(session_id = %self.id, prompting = state.cancel.is_some(), "Session cancelled");
    }

    /// Runs one prompt turn through the execution handle.
    ///
    /// # Arguments
    ///
    /// * `parent` - Scope the turn's own cancellation token is derived from
    /// * `prompt` - Content blocks to send
    /// * `sender` - Sink for streamed updates
    /// * `client` - Agent→client calls available to the engine
    ///
    /// # Returns
    ///
    /// `StopReason::Cancelled` when the session was cancelled during the turn
    /// or the engine reported a cancellation; the engine's own stop reason
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Any non-cancellation error from the execution handle.
    pub async fn handle_prompt(
        &self,
        parent: &CancellationToken,
        prompt: Vec<ContentBlock>,
        sender: Arc<dyn UpdateSender>,
        client: ClientRpc,
    ) -> Result<StopReason> {
        let token = parent.child_token();
        let turn = {
            let mut state = self.lock_state();
            state.turn += 1;
            state.cancel = Some(token.clone());
            state.cancelled = false;
            state.turn
        };
        let _reset = ClearCancelOnDrop { session: self, turn };

        let ctx = PromptContext {
            session_id: self.id.clone(),
            prompt,
            sender,
            client,
            cancel: token.clone(),
        };
        let result = self.execution.send_message(ctx).await;

        let cancelled = token.is_cancelled() || {
            let state = self.lock_state();
            state.turn == turn && state.cancelled
        };
        match result {
            Ok(_) if cancelled => Ok(StopReason::Cancelled),
            Err(e) if cancelled || e.is_cancelled() => {
                tracing::debug!(session_id = %self.id, "Prompt ended by cancellation: {}", e);
                Ok(StopReason::Cancelled)
            }
            other => other,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PromptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the stored cancel handle however `handle_prompt` exits.
struct ClearCancelOnDrop<'a> {
    session: &'a Session,
    turn: u64,
}

impl Drop for ClearCancelOnDrop<'_> {
    fn drop(&mut self) {
        let mut state = self.session.lock_state();
        if state.turn == self.turn {
            state.cancel = None;
        }
    }
}
