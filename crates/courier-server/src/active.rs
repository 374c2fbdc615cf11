//! Single-flight guard for `session/prompt`.
//!
//! A session id is present here while a prompt handler for it is running
//! and has not been cancelled. The entry's token is the parent scope of
//! that turn. Cancelling frees the slot at once, so the next prompt may
//! start while the old turn is still winding down.

use courier_core::protocol::SessionId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Claim {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct ActivePrompts {
    next_generation: AtomicU64,
    entries: Mutex<HashMap<SessionId, Claim>>,
}

impl ActivePrompts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the session for one prompt.
    ///
    /// Returns `None` when another prompt for the same session is still
    /// running. The claim is released when the guard drops.
    pub fn try_begin(&self, session_id: &SessionId, token: CancellationToken) -> Option<ActivePromptGuard<'_>> {
        let mut entries = self.lock_entries();
        if entries.contains_key(session_id) {
            return None;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            session_id.clone(),
            Claim {
                generation,
                token: token.clone(),
            },
        );
        Some(ActivePromptGuard {
            prompts: self,
            session_id: session_id.clone(),
            generation,
            token,
        })
    }

    /// Releases the session's claim and fires its token.
    ///
    /// Returns `false` when no prompt holds the session.
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        let claim = self.lock_entries().remove(session_id);
        match claim {
            Some(claim) => {
                claim.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.lock_entries().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<SessionId, Claim>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ActivePromptGuard<'a> {
    prompts: &'a ActivePrompts,
    session_id: SessionId,
    generation: u64,
    token: CancellationToken,
}

impl ActivePromptGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ActivePromptGuard<'_> {
    fn drop(&mut self) {
        let mut entries = self.prompts.lock_entries();
        // A cancelled turn may outlive its claim; leave a newer one alone.
        if entries
            .get(&self.session_id)
            .is_some_and(|claim| claim.generation == self.generation)
        {
            entries.remove(&self.session_id);
        }
        drop(entries);
        // Anything the turn spawned under this scope ends with it.
        self.token.cancel();
    }
}
