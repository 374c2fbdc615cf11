//! Registry of agent→client calls awaiting a response.
//!
//! Every outbound request gets a fresh integer id. The inbound reader
//! completes the matching slot by the response's normalized id, so a
//! client echoing `7` or `"7"` reaches the same waiter.

use courier_core::protocol::RpcError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// What a waiter receives: the raw `result` or the client's error object.
pub type CallOutcome = std::result::Result<Value, RpcError>;

#[derive(Debug, Default)]
pub struct PendingCalls {
    next_id: AtomicU64,
    slots: Mutex<HashMap<String, oneshot::Sender<CallOutcome>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id and a slot for its response.
    ///
    /// # Returns
    ///
    /// The wire id and the receiving half. The receiver errors when the slot
    /// is dropped without an answer (see [`PendingCalls::drain`]).
    pub fn register(&self) -> (u64, oneshot::Receiver<CallOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.lock_slots().insert(id.to_string(), tx);
        (id, rx)
    }

    /// Delivers a response to its waiter.
    ///
    /// Returns `false` when no call with `key` is outstanding, which is the
    /// case for unknown ids and for answers arriving after the caller gave up.
    pub fn complete(&self, key: &str, outcome: CallOutcome) -> bool {
        let Some(tx) = self.lock_slots().remove(key) else {
            return false;
        };
        if tx.send(outcome).is_err() {
            tracing::debug!(id = key, "Caller stopped waiting before the response arrived");
        }
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock_slots().remove(key).is_some()
    }

    /// Drops every outstanding slot so all waiters observe a closed channel.
    pub fn drain(&self) -> usize {
        let drained: Vec<_> = self.lock_slots().drain().collect();
        if !drained.is_empty() {
            tracing::debug!("Abandoned {} pending client call(s)", drained.len());
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the slot for `id` when the returned guard is dropped.
    pub fn guard(&self, id: u64) -> PendingGuard<'_> {
        PendingGuard {
            calls: self,
            key: id.to_string(),
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<CallOutcome>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps the registry free of slots whose caller has returned.
pub struct PendingGuard<'a> {
    calls: &'a PendingCalls,
    key: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.calls.remove(&self.key);
    }
}
