//! Durable, replayable log of `session/update` events.
//!
//! Each session gets one JSON Lines file, `<base_dir>/<session_id>.jsonl`.
//! Every row is written with a single `write_all` and synced before the call
//! returns. A crash mid-write can still leave a torn last row; readers skip
//! it and the next open truncates it before appending.
//!
//! # Locking
//!
//! The registry mutex only guards the `SessionId → log` map and is never held
//! while waiting on a session's own mutex. Sessions therefore never block one
//! another, and within one session every operation is serialized.
//!
//! A log removed from the registry (by `close_session`, `delete` or `close`)
//! is marked retired. A caller that fetched the log just before removal sees
//! the flag after acquiring it and goes back to the registry for a fresh one.

use super::merge::MergeBuffer;
use courier_core::protocol::{SessionId, SessionUpdate};
use courier_core::{CourierError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One persisted row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpdate {
    pub session_id: SessionId,
    pub update: SessionUpdate,
}

#[derive(Debug, Default)]
struct SessionLog {
    buffer: MergeBuffer,
    /// Opened on the first durable row.
    file: Option<File>,
    retired: bool,
}

type SessionSlot = Arc<Mutex<SessionLog>>;

/// Update log with text coalescing.
pub struct UpdateStorage {
    base_dir: PathBuf,
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
    closed: AtomicBool,
}

impl UpdateStorage {
    /// Creates a storage rooted at `base_dir`.
    ///
    /// The directory is created lazily when the first row is written.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            sessions: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Records one update.
    ///
    /// Same-kind text chunks are held in memory and written as one row when
    /// the kind changes, a non-mergeable update arrives, or the session is
    /// flushed.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error when a row cannot be written,
    /// and `CourierError::Internal` after [`close`](Self::close).
    pub async fn append_update(&self, session_id: &SessionId, update: SessionUpdate) -> Result<()> {
        let mut log = self.lock_or_create(session_id).await?;
        let rows = log.buffer.push(update);
        for row in rows {
            self.write_row(&mut log, session_id, row).await?;
        }
        Ok(())
    }

    /// Writes the pending merge, if any, as one row.
    pub async fn flush(&self, session_id: &SessionId) -> Result<()> {
        if let Some((_, mut log)) = self.lock_existing(session_id).await {
            self.flush_locked(&mut log, session_id).await?;
        }
        Ok(())
    }

    /// Flushes and then drops the in-memory state of a session.
    ///
    /// Rows already written stay on disk.
    pub async fn close_session(&self, session_id: &SessionId) -> Result<()> {
        let Some((slot, mut log)) = self.lock_existing(session_id).await else {
            return Ok(());
        };
        self.flush_locked(&mut log, session_id).await?;
        self.retire(session_id, &slot, &mut log).await;
        tracing::debug!(session_id = %session_id, "Closed update log");
        Ok(())
    }

    /// Drops in-memory state and removes every stored row of the session.
    pub async fn delete(&self, session_id: &SessionId) -> Result<()> {
        let path = self.session_path(session_id)?;
        if let Some((slot, mut log)) = self.lock_existing(session_id).await {
            log.buffer = MergeBuffer::new();
            self.retire(session_id, &slot, &mut log).await;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(session_id = %session_id, "Deleted update log");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns every written row of the session in write order.
    ///
    /// A pending merge is not visible until flushed. A session with no rows
    /// yields an empty vector. A malformed last row is treated as torn and
    /// skipped; a malformed row before it is an error.
    pub async fn read_updates(&self, session_id: &SessionId) -> Result<Vec<StoredUpdate>> {
        let path = self.session_path(session_id)?;
        // Holding the session lock keeps a concurrent append from exposing a half-written row.
        let _guard = self.lock_existing(session_id).await;

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = contents.lines().filter(|line| !line.trim().is_empty()).collect();
        let mut rows = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            match serde_json::from_str::<StoredUpdate>(line) {
                Ok(row) => rows.push(row),
                Err(e) if index + 1 == lines.len() => {
                    tracing::warn!(session_id = %session_id, "Skipping torn last row in update log: {}", e);
                }
                Err(e) => return Err(CourierError::from(e)),
            }
        }
        Ok(rows)
    }

    /// True iff at least one row has been written for the session.
    pub async fn exists(&self, session_id: &SessionId) -> Result<bool> {
        let path = self.session_path(session_id)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Flushes every session and releases all handles.
    ///
    /// Every session is attempted even if one fails; the first error is
    /// returned. Subsequent appends fail.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let slots: Vec<(SessionId, SessionSlot)> = self.sessions.lock().await.drain().collect();
        let mut first_error = None;
        for (session_id, slot) in slots {
            let mut log = slot.lock_owned().await;
            if let Err(e) = self.flush_locked(&mut log, &session_id).await {
                tracing::error!(session_id = %session_id, "Failed to flush update log on close: {}", e);
                first_error.get_or_insert(e);
            }
            log.retired = true;
            log.file = None;
        }

        tracing::debug!("Update storage closed");
        first_error.map_or(Ok(()), Err)
    }

    /// Number of sessions with in-memory state.
    pub async fn open_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    // ------------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CourierError::internal("update storage is closed"));
        }
        Ok(())
    }

    async fn lock_or_create(&self, session_id: &SessionId) -> Result<OwnedMutexGuard<SessionLog>> {
        self.session_path(session_id)?;
        loop {
            self.ensure_open()?;
            let slot = {
                let mut sessions = self.sessions.lock().await;
                sessions.entry(session_id.clone()).or_default().clone()
            };
            let log = slot.lock_owned().await;
            if !log.retired {
                return Ok(log);
            }
        }
    }

    async fn lock_existing(&self, session_id: &SessionId) -> Option<(SessionSlot, OwnedMutexGuard<SessionLog>)> {
        loop {
            let slot = self.sessions.lock().await.get(session_id).cloned()?;
            let log = slot.clone().lock_owned().await;
            if !log.retired {
                return Some((slot, log));
            }
        }
    }

    async fn flush_locked(&self, log: &mut SessionLog, session_id: &SessionId) -> Result<()> {
        if let Some(row) = log.buffer.take() {
            self.write_row(log, session_id, row).await?;
        }
        Ok(())
    }

    async fn retire(&self, session_id: &SessionId, slot: &SessionSlot, log: &mut SessionLog) {
        log.retired = true;
        log.file = None;
        let mut sessions = self.sessions.lock().await;
        if sessions.get(session_id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            sessions.remove(session_id);
        }
    }

    async fn write_row(&self, log: &mut SessionLog, session_id: &SessionId, update: SessionUpdate) -> Result<()> {
        let row = StoredUpdate {
            session_id: session_id.clone(),
            update,
        };
        let mut line = serde_json::to_vec(&row)?;
        line.push(b'\n');

        if log.file.is_none() {
            log.file = Some(self.open_log(session_id).await?);
        }
        let Some(file) = log.file.as_mut() else {
            return Err(CourierError::internal("update log handle missing"));
        };
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn open_log(&self, session_id: &SessionId) -> Result<File> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = self.session_path(session_id)?;
        truncate_torn_tail(&path).await?;
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        tracing::debug!(session_id = %session_id, "Opened update log at {}", path.display());
        Ok(file)
    }

    fn session_path(&self, session_id: &SessionId) -> Result<PathBuf> {
        let id = session_id.as_str();
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(CourierError::invalid_params(format!("invalid session id: {id:?}")));
        }
        Ok(self.base_dir.join(format!("{id}.jsonl")))
    }
}

/// Cuts a partial last row left by an interrupted write.
async fn truncate_torn_tail(path: &Path) -> Result<()> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if contents.is_empty() || contents.ends_with(b"\n") {
        return Ok(());
    }

    let keep = contents.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(keep as u64).await?;
    file.sync_all().await?;
    tracing::warn!(
        "Truncated {} byte(s) of torn row from {}",
        contents.len() - keep,
        path.display()
    );
    Ok(())
}
