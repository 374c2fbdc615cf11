//! Update storage and its merge engine.
//!
//! - `merge`: pure per-session coalescing of streaming text chunks
//! - `storage`: JSON Lines persistence with per-session locking

mod merge;
mod storage;

pub use merge::{MergeBuffer, PendingMerge};
pub use storage::{StoredUpdate, UpdateStorage};
