//! Session-facing contracts.
//!
//! # Module Structure
//!
//! - `execution`: `UpdateSender`, `ExecutionHandle`, `ExecutionFactory`
//! - `message`: conversation record types
//! - `store`: `ConversationStore` trait

mod execution;
mod message;
mod store;

pub use execution::{ExecutionFactory, ExecutionHandle, PromptContext, UpdateSender};
pub use message::{ConversationMessage, ConversationRecord, MessageRole};
pub use store::ConversationStore;
