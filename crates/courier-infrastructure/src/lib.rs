//! File-backed infrastructure for the Courier agent.

pub mod config_service;
pub mod conversation_store;
pub mod paths;
pub mod update_storage;

pub use config_service::ConfigService;
pub use conversation_store::FileConversationStore;
pub use paths::{CourierPaths, PathError};
pub use update_storage::{StoredUpdate, UpdateStorage};
