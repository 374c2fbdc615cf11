//! Core types and contracts for the Courier agent.
//!
//! This crate has no I/O of its own. It defines the wire protocol, the
//! shared error type, configuration, and the traits the other crates
//! implement (`UpdateSender`, `ExecutionHandle`, `ConversationStore`,
//! `ClientCaller`).

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;

pub use error::{CourierError, Result};
