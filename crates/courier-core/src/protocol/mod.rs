//! Wire protocol: JSON-RPC framing plus the Agent Client Protocol payloads.
//!
//! # Module Structure
//!
//! - `jsonrpc`: envelopes, error codes and structural classification
//! - `types`: initialize / session / prompt request and response types
//! - `update`: `session/update` payloads as a tagged enum
//! - `client`: agent→client request payloads

pub mod client;
pub mod jsonrpc;
pub mod types;
pub mod update;

pub use jsonrpc::{Envelope, RpcError};
pub use types::*;
pub use update::{SessionUpdate, UpdateKind, MERGEABLE_KINDS};

/// Inbound method names.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const AUTHENTICATE: &str = "authenticate";
    pub const SESSION_NEW: &str = "session/new";
    pub const SESSION_LOAD: &str = "session/load";
    pub const SESSION_PROMPT: &str = "session/prompt";
    pub const SESSION_SET_MODE: &str = "session/set_mode";
    pub const SESSION_CANCEL: &str = "session/cancel";
    pub const SESSION_UPDATE: &str = "session/update";
}
