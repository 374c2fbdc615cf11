//! Newline-delimited JSON-RPC 2.0 transport for the Agent Client Protocol.
//!
//! [`Server`] owns one client connection: it classifies inbound lines,
//! dispatches ACP methods to the session layer, streams `session/update`
//! notifications and correlates agent→client calls with their responses.

mod active;
mod pending;
mod server;
mod writer;

pub use active::{ActivePromptGuard, ActivePrompts};
pub use pending::{CallOutcome, PendingCalls, PendingGuard};
pub use server::{Server, ServerOptions};
pub use writer::OutboundWriter;
