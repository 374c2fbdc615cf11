//! Application layer: sessions and slash commands.

pub mod commands;
pub mod session;

pub use commands::CommandCatalog;
pub use session::{Session, SessionManager};
