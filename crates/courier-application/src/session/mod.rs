//! Session lifecycle.
//!
//! - `model`: `Session`, the per-conversation prompt state machine
//! - `manager`: `SessionManager`, the session registry

mod manager;
mod model;

pub use manager::SessionManager;
pub use model::Session;
