//! Built-in execution engine.
//!
//! The echo engine stands in for a model backend: it exercises every part of
//! the update contract (plan, thought, tool calls, streamed message chunks)
//! and honours cancellation at each step, which makes the agent usable end to
//! end without a provider.

mod echo;

pub use echo::{EchoExecution, EchoExecutionFactory};
