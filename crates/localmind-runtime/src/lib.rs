//! Runtime — builds the process-wide lifecycle manager and search dispatcher.
//!
//! Hosts create one [`Runtime`] at startup and hand out its handles; nothing
//! in LocalMind relies on global state.

pub mod orchestrator;
pub mod types;

pub use orchestrator::{Runtime, RuntimeBuilder};
pub use types::*;
