//! LocalMind Search — debounced, cancellable search dispatch.
//!
//! The [`SearchDispatcher`] turns keystrokes into at most one backend call
//! per pause, discards stale responses by token and serves deterministic
//! local results while the search service is unreachable.

pub mod backend;
pub mod dispatcher;
pub mod history;
pub mod mock;
pub mod types;

pub use backend::{HttpSearchBackend, SearchBackend, TransportError};
pub use dispatcher::{DispatcherOptions, SearchDispatcher};
pub use history::{normalize, SearchHistory};
pub use mock::MockSearchBackend;
pub use types::*;
