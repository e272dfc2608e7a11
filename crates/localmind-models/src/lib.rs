//! LocalMind Models — catalog, compatibility scoring, download lifecycle.
//!
//! The [`ModelLifecycleManager`] owns the live state. Everything it builds on
//! (the state machine, scorer, persistence and progress sources) is usable on
//! its own.

pub mod catalog;
pub mod manager;
pub mod persistence;
pub mod progress;
pub mod scorer;
pub mod state;
pub mod types;

pub use catalog::{CatalogEntry, ModelRequirements, DEFAULT_MODEL_ID};
pub use manager::{ManagerOptions, ModelLifecycleManager};
pub use persistence::{
    DebouncedWriter, FileStateStore, MemoryStateStore, PersistedModelState, StateStore, STATE_KEY,
};
pub use progress::{
    ChannelTransfer, ChannelTransfers, ProgressPoll, ProgressSource, ProgressSourceFactory,
    SimulatedTransfer, SimulatedTransfers,
};
pub use scorer::{CompatibilityScore, CompatibilityScorer, Performance};
pub use state::{LifecycleState, Rejection};
pub use types::{DownloadStart, LifecycleEvent, ModelInfo, ModelStatus};
