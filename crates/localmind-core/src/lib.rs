//! LocalMind Core — device capabilities, configuration, shared error type.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod selection;

pub use capabilities::{
    CapabilityProbe, CapabilitySignals, DeviceCapabilities, DeviceClass, ModelSize, NetworkClass,
    ProcessingPower, StaticProbe, SystemProbe,
};
pub use config::{AutoSwitchPolicy, DataPaths, LocalMindConfig, ModelSettings, SearchSettings, Settings};
pub use error::{Error, Result};
pub use selection::{FixedModel, ModelSelection};
