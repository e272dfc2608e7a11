//! Configuration and data directory management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Paths to all LocalMind data locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Persisted state slots (`data/state/`).
    pub state_dir: PathBuf,
    /// User settings (`data/settings.json`).
    pub settings_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            state_dir: root.join("state"),
            settings_file: root.join("settings.json"),
            root,
        };
        std::fs::create_dir_all(&paths.state_dir)?;
        Ok(paths)
    }
}

/// When a freshly installed model becomes the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoSwitchPolicy {
    /// Never change the selection on install.
    Never,
    /// Switch only while the lightweight default is still selected.
    WhenCurrentIsDefault,
    /// Always switch to the model that just finished installing.
    Always,
}

impl Default for AutoSwitchPolicy {
    fn default() -> Self {
        Self::WhenCurrentIsDefault
    }
}

/// Search dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_debounce_ms() -> u64 {
    300
}
fn default_history_limit() -> usize {
    50
}
fn default_backend_url() -> String {
    "http://localhost:3003".into()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            history_limit: default_history_limit(),
            backend_url: default_backend_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Model lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub auto_switch: AutoSwitchPolicy,
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    /// Interval between progress polls of an active download.
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,
    /// Percent advanced per tick by the simulated transfer.
    #[serde(default = "default_progress_step")]
    pub progress_step: f32,
}

fn default_persist_debounce_ms() -> u64 {
    500
}
fn default_progress_tick_ms() -> u64 {
    250
}
fn default_progress_step() -> f32 {
    10.0
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            auto_switch: AutoSwitchPolicy::default(),
            persist_debounce_ms: default_persist_debounce_ms(),
            progress_tick_ms: default_progress_tick_ms(),
            progress_step: default_progress_step(),
        }
    }
}

/// User-tunable settings (persisted to settings.json).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub models: ModelSettings,
}

impl Settings {
    /// Load settings from a JSON file. Missing or unreadable files yield defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings {}: {}", path.display(), e);
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }

    /// Reject settings the runtime cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if self.search.debounce_ms == 0 {
            return Err(Error::Config("search.debounce_ms must be > 0".into()));
        }
        if self.search.history_limit == 0 {
            return Err(Error::Config("search.history_limit must be > 0".into()));
        }
        if self.search.backend_url.trim().is_empty() {
            return Err(Error::Config("search.backend_url must not be empty".into()));
        }
        if self.models.progress_tick_ms == 0 {
            return Err(Error::Config("models.progress_tick_ms must be > 0".into()));
        }
        if self.models.persist_debounce_ms == 0 {
            return Err(Error::Config("models.persist_debounce_ms must be > 0".into()));
        }
        if !(self.models.progress_step.is_finite() && self.models.progress_step > 0.0) {
            return Err(Error::Config("models.progress_step must be a positive number".into()));
        }
        Ok(())
    }
}

/// Top-level LocalMind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalMindConfig {
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub settings: Settings,
}

impl LocalMindConfig {
    /// Create configuration from settings.json, environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_paths = DataPaths::new(data_dir)?;
        let mut settings = Settings::load(&data_paths.settings_file);

        if let Ok(url) = std::env::var("LOCALMIND_BACKEND_URL") {
            settings.search.backend_url = url;
        }
        if let Some(ms) = std::env::var("LOCALMIND_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            settings.search.debounce_ms = ms;
        }

        let config = Self {
            data_paths,
            settings,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.validate()
    }
}
