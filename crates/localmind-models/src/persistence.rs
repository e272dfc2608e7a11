//! Persisted model selection and debounced writes.
//!
//! Only the current model id and the installed set survive a restart. They
//! live in one JSON record under [`STATE_KEY`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use localmind_core::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Storage key of the persisted lifecycle record. Bump the suffix on format changes.
pub const STATE_KEY: &str = "localmind.model-state.v1";

/// The durable subset of the lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedModelState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_model_id: Option<String>,
    #[serde(default)]
    pub installed_model_ids: Vec<String>,
}

impl PersistedModelState {
    /// Parse a stored record. Returns None for anything unreadable.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Discarding corrupt persisted model state: {}", e);
                None
            }
        }
    }
}

/// A key-value slot store for small JSON records.
pub trait StateStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
    fn clear(&self, key: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        // Write to a sibling file first so a crash never leaves half a record.
        let path = self.path_for(key);
        let part_path = path.with_extension("json.part");
        std::fs::write(&part_path, value)?;
        std::fs::rename(&part_path, &path)?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store. Counts writes so callers can observe write churn.
#[derive(Default)]
pub struct MemoryStateStore {
    slots: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a slot, e.g. with a record from a previous session.
    pub fn with_slot(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.slots.lock().insert(key.to_string(), value.to_string());
        store
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.slots.lock().get(key).cloned()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.slots.lock().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.slots.lock().remove(key);
        Ok(())
    }
}

/// Read the persisted record, treating any failure as "nothing stored".
pub fn load_persisted(store: &dyn StateStore, key: &str) -> Option<PersistedModelState> {
    match store.load(key) {
        Ok(Some(raw)) => PersistedModelState::parse(&raw),
        Ok(None) => None,
        Err(e) => {
            warn!("Could not read persisted model state: {}", e);
            None
        }
    }
}

/// Coalesces bursts of writes into one, `delay` after the last request.
///
/// `flush` writes the latest pending value synchronously; call it before
/// the process exits.
pub struct DebouncedWriter {
    inner: Arc<WriterInner>,
}

struct WriterInner {
    store: Arc<dyn StateStore>,
    key: String,
    delay: Duration,
    pending: Mutex<Pending>,
    /// Held from taking a value until it is saved, so an older value never lands last.
    write: Mutex<()>,
}

#[derive(Default)]
struct Pending {
    value: Option<String>,
    timer: Option<JoinHandle<()>>,
}

impl DebouncedWriter {
    pub fn new(store: Arc<dyn StateStore>, key: impl Into<String>, delay: Duration) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                store,
                key: key.into(),
                delay,
                pending: Mutex::new(Pending::default()),
                write: Mutex::new(()),
            }),
        }
    }

    /// Queue a write of `state`, replacing any queued value and restarting the delay.
    ///
    /// Without an async runtime the write happens immediately.
    pub fn schedule(&self, state: &PersistedModelState) {
        let value = match serde_json::to_string(state) {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not serialize model state: {}", e);
                return;
            }
        };

        let runtime = tokio::runtime::Handle::try_current();
        let mut pending = self.inner.pending.lock();
        pending.value = Some(value);
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        match runtime {
            Ok(handle) => {
                let inner = self.inner.clone();
                pending.timer = Some(handle.spawn(async move {
                    tokio::time::sleep(inner.delay).await;
                    inner.write_pending();
                }));
            }
            Err(_) => {
                drop(pending);
                self.inner.write_pending();
            }
        }
    }

    /// Write any pending value now.
    ///
    /// Waits for a write already under way, so the latest value lands last.
    pub fn flush(&self) -> Result<()> {
        if let Some(timer) = self.inner.pending.lock().timer.take() {
            timer.abort();
        }
        let _write = self.inner.write.lock();
        let value = self.inner.pending.lock().value.take();
        match value {
            Some(v) => self.inner.store.save(&self.inner.key, &v),
            None => Ok(()),
        }
    }

    /// Drop any pending value and delete the stored record.
    pub fn clear(&self) -> Result<()> {
        self.discard();
        let _write = self.inner.write.lock();
        self.inner.pending.lock().value = None;
        self.inner.store.clear(&self.inner.key)
    }

    /// Drop any pending value without writing it.
    pub fn discard(&self) {
        let mut pending = self.inner.pending.lock();
        pending.value = None;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }

    pub fn has_pending(&self) -> bool {
        self.inner.pending.lock().value.is_some()
    }
}

impl WriterInner {
    fn write_pending(&self) {
        let _write = self.write.lock();
        let value = {
            let mut pending = self.pending.lock();
            pending.timer = None;
            pending.value.take()
        };
        if let Some(value) = value {
            match self.store.save(&self.key, &value) {
                Ok(()) => debug!("Persisted {}", self.key),
                Err(e) => warn!("Failed to persist {}: {}", self.key, e),
            }
        }
    }
}
