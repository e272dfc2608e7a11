//! Model lifecycle manager — downloads, selection, persistence, events.
//!
//! One manager per process, handed around as a cheap clone of an `Arc`
//! handle. All mutable state lives behind a single lock so a snapshot is
//! never torn; the lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use localmind_core::{
    AutoSwitchPolicy, DeviceCapabilities, Error, ModelSelection, ModelSettings, Result,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{self, DEFAULT_MODEL_ID};
use crate::persistence::{load_persisted, DebouncedWriter, StateStore, STATE_KEY};
use crate::progress::{ProgressPoll, ProgressSource, ProgressSourceFactory};
use crate::scorer::{CompatibilityScore, CompatibilityScorer};
use crate::state::LifecycleState;
use crate::types::{DownloadStart, LifecycleEvent, ModelInfo, ModelStatus};

const EVENT_CAPACITY: usize = 256;

/// Tunables for [`ModelLifecycleManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub auto_switch: AutoSwitchPolicy,
    /// How often each download's progress source is polled.
    pub progress_tick: Duration,
    pub persist_debounce: Duration,
    pub state_key: String,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from_settings(&ModelSettings::default())
    }
}

impl ManagerOptions {
    pub fn from_settings(settings: &ModelSettings) -> Self {
        Self {
            auto_switch: settings.auto_switch,
            progress_tick: Duration::from_millis(settings.progress_tick_ms),
            persist_debounce: Duration::from_millis(settings.persist_debounce_ms),
            state_key: STATE_KEY.to_string(),
        }
    }
}

/// Handle to the process-wide lifecycle manager.
#[derive(Clone)]
pub struct ModelLifecycleManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    shared: Mutex<Shared>,
    capabilities: RwLock<DeviceCapabilities>,
    sources: Arc<dyn ProgressSourceFactory>,
    writer: DebouncedWriter,
    events: broadcast::Sender<LifecycleEvent>,
    options: ManagerOptions,
    next_generation: AtomicU64,
}

struct Shared {
    state: LifecycleState,
    active: HashMap<String, ActiveDownload>,
}

/// Driver bookkeeping. The generation tells a stale driver it was replaced.
struct ActiveDownload {
    generation: u64,
    cancel: CancellationToken,
}

impl ModelLifecycleManager {
    /// Build a manager, restoring whatever the store holds.
    ///
    /// Corrupt or inconsistent persisted data falls back to the default state.
    pub fn new(
        capabilities: DeviceCapabilities,
        store: Arc<dyn StateStore>,
        sources: Arc<dyn ProgressSourceFactory>,
        options: ManagerOptions,
    ) -> Self {
        let state = match load_persisted(store.as_ref(), &options.state_key) {
            Some(persisted) => LifecycleState::restore(&persisted),
            None => LifecycleState::initial(),
        };

        info!(
            "ModelLifecycleManager initialized: current={}, installed={:?}",
            state.current_model_id, state.installed_model_ids
        );

        let writer = DebouncedWriter::new(store, options.state_key.clone(), options.persist_debounce);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let manager = Self {
            inner: Arc::new(ManagerInner {
                shared: Mutex::new(Shared {
                    state,
                    active: HashMap::new(),
                }),
                capabilities: RwLock::new(capabilities),
                sources,
                writer,
                events,
                options,
                next_generation: AtomicU64::new(1),
            }),
        };
        {
            let mut shared = manager.inner.shared.lock();
            manager.inner.ensure_runnable_current(&mut shared);
        }
        manager
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn snapshot(&self) -> LifecycleState {
        self.inner.shared.lock().state.clone()
    }

    /// Catalog with live status.
    pub fn models(&self) -> Vec<ModelInfo> {
        self.inner.shared.lock().state.models.clone()
    }

    pub fn current_model(&self) -> Option<ModelInfo> {
        let shared = self.inner.shared.lock();
        shared.state.model(&shared.state.current_model_id).cloned()
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.inner.capabilities.read().clone()
    }

    /// Replace the capability snapshot, e.g. after a re-probe.
    ///
    /// A current model the device can no longer run is replaced by the default.
    pub fn set_capabilities(&self, capabilities: DeviceCapabilities) {
        *self.inner.capabilities.write() = capabilities;
        let mut shared = self.inner.shared.lock();
        self.inner.ensure_runnable_current(&mut shared);
    }

    /// Score a model against the current capability snapshot.
    pub fn score(&self, model_id: &str) -> CompatibilityScore {
        CompatibilityScorer::score(model_id, &self.inner.capabilities.read())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    // ---------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------

    /// Make `model_id` the current model.
    ///
    /// Returns `Ok(false)` without changing anything unless the model is
    /// installed and runnable on this device.
    pub fn select_current(&self, model_id: &str) -> Result<bool> {
        if catalog::entry(model_id).is_none() {
            return Err(Error::ModelNotFound(model_id.to_string()));
        }
        let score = self.score(model_id);

        let mut shared = self.inner.shared.lock();
        if !shared.state.is_installed(model_id) {
            debug!("Ignoring selection of {}: not installed", model_id);
            return Ok(false);
        }
        if !score.can_run {
            debug!("Ignoring selection of {}: cannot run on this device", model_id);
            return Ok(false);
        }
        if shared.state.current_model_id == model_id {
            return Ok(true);
        }

        match shared.state.select_current(model_id) {
            Ok(next) => {
                shared.state = next;
                self.inner.persist(&shared);
                self.inner.publish(LifecycleEvent::CurrentModelChanged {
                    model_id: model_id.to_string(),
                });
                info!("Current model changed to {}", model_id);
                Ok(true)
            }
            Err(rejection) => {
                debug!("Selection of {} rejected: {:?}", model_id, rejection);
                Ok(false)
            }
        }
    }

    // ---------------------------------------------------------------
    // Downloads
    // ---------------------------------------------------------------

    /// Begin downloading `model_id`. Must be called inside a tokio runtime.
    pub fn start_download(&self, model_id: &str) -> Result<DownloadStart> {
        if catalog::entry(model_id).is_none() {
            return Err(Error::ModelNotFound(model_id.to_string()));
        }

        let mut shared = self.inner.shared.lock();
        match shared.state.model(model_id).map(|m| m.status) {
            Some(ModelStatus::Installed) => {
                warn!("Model {} is already installed", model_id);
                return Ok(DownloadStart::AlreadyInstalled);
            }
            Some(ModelStatus::Downloading) => {
                warn!("Model {} is already downloading", model_id);
                return Ok(DownloadStart::AlreadyDownloading);
            }
            _ => {}
        }

        let score = self.score(model_id);
        if !score.can_run {
            return Err(Error::Incompatible {
                model_id: model_id.to_string(),
                reason: score.warnings.join("; "),
            });
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("no async runtime for download: {}", e)))?;

        let next = shared.state.start_download(model_id).map_err(|rejection| {
            Error::Internal(format!("cannot start {}: {:?}", model_id, rejection))
        })?;
        shared.state = next;

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        shared.active.insert(
            model_id.to_string(),
            ActiveDownload {
                generation,
                cancel: cancel.clone(),
            },
        );

        let source = self.inner.sources.open(model_id);
        handle.spawn(drive(
            self.inner.clone(),
            model_id.to_string(),
            generation,
            cancel,
            source,
        ));

        self.inner.publish(LifecycleEvent::DownloadStarted {
            model_id: model_id.to_string(),
        });
        info!("Download started: {}", model_id);
        Ok(DownloadStart::Started)
    }

    /// Stop an in-flight download. Returns `Ok(false)` if nothing was downloading.
    pub fn cancel_download(&self, model_id: &str) -> Result<bool> {
        if catalog::entry(model_id).is_none() {
            return Err(Error::ModelNotFound(model_id.to_string()));
        }
        let mut shared = self.inner.shared.lock();
        Ok(self.inner.cancel_locked(&mut shared, model_id))
    }

    /// Acknowledge a failed download, returning the model to available.
    pub fn dismiss_error(&self, model_id: &str) -> Result<bool> {
        if catalog::entry(model_id).is_none() {
            return Err(Error::ModelNotFound(model_id.to_string()));
        }
        let mut shared = self.inner.shared.lock();
        match shared.state.dismiss_error(model_id) {
            Ok(next) => {
                shared.state = next;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Uninstall a model. The default model is never removed.
    pub fn remove_model(&self, model_id: &str) -> Result<bool> {
        if catalog::entry(model_id).is_none() {
            return Err(Error::ModelNotFound(model_id.to_string()));
        }

        let mut shared = self.inner.shared.lock();
        let previous_current = shared.state.current_model_id.clone();
        match shared.state.remove_model(model_id) {
            Ok(next) => {
                shared.state = next;
                self.inner.persist(&shared);
                self.inner.publish(LifecycleEvent::ModelRemoved {
                    model_id: model_id.to_string(),
                });
                if shared.state.current_model_id != previous_current {
                    self.inner.publish(LifecycleEvent::CurrentModelChanged {
                        model_id: shared.state.current_model_id.clone(),
                    });
                }
                info!("Model removed: {}", model_id);
                Ok(true)
            }
            Err(rejection) => {
                debug!("Removal of {} rejected: {:?}", model_id, rejection);
                Ok(false)
            }
        }
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    /// Write any pending state now.
    pub fn flush(&self) -> Result<()> {
        self.inner.writer.flush()
    }

    /// Cancel every download and flush pending state.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut shared = self.inner.shared.lock();
            let downloading = shared.state.downloading_model_ids.clone();
            for model_id in downloading {
                self.inner.cancel_locked(&mut shared, &model_id);
            }
        }
        self.flush()?;
        info!("ModelLifecycleManager shut down");
        Ok(())
    }

    /// Delete the persisted record and reset to the built-in default state.
    pub fn clear_persisted(&self) -> Result<()> {
        let mut shared = self.inner.shared.lock();
        let downloading = shared.state.downloading_model_ids.clone();
        for model_id in downloading {
            self.inner.cancel_locked(&mut shared, &model_id);
        }

        self.inner.writer.clear()?;

        let previous_current = shared.state.current_model_id.clone();
        shared.state = LifecycleState::initial();
        if shared.state.current_model_id != previous_current {
            self.inner.publish(LifecycleEvent::CurrentModelChanged {
                model_id: shared.state.current_model_id.clone(),
            });
        }
        info!("Persisted model state cleared");
        Ok(())
    }
}

impl ModelSelection for ModelLifecycleManager {
    fn current_model_id(&self) -> String {
        self.inner.shared.lock().state.current_model_id.clone()
    }
}

impl ManagerInner {
    fn publish(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Queue a write. Called with the lock held so writes land in order.
    fn persist(&self, shared: &Shared) {
        self.writer.schedule(&shared.state.persisted());
    }

    /// Fall back to the default when the current model cannot run here.
    fn ensure_runnable_current(&self, shared: &mut Shared) -> bool {
        let current = shared.state.current_model_id.clone();
        if current == DEFAULT_MODEL_ID {
            return false;
        }
        if CompatibilityScorer::score(&current, &self.capabilities.read()).can_run {
            return false;
        }

        match shared.state.select_current(DEFAULT_MODEL_ID) {
            Ok(next) => {
                shared.state = next;
                self.persist(shared);
                self.publish(LifecycleEvent::CurrentModelChanged {
                    model_id: DEFAULT_MODEL_ID.to_string(),
                });
                warn!(
                    "Model {} cannot run on this device, switched to {}",
                    current, DEFAULT_MODEL_ID
                );
                true
            }
            Err(rejection) => {
                warn!("Cannot fall back from {}: {:?}", current, rejection);
                false
            }
        }
    }

    fn cancel_locked(&self, shared: &mut Shared, model_id: &str) -> bool {
        if let Some(active) = shared.active.remove(model_id) {
            active.cancel.cancel();
        }
        match shared.state.cancel_download(model_id) {
            Ok(next) => {
                shared.state = next;
                self.publish(LifecycleEvent::DownloadCancelled {
                    model_id: model_id.to_string(),
                });
                info!("Download cancelled: {}", model_id);
                true
            }
            Err(_) => false,
        }
    }

    /// Apply one poll result. Returns whether the driver should keep polling.
    fn apply_poll(&self, model_id: &str, generation: u64, poll: ProgressPoll) -> bool {
        let mut shared = self.shared.lock();
        match shared.active.get(model_id) {
            Some(active) if active.generation == generation => {}
            _ => return false,
        }

        let before = shared
            .state
            .model(model_id)
            .and_then(|m| m.download_progress)
            .unwrap_or(0.0);

        match poll {
            ProgressPoll::Progress(progress) => match shared.state.report_progress(model_id, progress) {
                Ok((next, applied)) => {
                    shared.state = next;
                    if applied > before {
                        debug!("{} progress {:.0}%", model_id, applied);
                        self.publish(LifecycleEvent::DownloadProgress {
                            model_id: model_id.to_string(),
                            progress: applied,
                        });
                    }
                    true
                }
                Err(_) => {
                    shared.active.remove(model_id);
                    false
                }
            },
            ProgressPoll::Done => {
                shared.active.remove(model_id);
                let previous_current = shared.state.current_model_id.clone();
                let next = match shared.state.finish_download(model_id, self.options.auto_switch) {
                    Ok(next) => next,
                    Err(_) => return false,
                };
                if before < 100.0 {
                    self.publish(LifecycleEvent::DownloadProgress {
                        model_id: model_id.to_string(),
                        progress: 100.0,
                    });
                }
                shared.state = next;
                self.persist(&shared);
                self.publish(LifecycleEvent::DownloadFinished {
                    model_id: model_id.to_string(),
                });
                info!("Download finished: {}", model_id);

                if shared.state.current_model_id != previous_current {
                    info!("Switched current model to {}", shared.state.current_model_id);
                    self.publish(LifecycleEvent::CurrentModelChanged {
                        model_id: shared.state.current_model_id.clone(),
                    });
                }
                false
            }
            ProgressPoll::Failed(error) => {
                shared.active.remove(model_id);
                if let Ok(next) = shared.state.fail_download(model_id, &error) {
                    shared.state = next;
                    warn!("Download of {} failed: {}", model_id, error);
                    self.publish(LifecycleEvent::DownloadFailed {
                        model_id: model_id.to_string(),
                        error,
                    });
                }
                false
            }
        }
    }
}

/// Poll a download's progress source once per tick until it ends or is cancelled.
async fn drive(
    inner: Arc<ManagerInner>,
    model_id: String,
    generation: u64,
    cancel: CancellationToken,
    mut source: Box<dyn ProgressSource>,
) {
    let mut ticker = tokio::time::interval(inner.options.progress_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Driver for {} cancelled", model_id);
                return;
            }
            _ = ticker.tick() => {}
        }

        let poll = source.poll();
        if !inner.apply_poll(&model_id, generation, poll) {
            return;
        }
    }
}
