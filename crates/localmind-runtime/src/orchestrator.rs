//! Runtime — wires probe, lifecycle manager and search dispatcher.

use std::sync::Arc;
use std::time::Duration;

use localmind_core::{
    CapabilityProbe, DeviceCapabilities, LocalMindConfig, ModelSelection, Result, SystemProbe,
};
use localmind_models::{
    CompatibilityScorer, FileStateStore, ManagerOptions, ModelLifecycleManager,
    ProgressSourceFactory, SimulatedTransfers, StateStore,
};
use localmind_search::{DispatcherOptions, HttpSearchBackend, SearchBackend, SearchDispatcher};
use tracing::info;

use crate::types::*;

/// The single process-wide LocalMind instance.
pub struct Runtime {
    config: LocalMindConfig,
    probe: Box<dyn CapabilityProbe>,
    manager: ModelLifecycleManager,
    dispatcher: SearchDispatcher,
}

/// Overrides for the default collaborators. Anything left unset comes from config.
pub struct RuntimeBuilder {
    config: LocalMindConfig,
    probe: Option<Box<dyn CapabilityProbe>>,
    store: Option<Arc<dyn StateStore>>,
    sources: Option<Arc<dyn ProgressSourceFactory>>,
    backend: Option<Arc<dyn SearchBackend>>,
}

impl RuntimeBuilder {
    pub fn probe(mut self, probe: impl CapabilityProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn progress_sources(mut self, sources: Arc<dyn ProgressSourceFactory>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn search_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<Runtime> {
        let config = self.config;
        config.validate()?;
        let settings = &config.settings;

        let probe = self
            .probe
            .unwrap_or_else(|| Box::new(SystemProbe::from_env()));
        let capabilities = probe.detect();

        let store: Arc<dyn StateStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileStateStore::new(&config.data_paths.state_dir)?),
        };
        let sources: Arc<dyn ProgressSourceFactory> = match self.sources {
            Some(sources) => sources,
            None => Arc::new(SimulatedTransfers::new(settings.models.progress_step)),
        };
        let backend: Arc<dyn SearchBackend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpSearchBackend::new(
                &settings.search.backend_url,
                Duration::from_millis(settings.search.request_timeout_ms),
            )?),
        };

        let manager = ModelLifecycleManager::new(
            capabilities.clone(),
            store,
            sources,
            ManagerOptions::from_settings(&settings.models),
        );
        let selection: Arc<dyn ModelSelection> = Arc::new(manager.clone());
        let dispatcher = SearchDispatcher::new(
            backend,
            selection,
            DispatcherOptions::from_settings(&settings.search),
        )?;

        info!(
            "Runtime initialized: device={}, memory={:.1}GB, power={}, model={}",
            capabilities.device_class,
            capabilities.total_memory_gb,
            capabilities.processing_power,
            manager.current_model_id()
        );

        Ok(Runtime {
            config,
            probe,
            manager,
            dispatcher,
        })
    }
}

impl Runtime {
    /// Build with the native probe, file-backed state and the HTTP search backend.
    pub fn new(config: LocalMindConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: LocalMindConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            probe: None,
            store: None,
            sources: None,
            backend: None,
        }
    }

    pub fn config(&self) -> &LocalMindConfig {
        &self.config
    }

    pub fn manager(&self) -> &ModelLifecycleManager {
        &self.manager
    }

    pub fn dispatcher(&self) -> &SearchDispatcher {
        &self.dispatcher
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.manager.capabilities()
    }

    /// Probe again and hand the new snapshot to the manager.
    pub fn refresh_capabilities(&self) -> DeviceCapabilities {
        let capabilities = self.probe.detect();
        self.manager.set_capabilities(capabilities.clone());
        capabilities
    }

    /// Everything a host needs for a status screen.
    pub fn status(&self) -> RuntimeStatus {
        let capabilities = self.manager.capabilities();
        let state = self.manager.snapshot();
        let scores = CompatibilityScorer::score_all(&capabilities);

        let models = state
            .models
            .iter()
            .zip(scores)
            .map(|(info, (_, score))| ModelOverview {
                id: info.id.clone(),
                display_name: info.display_name.clone(),
                size: info.size.clone(),
                status: info.status,
                download_progress: info.download_progress,
                can_run: score.can_run,
                performance: score.performance,
                warnings: score.warnings,
                current: info.id == state.current_model_id,
            })
            .collect();

        RuntimeStatus {
            recommended_model_ids: CompatibilityScorer::recommend(&capabilities),
            capabilities,
            current_model_id: state.current_model_id.clone(),
            installed_model_ids: state.installed_model_ids.clone(),
            downloading_model_ids: state.downloading_model_ids.clone(),
            models,
            backend_connected: self.dispatcher.is_backend_connected(),
            history_len: self.dispatcher.history().len(),
        }
    }

    /// Stop searches and downloads and write pending state.
    pub fn shutdown(&self) -> Result<()> {
        self.dispatcher.cancel();
        self.manager.shutdown()?;
        info!("Runtime shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localmind_core::{CapabilitySignals, StaticProbe};
    use localmind_models::MemoryStateStore;
    use localmind_search::MockSearchBackend;

    fn config(dir: &std::path::Path) -> LocalMindConfig {
        LocalMindConfig {
            data_paths: localmind_core::DataPaths::new(dir).unwrap(),
            settings: Default::default(),
        }
    }

    fn desktop() -> StaticProbe {
        StaticProbe::new(CapabilitySignals {
            device_memory_gb: Some(16.0),
            hardware_concurrency: Some(8),
            effective_network_type: Some("4g".into()),
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: None,
        })
    }

    #[test]
    fn test_status_lists_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::builder(config(dir.path()))
            .probe(desktop())
            .state_store(Arc::new(MemoryStateStore::new()))
            .search_backend(Arc::new(MockSearchBackend::new()))
            .build()
            .unwrap();

        let status = runtime.status();
        assert_eq!(status.current_model_id, "minilm-l6");
        assert_eq!(status.models.len(), localmind_models::catalog::entries().len());
        assert!(status.models.iter().filter(|m| m.current).count() == 1);
        assert_eq!(status.recommended_model_ids[0], "minilm-l6");
        assert!(status.backend_connected);

        let json = serde_json::to_value(&status).unwrap();
        assert!(json["capabilities"]["totalMemoryGB"].is_number());
        assert!(json["models"][0]["canRun"].is_boolean());
    }

    #[test]
    fn test_default_collaborators() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::builder(config(dir.path()))
            .probe(desktop())
            .build()
            .unwrap();
        assert_eq!(runtime.capabilities().total_memory_gb, 16.0);
        runtime.shutdown().unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.settings.search.history_limit = 0;
        assert!(matches!(
            Runtime::builder(cfg).probe(desktop()).build(),
            Err(localmind_core::Error::Config(_))
        ));
    }
}
