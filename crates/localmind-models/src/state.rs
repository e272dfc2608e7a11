//! Lifecycle state machine.
//!
//! `LifecycleState` is an immutable snapshot. Each event has a named
//! transition that returns the next snapshot or a [`Rejection`]; nothing
//! mutates in place. Invariants held by every reachable snapshot:
//!
//! - the default model is installed;
//! - `current_model_id` is installed;
//! - a model is in at most one of installed / downloading;
//! - download progress never decreases while downloading.

use localmind_core::AutoSwitchPolicy;
use serde::Serialize;
use tracing::warn;

use crate::catalog::{self, DEFAULT_MODEL_ID};
use crate::persistence::PersistedModelState;
use crate::types::{ModelInfo, ModelStatus};

/// Why a transition did not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownModel,
    AlreadyInstalled,
    AlreadyDownloading,
    NotDownloading,
    NotInstalled,
    NotFailed,
    DefaultModel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleState {
    pub installed_model_ids: Vec<String>,
    pub current_model_id: String,
    pub downloading_model_ids: Vec<String>,
    pub models: Vec<ModelInfo>,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::initial()
    }
}

impl LifecycleState {
    /// Fresh state: full catalog, only the default model installed and selected.
    pub fn initial() -> Self {
        let models = catalog::entries()
            .iter()
            .map(|entry| {
                let mut info = ModelInfo::from_entry(entry);
                if entry.id == DEFAULT_MODEL_ID {
                    info.status = ModelStatus::Installed;
                    info.download_progress = Some(100.0);
                }
                info
            })
            .collect();

        Self {
            installed_model_ids: vec![DEFAULT_MODEL_ID.to_string()],
            current_model_id: DEFAULT_MODEL_ID.to_string(),
            downloading_model_ids: Vec::new(),
            models,
        }
    }

    /// Rebuild from a persisted record, dropping anything that does not fit.
    pub fn restore(persisted: &PersistedModelState) -> Self {
        let mut state = Self::initial();

        for id in &persisted.installed_model_ids {
            if state.is_installed(id) {
                continue;
            }
            if catalog::entry(id).is_none() {
                warn!("Ignoring unknown persisted model {}", id);
                continue;
            }
            state.installed_model_ids.push(id.clone());
            state.set_status(id, ModelStatus::Installed, Some(100.0), None);
        }

        match persisted.current_model_id.as_deref() {
            Some(current) if state.is_installed(current) => {
                state.current_model_id = current.to_string();
            }
            Some(current) => {
                warn!("Persisted current model {} is not installed, using default", current);
            }
            None => {}
        }

        state
    }

    /// The durable subset.
    pub fn persisted(&self) -> PersistedModelState {
        PersistedModelState {
            current_model_id: Some(self.current_model_id.clone()),
            installed_model_ids: self.installed_model_ids.clone(),
        }
    }

    pub fn model(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == model_id)
    }

    pub fn is_installed(&self, model_id: &str) -> bool {
        self.installed_model_ids.iter().any(|id| id == model_id)
    }

    pub fn is_downloading(&self, model_id: &str) -> bool {
        self.downloading_model_ids.iter().any(|id| id == model_id)
    }

    /// Check every invariant listed in the module docs.
    pub fn is_consistent(&self) -> bool {
        let default_installed = self.is_installed(DEFAULT_MODEL_ID);
        let current_installed = self.is_installed(&self.current_model_id);
        let disjoint = !self.downloading_model_ids.iter().any(|id| self.is_installed(id));
        let statuses_match = self.models.iter().all(|m| match m.status {
            ModelStatus::Installed => self.is_installed(&m.id) && !self.is_downloading(&m.id),
            ModelStatus::Downloading => self.is_downloading(&m.id) && !self.is_installed(&m.id),
            ModelStatus::Available | ModelStatus::Error => {
                !self.is_installed(&m.id) && !self.is_downloading(&m.id)
            }
        });
        default_installed && current_installed && disjoint && statuses_match
    }

    // ---------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------

    /// available | error → downloading, progress 0.
    pub fn start_download(&self, model_id: &str) -> Result<Self, Rejection> {
        let info = self.model(model_id).ok_or(Rejection::UnknownModel)?;
        match info.status {
            ModelStatus::Installed => return Err(Rejection::AlreadyInstalled),
            ModelStatus::Downloading => return Err(Rejection::AlreadyDownloading),
            ModelStatus::Available => {}
            ModelStatus::Error => return self.dismiss_error(model_id)?.start_download(model_id),
        }

        let mut next = self.clone();
        next.downloading_model_ids.push(model_id.to_string());
        next.set_status(model_id, ModelStatus::Downloading, Some(0.0), None);
        Ok(next)
    }

    /// Record progress. Values are clamped to [0, 100] and never go backwards.
    ///
    /// Returns the next state and the progress actually recorded.
    pub fn report_progress(&self, model_id: &str, progress: f32) -> Result<(Self, f32), Rejection> {
        let info = self.model(model_id).ok_or(Rejection::UnknownModel)?;
        if info.status != ModelStatus::Downloading {
            return Err(Rejection::NotDownloading);
        }

        let previous = info.download_progress.unwrap_or(0.0);
        let reported = if progress.is_finite() {
            progress.clamp(0.0, 100.0)
        } else {
            previous
        };
        let applied = reported.max(previous);

        let mut next = self.clone();
        next.set_status(model_id, ModelStatus::Downloading, Some(applied), None);
        Ok((next, applied))
    }

    /// downloading → installed, optionally switching the current model.
    pub fn finish_download(&self, model_id: &str, policy: AutoSwitchPolicy) -> Result<Self, Rejection> {
        if !self.is_downloading(model_id) {
            return Err(Rejection::NotDownloading);
        }

        let mut next = self.clone();
        next.downloading_model_ids.retain(|id| id != model_id);
        next.installed_model_ids.push(model_id.to_string());
        next.set_status(model_id, ModelStatus::Installed, Some(100.0), None);

        let switch = match policy {
            AutoSwitchPolicy::Never => false,
            AutoSwitchPolicy::WhenCurrentIsDefault => self.current_model_id == DEFAULT_MODEL_ID,
            AutoSwitchPolicy::Always => true,
        };
        if switch {
            next.current_model_id = model_id.to_string();
        }
        Ok(next)
    }

    /// downloading → error. Nothing is installed.
    pub fn fail_download(&self, model_id: &str, error: &str) -> Result<Self, Rejection> {
        if !self.is_downloading(model_id) {
            return Err(Rejection::NotDownloading);
        }

        let mut next = self.clone();
        next.downloading_model_ids.retain(|id| id != model_id);
        next.set_status(model_id, ModelStatus::Error, None, Some(error.to_string()));
        Ok(next)
    }

    /// downloading → available, progress cleared.
    pub fn cancel_download(&self, model_id: &str) -> Result<Self, Rejection> {
        if !self.is_downloading(model_id) {
            return Err(Rejection::NotDownloading);
        }

        let mut next = self.clone();
        next.downloading_model_ids.retain(|id| id != model_id);
        next.set_status(model_id, ModelStatus::Available, None, None);
        Ok(next)
    }

    /// error → available.
    pub fn dismiss_error(&self, model_id: &str) -> Result<Self, Rejection> {
        let info = self.model(model_id).ok_or(Rejection::UnknownModel)?;
        if info.status != ModelStatus::Error {
            return Err(Rejection::NotFailed);
        }

        let mut next = self.clone();
        next.set_status(model_id, ModelStatus::Available, None, None);
        Ok(next)
    }

    /// Change the selection to an installed model.
    pub fn select_current(&self, model_id: &str) -> Result<Self, Rejection> {
        if self.model(model_id).is_none() {
            return Err(Rejection::UnknownModel);
        }
        if !self.is_installed(model_id) {
            return Err(Rejection::NotInstalled);
        }

        let mut next = self.clone();
        next.current_model_id = model_id.to_string();
        Ok(next)
    }

    /// installed → available. The default model cannot be removed.
    ///
    /// Removing the current model selects the default.
    pub fn remove_model(&self, model_id: &str) -> Result<Self, Rejection> {
        if self.model(model_id).is_none() {
            return Err(Rejection::UnknownModel);
        }
        if model_id == DEFAULT_MODEL_ID {
            return Err(Rejection::DefaultModel);
        }
        if !self.is_installed(model_id) {
            return Err(Rejection::NotInstalled);
        }

        let mut next = self.clone();
        next.installed_model_ids.retain(|id| id != model_id);
        next.set_status(model_id, ModelStatus::Available, None, None);
        if next.current_model_id == model_id {
            next.current_model_id = DEFAULT_MODEL_ID.to_string();
        }
        Ok(next)
    }

    fn set_status(
        &mut self,
        model_id: &str,
        status: ModelStatus,
        progress: Option<f32>,
        warning: Option<String>,
    ) {
        if let Some(info) = self.models.iter_mut().find(|m| m.id == model_id) {
            info.status = status;
            info.download_progress = progress;
            info.warning = warning;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(current: Option<&str>, installed: &[&str]) -> PersistedModelState {
        PersistedModelState {
            current_model_id: current.map(String::from),
            installed_model_ids: installed.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn installed(state: &LifecycleState, id: &str) -> LifecycleState {
        let state = state.start_download(id).unwrap();
        state.finish_download(id, AutoSwitchPolicy::Never).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let state = LifecycleState::initial();
        assert_eq!(state.installed_model_ids, vec![DEFAULT_MODEL_ID]);
        assert_eq!(state.current_model_id, DEFAULT_MODEL_ID);
        assert!(state.downloading_model_ids.is_empty());
        assert_eq!(state.models.len(), catalog::entries().len());
        assert!(state.is_consistent());
    }

    #[test]
    fn test_restore_sanitizes() {
        let state = LifecycleState::restore(&persisted(
            Some("mistral-7b"),
            &["bge-base", "not-a-model", "bge-base"],
        ));
        assert_eq!(state.installed_model_ids, vec!["minilm-l6", "bge-base"]);
        // mistral-7b was never installed
        assert_eq!(state.current_model_id, DEFAULT_MODEL_ID);
        assert!(state.is_consistent());

        let state = LifecycleState::restore(&persisted(Some("bge-base"), &["bge-base"]));
        assert_eq!(state.current_model_id, "bge-base");
        assert_eq!(state.model("bge-base").unwrap().status, ModelStatus::Installed);
    }

    #[test]
    fn test_restore_round_trip() {
        let state = installed(&LifecycleState::initial(), "phi-3-mini")
            .select_current("phi-3-mini")
            .unwrap();
        assert_eq!(LifecycleState::restore(&state.persisted()), state);
    }

    #[test]
    fn test_download_happy_path() {
        let s0 = LifecycleState::initial();
        let s1 = s0.start_download("bge-base").unwrap();
        assert_eq!(s1.model("bge-base").unwrap().status, ModelStatus::Downloading);
        assert_eq!(s1.model("bge-base").unwrap().download_progress, Some(0.0));
        assert!(s1.is_consistent());
        // The original snapshot is untouched.
        assert_eq!(s0.model("bge-base").unwrap().status, ModelStatus::Available);

        let (s2, applied) = s1.report_progress("bge-base", 55.0).unwrap();
        assert_eq!(applied, 55.0);

        let s3 = s2
            .finish_download("bge-base", AutoSwitchPolicy::WhenCurrentIsDefault)
            .unwrap();
        assert!(s3.is_installed("bge-base"));
        assert!(!s3.is_downloading("bge-base"));
        assert_eq!(s3.model("bge-base").unwrap().download_progress, Some(100.0));
        assert_eq!(s3.current_model_id, "bge-base");
        assert!(s3.is_consistent());
    }

    #[test]
    fn test_progress_is_monotone_and_clamped() {
        let s = LifecycleState::initial().start_download("bge-base").unwrap();
        let (s, a) = s.report_progress("bge-base", 40.0).unwrap();
        let (s, b) = s.report_progress("bge-base", 20.0).unwrap();
        let (s, c) = s.report_progress("bge-base", 250.0).unwrap();
        let (_, d) = s.report_progress("bge-base", f32::NAN).unwrap();
        assert_eq!((a, b, c, d), (40.0, 40.0, 100.0, 100.0));
    }

    #[test]
    fn test_idempotent_start() {
        let s = LifecycleState::initial().start_download("bge-base").unwrap();
        assert_eq!(s.start_download("bge-base"), Err(Rejection::AlreadyDownloading));
        assert_eq!(
            LifecycleState::initial().start_download(DEFAULT_MODEL_ID),
            Err(Rejection::AlreadyInstalled)
        );
        assert_eq!(
            LifecycleState::initial().start_download("gpt-17"),
            Err(Rejection::UnknownModel)
        );
    }

    #[test]
    fn test_auto_switch_policies() {
        let s = LifecycleState::initial().start_download("bge-base").unwrap();
        let never = s.finish_download("bge-base", AutoSwitchPolicy::Never).unwrap();
        assert_eq!(never.current_model_id, DEFAULT_MODEL_ID);

        // With bge-base already selected, a second install only switches under Always.
        let base = installed(&LifecycleState::initial(), "bge-base")
            .select_current("bge-base")
            .unwrap()
            .start_download("phi-3-mini")
            .unwrap();
        let when_default = base
            .finish_download("phi-3-mini", AutoSwitchPolicy::WhenCurrentIsDefault)
            .unwrap();
        assert_eq!(when_default.current_model_id, "bge-base");
        let always = base.finish_download("phi-3-mini", AutoSwitchPolicy::Always).unwrap();
        assert_eq!(always.current_model_id, "phi-3-mini");
    }

    #[test]
    fn test_failure_and_retry() {
        let s = LifecycleState::initial().start_download("bge-base").unwrap();
        let failed = s.fail_download("bge-base", "connection reset").unwrap();
        let info = failed.model("bge-base").unwrap();
        assert_eq!(info.status, ModelStatus::Error);
        assert_eq!(info.warning.as_deref(), Some("connection reset"));
        assert!(!failed.is_installed("bge-base"));
        assert!(failed.is_consistent());

        // Retry goes through available back to downloading.
        let retry = failed.start_download("bge-base").unwrap();
        assert_eq!(retry.model("bge-base").unwrap().status, ModelStatus::Downloading);
        assert!(retry.model("bge-base").unwrap().warning.is_none());

        let dismissed = failed.dismiss_error("bge-base").unwrap();
        assert_eq!(dismissed.model("bge-base").unwrap().status, ModelStatus::Available);
        assert_eq!(dismissed.dismiss_error("bge-base"), Err(Rejection::NotFailed));
    }

    #[test]
    fn test_cancel_clears_progress() {
        let s = LifecycleState::initial().start_download("bge-base").unwrap();
        let (s, _) = s.report_progress("bge-base", 70.0).unwrap();
        let cancelled = s.cancel_download("bge-base").unwrap();
        let info = cancelled.model("bge-base").unwrap();
        assert_eq!(info.status, ModelStatus::Available);
        assert_eq!(info.download_progress, None);
        assert!(!cancelled.is_installed("bge-base"));
        assert_eq!(cancelled.cancel_download("bge-base"), Err(Rejection::NotDownloading));
        assert_eq!(
            cancelled.report_progress("bge-base", 80.0).map(|(_, p)| p),
            Err(Rejection::NotDownloading)
        );
    }

    #[test]
    fn test_select_requires_install() {
        let s = LifecycleState::initial();
        assert_eq!(s.select_current("bge-base"), Err(Rejection::NotInstalled));
        assert_eq!(s.select_current("gpt-17"), Err(Rejection::UnknownModel));
        let s = installed(&s, "bge-base").select_current("bge-base").unwrap();
        assert_eq!(s.current_model_id, "bge-base");
    }

    #[test]
    fn test_remove_model() {
        let s = installed(&LifecycleState::initial(), "bge-base")
            .select_current("bge-base")
            .unwrap();
        let removed = s.remove_model("bge-base").unwrap();
        assert_eq!(removed.current_model_id, DEFAULT_MODEL_ID);
        assert_eq!(removed.model("bge-base").unwrap().status, ModelStatus::Available);
        assert!(removed.is_consistent());

        assert_eq!(removed.remove_model(DEFAULT_MODEL_ID), Err(Rejection::DefaultModel));
        assert_eq!(removed.remove_model("bge-base"), Err(Rejection::NotInstalled));
    }
}
