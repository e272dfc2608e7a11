//! Runtime types.

use localmind_core::DeviceCapabilities;
use localmind_models::{ModelStatus, Performance};
use serde::Serialize;

/// One catalog model as the host sees it on this device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOverview {
    pub id: String,
    pub display_name: String,
    pub size: String,
    pub status: ModelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_progress: Option<f32>,
    pub can_run: bool,
    pub performance: Performance,
    pub warnings: Vec<String>,
    pub current: bool,
}

/// Runtime status information.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub capabilities: DeviceCapabilities,
    pub current_model_id: String,
    pub installed_model_ids: Vec<String>,
    pub downloading_model_ids: Vec<String>,
    pub recommended_model_ids: Vec<String>,
    pub models: Vec<ModelOverview>,
    pub backend_connected: bool,
    pub history_len: usize,
}
