//! Model lifecycle types.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;

/// Installation status of a catalog model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Available,
    Downloading,
    Installed,
    Error,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Downloading => write!(f, "downloading"),
            Self::Installed => write!(f, "installed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Catalog model with live status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub size: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub status: ModelStatus,
    /// Percent in [0, 100]; only present while downloading or once installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ModelInfo {
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            name: entry.name.to_string(),
            display_name: entry.display_name.to_string(),
            size: entry.size.to_string(),
            description: entry.description.to_string(),
            capabilities: entry.capabilities.iter().map(|c| c.to_string()).collect(),
            status: ModelStatus::Available,
            download_progress: None,
            warning: None,
        }
    }
}

/// Outcome of a download request that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadStart {
    Started,
    AlreadyInstalled,
    AlreadyDownloading,
}

/// Notification broadcast to lifecycle observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LifecycleEvent {
    DownloadStarted { model_id: String },
    DownloadProgress { model_id: String, progress: f32 },
    DownloadFinished { model_id: String },
    DownloadFailed { model_id: String, error: String },
    DownloadCancelled { model_id: String },
    CurrentModelChanged { model_id: String },
    ModelRemoved { model_id: String },
}

impl LifecycleEvent {
    pub fn model_id(&self) -> &str {
        match self {
            Self::DownloadStarted { model_id }
            | Self::DownloadProgress { model_id, .. }
            | Self::DownloadFinished { model_id }
            | Self::DownloadFailed { model_id, .. }
            | Self::DownloadCancelled { model_id }
            | Self::CurrentModelChanged { model_id }
            | Self::ModelRemoved { model_id } => model_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_info_shape() {
        let info = ModelInfo::from_entry(crate::catalog::entry("bge-base").unwrap());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["displayName"], "BGE Base");
        assert_eq!(json["status"], "available");
        assert!(json.get("downloadProgress").is_none());
        assert!(json["capabilities"].is_array());
    }

    #[test]
    fn test_event_shape() {
        let event = LifecycleEvent::DownloadProgress {
            model_id: "bge-base".into(),
            progress: 40.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "downloadProgress");
        assert_eq!(json["modelId"], "bge-base");
        assert_eq!(json["progress"], 40.0);
        assert_eq!(event.model_id(), "bge-base");
    }
}
