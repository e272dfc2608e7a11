//! Search request, response and view types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional filters forwarded to the search service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    /// File extensions without the dot, e.g. `pdf`. Empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

/// Body of a search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub model_id: String,
    #[serde(default)]
    pub filters: SearchFilters,
}

/// A single hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub file_type: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// What the search service returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub processing_time_ms: u64,
    pub model_used: String,
}

/// Where the visible results came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Backend,
    Mock,
}

/// Dispatcher session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchPhase {
    Idle,
    Debouncing,
    InFlight,
    Resolved,
    Errored,
}

/// What the UI should currently show. Published through a watch channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchView {
    pub query: String,
    pub phase: SearchPhase,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub processing_time_ms: u64,
    pub model_used: Option<String>,
    pub source: Option<ResultSource>,
    pub backend_connected: bool,
    /// Token of the dispatch these results belong to; 0 before any dispatch.
    pub token: u64,
}

impl Default for SearchView {
    fn default() -> Self {
        Self {
            query: String::new(),
            phase: SearchPhase::Idle,
            results: Vec::new(),
            total_results: 0,
            processing_time_ms: 0,
            model_used: None,
            source: None,
            backend_connected: true,
            token: 0,
        }
    }
}

/// A remembered query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// As typed, trimmed.
    pub query: String,
    pub searched_at: DateTime<Utc>,
}

/// Result of one dispatch, as seen by the caller that awaited it.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The response was the latest and is now visible.
    Resolved {
        token: u64,
        source: ResultSource,
        response: SearchResponse,
    },
    /// A newer dispatch or a cancel overtook this one; nothing was published.
    Superseded { token: u64 },
    /// The backend failed and mock fallback is off. The view shows errored.
    Failed { token: u64 },
}

impl DispatchOutcome {
    pub fn token(&self) -> u64 {
        match self {
            Self::Resolved { token, .. } | Self::Superseded { token } | Self::Failed { token } => *token,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = SearchRequest {
            query: "neural network".into(),
            model_id: "minilm-l6".into(),
            filters: SearchFilters {
                file_types: vec!["pdf".into()],
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["modelId"], "minilm-l6");
        assert_eq!(json["filters"]["fileTypes"][0], "pdf");
        assert!(json["filters"].get("limit").is_none());
    }

    #[test]
    fn test_response_parses_service_payload() {
        let raw = r#"{
            "results": [{"id": "a1", "title": "Intro", "snippet": "...", "fileType": "md", "score": 0.9}],
            "totalResults": 1,
            "processingTimeMs": 42,
            "modelUsed": "bge-base"
        }"#;
        let response: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.total_results, 1);
        assert_eq!(response.results[0].file_type, "md");
        assert_eq!(response.results[0].path, None);
    }
}
