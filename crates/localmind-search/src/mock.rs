//! Deterministic local results used when the search service is unavailable.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use sha2::{Digest, Sha256};

use crate::backend::{SearchBackend, TransportError};
use crate::types::{SearchRequest, SearchResponse, SearchResult};

const DEFAULT_LIMIT: usize = 10;
/// Hits generated per query before filtering.
const CANDIDATES: usize = 12;
const FILE_TYPES: &[&str] = &["pdf", "docx", "md", "txt"];
const TOPICS: &[&str] = &[
    "Overview",
    "Meeting notes",
    "Research summary",
    "Project plan",
    "Reference guide",
    "Draft",
];

/// Same request in, same response out.
#[derive(Debug, Clone, Default)]
pub struct MockSearchBackend {
    latency: Duration,
}

impl MockSearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every async answer by `latency`. `respond` is unaffected.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    /// Build the response synchronously.
    pub fn respond(&self, request: &SearchRequest) -> SearchResponse {
        let query = request.query.trim();
        let wanted: Vec<String> = request
            .filters
            .file_types
            .iter()
            .map(|t| t.trim_start_matches('.').to_lowercase())
            .collect();
        let limit = request.filters.limit.unwrap_or(DEFAULT_LIMIT);

        let matching: Vec<SearchResult> = (0..CANDIDATES)
            .map(|rank| mock_result(query, rank))
            .filter(|r| wanted.is_empty() || wanted.contains(&r.file_type))
            .collect();

        let digest = Sha256::digest(query.as_bytes());
        SearchResponse {
            total_results: matching.len(),
            results: matching.into_iter().take(limit).collect(),
            processing_time_ms: 15 + u64::from(digest[0] % 60),
            model_used: request.model_id.clone(),
        }
    }
}

impl SearchBackend for MockSearchBackend {
    fn search(&self, request: SearchRequest) -> BoxFuture<'static, Result<SearchResponse, TransportError>> {
        let response = self.respond(&request);
        let latency = self.latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(response)
        }
        .boxed()
    }
}

fn mock_result(query: &str, rank: usize) -> SearchResult {
    let digest = Sha256::digest(format!("{}:{}", query, rank).as_bytes());
    let id = hex::encode(&digest[..8]);
    let file_type = FILE_TYPES[digest[8] as usize % FILE_TYPES.len()];
    let topic = TOPICS[digest[9] as usize % TOPICS.len()];

    SearchResult {
        title: format!("{}: {}", topic, query),
        snippet: format!("Local preview result {} for \"{}\".", rank + 1, query),
        file_type: file_type.to_string(),
        score: (0.95 - rank as f64 * 0.05).max(0.1),
        path: Some(format!("mock/{}.{}", id, file_type)),
        id,
    }
}
