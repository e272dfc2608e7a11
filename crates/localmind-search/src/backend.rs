//! Remote search collaborator.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use localmind_core::{Error, Result};
use reqwest::Client;
use tracing::debug;

use crate::types::{SearchRequest, SearchResponse};

/// Why a search call did not produce a response.
///
/// The dispatcher turns every variant into "backend disconnected"; callers
/// of the dispatcher never see it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("search service unreachable: {0}")]
    Unreachable(String),
    #[error("search service returned status {0}")]
    Status(u16),
    #[error("invalid search response: {0}")]
    Decode(String),
}

/// Anything that can answer a search request.
pub trait SearchBackend: Send + Sync {
    fn search(&self, request: SearchRequest) -> BoxFuture<'static, std::result::Result<SearchResponse, TransportError>>;
}

/// JSON over HTTP: `POST {base_url}/api/search`.
pub struct HttpSearchBackend {
    client: Client,
    endpoint: String,
}

impl HttpSearchBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/search", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SearchBackend for HttpSearchBackend {
    fn search(&self, request: SearchRequest) -> BoxFuture<'static, std::result::Result<SearchResponse, TransportError>> {
        let client = self.client.clone();
        let url = self.endpoint.clone();

        async move {
            debug!("POST {} query={:?} model={}", url, request.query, request.model_id);

            let response = client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| TransportError::Unreachable(e.to_string()))?;

            if !response.status().is_success() {
                return Err(TransportError::Status(response.status().as_u16()));
            }

            response
                .json::<SearchResponse>()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let backend = HttpSearchBackend::new("http://localhost:3003/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:3003/api/search");
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        // Nothing listens on the discard port.
        let backend = HttpSearchBackend::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = backend
            .search(SearchRequest {
                query: "neural".into(),
                model_id: "minilm-l6".into(),
                filters: Default::default(),
            })
            .await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
    }
}
