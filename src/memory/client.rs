//! HTTP client for the remote memory service.
//!
//! The service exposes a minimal namespaced contract: `GET /health`,
//! `POST /memories` to store a record, and `POST /memories/search` to
//! retrieve relevant records. Every request carries a namespace; records
//! stored under one namespace are never visible to another.

use crate::config::MemoryConfig;
use crate::error::{PipelineError, Result};
use crate::memory::types::{
    MemoryRecord, SearchRequest, SearchResponse, StoreRequest, StoreResponse,
};
use std::time::Duration;
use tracing::debug;

/// Client for the remote memory store.
pub struct MemoryClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl MemoryClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &MemoryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| PipelineError::Memory(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    /// Whether the memory service is reachable.
    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.with_auth(self.http.get(&url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Store a record under `namespace`. Returns the store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an empty namespace (the
    /// isolation key must always be present) and
    /// [`PipelineError::Memory`] for transport or service failures.
    pub async fn store(&self, content: &str, namespace: &str, tags: &[String]) -> Result<String> {
        if namespace.is_empty() {
            return Err(PipelineError::Config(
                "memory namespace must not be empty".into(),
            ));
        }

        let url = format!("{}/memories", self.base_url);
        let body = StoreRequest {
            content,
            namespace,
            tags,
        };

        let resp = self
            .with_auth(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Memory(format!("store request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Memory(format!(
                "store rejected with status {status}"
            )));
        }

        let parsed: StoreResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Memory(format!("invalid store response: {e}")))?;

        debug!("stored memory {} in namespace {namespace}", parsed.id);
        Ok(parsed.id)
    }

    /// Search `namespace` for records relevant to `query`, most relevant
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an empty namespace and
    /// [`PipelineError::Memory`] for transport or service failures.
    pub async fn search(
        &self,
        query: &str,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        if namespace.is_empty() {
            return Err(PipelineError::Config(
                "memory namespace must not be empty".into(),
            ));
        }

        let url = format!("{}/memories/search", self.base_url);
        let body = SearchRequest {
            query,
            namespace,
            limit,
        };

        let resp = self
            .with_auth(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Memory(format!("search request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Memory(format!(
                "search rejected with status {status}"
            )));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Memory(format!("invalid search response: {e}")))?;

        Ok(parsed.matches)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }
}
