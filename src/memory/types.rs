//! Wire types for the remote memory service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A long-term memory record as returned by the remote store.
///
/// Records are created only by store operations and never mutated after
/// creation; deletion is an administrative action outside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Store-assigned record id.
    #[serde(default)]
    pub id: String,
    /// Record text.
    pub content: String,
    /// Free-form tags attached at store time.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Relevance/importance score assigned by the store, most relevant
    /// first in search results.
    #[serde(default)]
    pub salience: f32,
    /// Creation time, when the store reports one.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body for a store request.
#[derive(Debug, Serialize)]
pub(crate) struct StoreRequest<'a> {
    pub content: &'a str,
    pub namespace: &'a str,
    pub tags: &'a [String],
}

/// Response to a store request.
#[derive(Debug, Deserialize)]
pub(crate) struct StoreResponse {
    pub id: String,
}

/// Body for a search request.
#[derive(Debug, Serialize)]
pub(crate) struct SearchRequest<'a> {
    pub query: &'a str,
    pub namespace: &'a str,
    pub limit: usize,
}

/// Response to a search request.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub matches: Vec<MemoryRecord>,
}
