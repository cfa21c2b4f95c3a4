// Pinecone REST client.
//
// The control plane (api.pinecone.io) manages indexes; each index exposes its
// own data-plane host for upsert/query/stats. Wire field names are camelCase.


use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PineconeConfig;
use crate::net::HttpClient;
use crate::{RagError, Result};

const READY_POLL_INITIAL: Duration = Duration::from_secs(1);
const READY_POLL_TIMEOUT: Duration = Duration::from_secs(120);
const READY_POLL_MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Metadata stored alongside each vector and returned with query matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub text: String,
    pub source: String,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: u32,
    pub metric: String,
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    #[serde(default)]
    pub dimension: u32,
    #[serde(default)]
    pub total_vector_count: u64,
    #[serde(default)]
    pub namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    #[serde(default)]
    pub vector_count: u64,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexListEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexListEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: u32,
    metric: &'a str,
    spec: IndexSpec<'a>,
}

#[derive(Debug, Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredMatch>,
}

/// Control-plane client: index lifecycle and discovery.
#[derive(Debug, Clone)]
pub struct PineconeClient {
    api_key: String,
    control_plane_url: Url,
    http: HttpClient,
    ready_poll_initial: Duration,
    ready_poll_timeout: Duration,
}

impl PineconeClient {
    #[inline]
    pub fn new(config: &PineconeConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            control_plane_url: config.control_plane_url.clone(),
            http: HttpClient::new(),
            ready_poll_initial: READY_POLL_INITIAL,
            ready_poll_timeout: READY_POLL_TIMEOUT,
        }
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    /// Override the readiness poll schedule. Tests shrink it to milliseconds.
    #[inline]
    pub fn with_ready_poll(mut self, initial: Duration, timeout: Duration) -> Self {
        self.ready_poll_initial = initial;
        self.ready_poll_timeout = timeout;
        self
    }

    fn endpoint(&self, segment: &str) -> Result<Url> {
        self.control_plane_url
            .join(segment)
            .with_context(|| format!("Failed to build Pinecone URL for {segment}"))
            .map_err(RagError::Other)
    }

    #[inline]
    pub fn list_indexes(&self) -> Result<Vec<String>> {
        let url = self.endpoint("indexes")?;
        let response_text = self
            .http
            .get(url.as_str(), &[("Api-Key", &self.api_key)])
            .map_err(|e| RagError::VectorStore(format!("Failed to list indexes: {e}")))?;

        let list: IndexList = serde_json::from_str(&response_text)
            .map_err(|e| RagError::VectorStore(format!("Invalid index list response: {e}")))?;

        Ok(list.indexes.into_iter().map(|i| i.name).collect())
    }

    #[inline]
    pub fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let url = self.endpoint(&format!("indexes/{name}"))?;
        let response_text = self
            .http
            .get(url.as_str(), &[("Api-Key", &self.api_key)])
            .map_err(|e| RagError::VectorStore(format!("Failed to describe index {name}: {e}")))?;

        serde_json::from_str(&response_text)
            .map_err(|e| RagError::VectorStore(format!("Invalid index description: {e}")))
    }

    #[inline]
    pub fn create_index(&self, config: &PineconeConfig, dimension: u32) -> Result<()> {
        info!(
            "Creating index {} (dimension {}, metric {})",
            config.index_name, dimension, config.metric
        );

        let request = CreateIndexRequest {
            name: &config.index_name,
            dimension,
            metric: &config.metric,
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: &config.cloud,
                    region: &config.region,
                },
            },
        };
        let body = serde_json::to_string(&request)
            .context("Failed to serialize create-index request")
            .map_err(RagError::Other)?;

        let url = self.endpoint("indexes")?;
        self.http
            .post_json(url.as_str(), &[("Api-Key", &self.api_key)], &body)
            .map_err(|e| RagError::VectorStore(format!("Failed to create index: {e}")))?;

        Ok(())
    }

    /// Ensure the configured index exists, is ready, and matches the expected
    /// dimension. Creates it when absent. Returns a data-plane handle.
    #[inline]
    pub fn ensure_index(&self, config: &PineconeConfig, dimension: u32) -> Result<IndexHandle> {
        let existing = self.list_indexes()?;
        if existing.iter().any(|name| *name == config.index_name) {
            debug!("Index {} already exists", config.index_name);
        } else {
            self.create_index(config, dimension)?;
        }

        let description = self.wait_until_ready(&config.index_name)?;
        if description.dimension != dimension {
            return Err(RagError::VectorStore(format!(
                "Index {} has dimension {}, expected {}",
                config.index_name, description.dimension, dimension
            )));
        }

        Ok(IndexHandle::new(
            &description.host,
            &self.api_key,
            &config.namespace,
        ))
    }

    /// Open an existing index for querying. Fails if the index is missing or
    /// not yet ready; the query path never creates indexes.
    #[inline]
    pub fn open_index(&self, config: &PineconeConfig) -> Result<IndexHandle> {
        let description = self.describe_index(&config.index_name)?;
        if !description.status.ready {
            return Err(RagError::VectorStore(format!(
                "Index {} is not ready (state: {})",
                config.index_name, description.status.state
            )));
        }

        Ok(IndexHandle::new(
            &description.host,
            &self.api_key,
            &config.namespace,
        ))
    }

    /// Poll until the index reports ready, backing off exponentially and
    /// giving up after the configured timeout.
    fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let started = Instant::now();
        let mut interval = self.ready_poll_initial;

        loop {
            let description = self.describe_index(name)?;
            if description.status.ready {
                debug!("Index {} is ready", name);
                return Ok(description);
            }

            if started.elapsed() + interval > self.ready_poll_timeout {
                return Err(RagError::VectorStore(format!(
                    "Timed out after {:?} waiting for index {} to become ready (state: {})",
                    self.ready_poll_timeout, name, description.status.state
                )));
            }

            warn!(
                "Index {} not ready (state: {}), retrying in {:?}",
                name, description.status.state, interval
            );
            std::thread::sleep(interval);
            interval = (interval * 2).min(READY_POLL_MAX_INTERVAL);
        }
    }
}

/// Data-plane handle bound to one index host and namespace.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    host_url: String,
    api_key: String,
    namespace: String,
    http: HttpClient,
}

impl IndexHandle {
    /// The control plane returns hosts without a scheme; default to https.
    #[inline]
    pub fn new(host: &str, api_key: &str, namespace: &str) -> Self {
        let host_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };

        Self {
            host_url,
            api_key: api_key.to_string(),
            namespace: namespace.to_string(),
            http: HttpClient::new(),
        }
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Upsert a batch of vectors, returning the count the service accepted.
    #[inline]
    pub fn upsert(&self, vectors: &[VectorRecord]) -> Result<usize> {
        if vectors.is_empty() {
            return Ok(0);
        }

        debug!(
            "Upserting {} vectors into namespace {}",
            vectors.len(),
            self.namespace
        );

        let request = UpsertRequest {
            vectors,
            namespace: &self.namespace,
        };
        let body = serde_json::to_string(&request)
            .context("Failed to serialize upsert request")
            .map_err(RagError::Other)?;

        let url = format!("{}/vectors/upsert", self.host_url);
        let response_text = self
            .http
            .post_json(&url, &[("Api-Key", &self.api_key)], &body)
            .map_err(|e| RagError::VectorStore(format!("Upsert failed: {e}")))?;

        let response: UpsertResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::VectorStore(format!("Invalid upsert response: {e}")))?;

        Ok(response.upserted_count)
    }

    /// Query the nearest `top_k` vectors, returning matches sorted by
    /// descending score.
    #[inline]
    pub fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>> {
        debug!(
            "Querying top {} matches in namespace {}",
            top_k, self.namespace
        );

        let request = QueryRequest {
            vector,
            top_k,
            namespace: &self.namespace,
            include_metadata: true,
        };
        let body = serde_json::to_string(&request)
            .context("Failed to serialize query request")
            .map_err(RagError::Other)?;

        let url = format!("{}/query", self.host_url);
        let response_text = self
            .http
            .post_json(&url, &[("Api-Key", &self.api_key)], &body)
            .map_err(|e| RagError::VectorStore(format!("Query failed: {e}")))?;

        let response: QueryResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::VectorStore(format!("Invalid query response: {e}")))?;

        let mut matches = response.matches;
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(matches)
    }

    #[inline]
    pub fn stats(&self) -> Result<IndexStats> {
        let url = format!("{}/describe_index_stats", self.host_url);
        let response_text = self
            .http
            .post_json(&url, &[("Api-Key", &self.api_key)], "{}")
            .map_err(|e| RagError::VectorStore(format!("Stats request failed: {e}")))?;

        serde_json::from_str(&response_text)
            .map_err(|e| RagError::VectorStore(format!("Invalid stats response: {e}")))
    }
}
