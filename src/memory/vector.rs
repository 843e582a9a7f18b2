//! Semantic index over every recorded turn
//!
//! `VectorBackend` is the storage engine (in-memory or Chroma); `VectorIndex`
//! is the access contract the memory manager relies on:
//!
//! - records are append-only and ids are never reused
//! - queries are scoped to one session namespace
//! - results are ranked by similarity, at most `k`, without duplicate ids
//! - an empty index yields an empty result, never an error

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::llm::{with_timeout, Embedder};
use crate::models::Role;
use crate::Result;

/// One indexed turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedMemory {
    pub id: String,
    /// Session the turn belongs to
    pub namespace: String,
    pub embedding: Vec<f32>,
    pub role: Role,
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

/// A query hit, highest score first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub id: String,
    pub text: String,
    pub role: Option<Role>,
    pub score: f32,
}

/// Storage engine behind the vector index.
///
/// Implementations must tolerate concurrent upserts and queries.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Append a record. Reusing an id is an error.
    async fn upsert(&self, record: IndexedMemory) -> Result<()>;

    /// Nearest neighbours within `namespace`, best first, at most `k`
    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedMemory>>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Exact cosine search over records held in process
#[derive(Default)]
pub struct InMemoryVectorBackend {
    records: RwLock<Vec<IndexedMemory>>,
    ids: RwLock<HashSet<String>>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn upsert(&self, record: IndexedMemory) -> Result<()> {
        {
            let mut ids = self.ids.write().await;
            if !ids.insert(record.id.clone()) {
                return Err(MemoryError::DuplicateMemoryId(record.id));
            }
        }

        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        let records = self.records.read().await;

        let mut hits: Vec<RetrievedMemory> = records
            .iter()
            .filter(|record| record.namespace == namespace)
            .map(|record| RetrievedMemory {
                id: record.id.clone(),
                text: record.text.clone(),
                role: Some(record.role),
                score: Self::cosine_similarity(embedding, &record.embedding),
            })
            .collect();

        // Stable sort: ties keep insertion order
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }
}

// ============================================================================
// Chroma backend
// ============================================================================

/// Chroma server reached over its HTTP API
pub struct ChromaVectorBackend {
    client: Client,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
}

impl ChromaVectorBackend {
    pub fn new(base_url: String, collection: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
            collection_id: OnceCell::new(),
        })
    }

    async fn collection_id(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let body = serde_json::json!({
                    "name": self.collection,
                    "get_or_create": true,
                    "metadata": { "hnsw:space": "cosine" },
                });
                let collection: ChromaCollection =
                    self.send(self.client.post(self.url("/api/v1/collections")).json(&body)).await?;
                info!(
                    "Chroma collection '{}' ready (id {})",
                    self.collection, collection.id
                );
                Ok::<String, MemoryError>(collection.id)
            })
            .await?;

        Ok(id.as_str())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            error!("Chroma request failed: {}", e);
            MemoryError::Transport(format!("Chroma error: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Chroma error response ({}): {}", status, error_text);
            return Err(MemoryError::IndexFailed(format!(
                "Chroma returned {}: {}",
                status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            error!("Failed to parse Chroma response: {}", e);
            MemoryError::Transport(format!("Chroma parse error: {}", e))
        })
    }
}

#[async_trait]
impl VectorBackend for ChromaVectorBackend {
    fn backend_name(&self) -> &'static str {
        "chroma"
    }

    async fn upsert(&self, record: IndexedMemory) -> Result<()> {
        let id = self.collection_id().await?;
        let body = serde_json::json!({
            "ids": [record.id],
            "embeddings": [record.embedding],
            "metadatas": [{
                "role": record.role.as_str(),
                "session_id": record.namespace,
                "recorded_at": record.recorded_at.to_rfc3339(),
            }],
            "documents": [record.text],
        });

        let _: serde_json::Value = self
            .send(
                self.client
                    .post(self.url(&format!("/api/v1/collections/{}/add", id)))
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        let id = self.collection_id().await?;

        // Chroma rejects n_results above the collection size
        let count: usize = self
            .send(
                self.client
                    .get(self.url(&format!("/api/v1/collections/{}/count", id))),
            )
            .await?;
        let n_results = k.min(count);
        if n_results == 0 {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "where": { "session_id": namespace },
            "include": ["documents", "metadatas", "distances"],
        });

        let response: ChromaQueryResponse = self
            .send(
                self.client
                    .post(self.url(&format!("/api/v1/collections/{}/query", id)))
                    .json(&body),
            )
            .await?;

        Ok(response.into_hits())
    }
}

#[derive(Debug, Deserialize)]
struct ChromaCollection {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChromaQueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<serde_json::Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

impl ChromaQueryResponse {
    /// Unpack the first (and only) query batch
    fn into_hits(self) -> Vec<RetrievedMemory> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let documents = self
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let metadatas = self
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();
        let distances = self
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        ids.into_iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let text = documents.get(i).cloned().flatten()?;
                let role = metadatas
                    .get(i)
                    .and_then(|m| m.as_ref())
                    .and_then(|m| m.get("role"))
                    .and_then(|r| r.as_str())
                    .and_then(|r| r.parse().ok());
                let score = distances.get(i).map(|d| 1.0 - d).unwrap_or(0.0);
                Some(RetrievedMemory {
                    id,
                    text,
                    role,
                    score,
                })
            })
            .collect()
    }
}

// ============================================================================
// Access contract
// ============================================================================

/// Session-scoped view of the vector backend
#[derive(Clone)]
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorBackend>,
    namespace: String,
    timeout: Duration,
}

impl VectorIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn VectorBackend>,
        namespace: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            backend,
            namespace: namespace.into(),
            timeout,
        }
    }

    /// Fresh globally unique record id
    pub fn new_memory_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_timeout(self.timeout, "embedding", self.embedder.embed(text))
            .await
            .map_err(|e| match e {
                MemoryError::Transport(msg) => MemoryError::EmbeddingFailed(msg),
                other => other,
            })
    }

    pub async fn upsert(&self, id: String, embedding: Vec<f32>, text: &str, role: Role) -> Result<()> {
        let record = IndexedMemory {
            id,
            namespace: self.namespace.clone(),
            embedding,
            role,
            text: text.to_string(),
            recorded_at: Utc::now(),
        };

        debug!(
            backend = self.backend.backend_name(),
            id = %record.id,
            "Indexing turn"
        );
        with_timeout(self.timeout, "vector upsert", self.backend.upsert(record)).await
    }

    /// Ranked texts nearest to `embedding`, at most `k`, no duplicate ids
    pub async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedMemory>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = with_timeout(
            self.timeout,
            "vector query",
            self.backend.query(&self.namespace, embedding, k),
        )
        .await?;

        // Rank first so a repeated id keeps its best score
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut seen = HashSet::new();
        hits.retain(|hit| seen.insert(hit.id.clone()));
        hits.truncate(k);

        Ok(hits)
    }
}
