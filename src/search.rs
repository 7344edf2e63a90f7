//! Hybrid search engine over the registry mirror.
//!
//! [`HybridSearch`] owns handles to the store and the embedding provider,
//! constructed once at process start and shared by reference (no lazy
//! global state). Its job is narrow: bounds-check the caller's inputs,
//! produce the query embedding, and forward the store's ordered, scored
//! ranking output unmodified.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::embedding::{embed_query, Embedder};
use crate::models::{IndexedRecord, ScoredRecord};
use crate::store::RegistryStore;

/// Inclusive bounds on `search` parameters.
pub const MAX_SEARCH_LIMIT: i64 = 100;
pub const MAX_WEIGHT: f64 = 10.0;

/// Inclusive bound on `list` page size.
pub const MAX_LIST_LIMIT: i64 = 1000;

pub struct HybridSearch {
    store: Arc<dyn RegistryStore>,
    embedder: Arc<dyn Embedder>,
}

impl HybridSearch {
    pub fn new(store: Arc<dyn RegistryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Search the mirror with weighted full-text + semantic ranking.
    ///
    /// An empty or whitespace-only query returns an empty result list
    /// without calling the embedding service. Out-of-bounds parameters are
    /// errors, surfaced as `invalid` by the HTTP layer.
    pub async fn search(
        &self,
        query: &str,
        limit: i64,
        full_text_weight: f64,
        semantic_weight: f64,
    ) -> Result<Vec<ScoredRecord>> {
        if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
            bail!("invalid limit: must be in [1, {}]", MAX_SEARCH_LIMIT);
        }
        if !(0.0..=MAX_WEIGHT).contains(&full_text_weight) {
            bail!("invalid full_text_weight: must be in [0, {}]", MAX_WEIGHT);
        }
        if !(0.0..=MAX_WEIGHT).contains(&semantic_weight) {
            bail!("invalid semantic_weight: must be in [0, {}]", MAX_WEIGHT);
        }

        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = embed_query(self.embedder.as_ref(), query).await?;

        self.store
            .hybrid_rank(
                query,
                &query_embedding,
                limit,
                full_text_weight,
                semantic_weight,
            )
            .await
    }

    /// List the full indexed set, ordered by name, no status filter.
    ///
    /// Excluded-status records appear here so status transitions stay
    /// observable.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<IndexedRecord>> {
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            bail!("invalid limit: must be in [1, {}]", MAX_LIST_LIMIT);
        }
        if offset < 0 {
            bail!("invalid offset: must be >= 0");
        }

        self.store.list(limit, offset).await
    }

    /// Total number of indexed records.
    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    /// Maps any query to a fixed unit vector.
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn dims(&self) -> usize {
            self.0.len()
        }
    }

    struct PanickingEmbedder;

    #[async_trait]
    impl Embedder for PanickingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            panic!("embedder must not be called");
        }

        fn dims(&self) -> usize {
            0
        }
    }

    fn record(name: &str, description: &str, status: &str, embedding: Option<Vec<f32>>) -> IndexedRecord {
        IndexedRecord {
            name: name.to_string(),
            description: description.to_string(),
            version: "1.0.0".to_string(),
            repository: serde_json::json!({}),
            packages: serde_json::json!([]),
            remotes: serde_json::json!([]),
            status: status.to_string(),
            is_latest: true,
            embedding,
        }
    }

    async fn engine_with(records: Vec<IndexedRecord>, embedder: Arc<dyn Embedder>) -> HybridSearch {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_batch(&records).await.unwrap();
        HybridSearch::new(store, embedder)
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty_without_embedding() {
        let engine = engine_with(
            vec![record("a", "anything", "active", Some(vec![1.0]))],
            Arc::new(PanickingEmbedder),
        )
        .await;

        assert!(engine.search("", 10, 1.0, 1.0).await.unwrap().is_empty());
        assert!(engine.search("   ", 10, 1.0, 1.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_bounds_checked() {
        let engine = engine_with(vec![], Arc::new(FixedEmbedder(vec![1.0]))).await;

        assert!(engine.search("x", 0, 1.0, 1.0).await.is_err());
        assert!(engine.search("x", 101, 1.0, 1.0).await.is_err());
        assert!(engine.search("x", 10, -0.1, 1.0).await.is_err());
        assert!(engine.search("x", 10, 1.0, 10.5).await.is_err());
        assert!(engine.search("x", 100, 10.0, 0.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_search_excludes_deleted() {
        let engine = engine_with(
            vec![
                record("alpha", "file system tool", "active", Some(vec![1.0, 0.0])),
                record("beta", "file system tool", "deleted", None),
            ],
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
        )
        .await;

        let results = engine.search("file system", 10, 1.0, 1.0).await.unwrap();
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha"]);
    }

    #[tokio::test]
    async fn test_list_bounds_checked() {
        let engine = engine_with(vec![], Arc::new(FixedEmbedder(vec![1.0]))).await;

        assert!(engine.list(0, 0).await.is_err());
        assert!(engine.list(1001, 0).await.is_err());
        assert!(engine.list(10, -1).await.is_err());
        assert!(engine.list(1000, 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_includes_deleted_ordered_by_name() {
        let engine = engine_with(
            vec![
                record("beta", "", "deleted", None),
                record("alpha", "", "active", Some(vec![1.0])),
            ],
            Arc::new(FixedEmbedder(vec![1.0])),
        )
        .await;

        let listed = engine.list(10, 0).await.unwrap();
        let names: Vec<_> = listed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}
