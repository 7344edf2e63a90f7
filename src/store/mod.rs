//! Storage abstraction for the registry mirror.
//!
//! The [`RegistryStore`] trait is the narrow contract the pipeline and the
//! search engine drive: batch upsert keyed by name, combined full-text +
//! vector ranking, and name-ordered listing. The ranking capability lives
//! behind the trait — callers supply the query text, the query embedding,
//! a result limit, and the two fusion weights, and receive ordered scored
//! rows back.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexedRecord, ScoredRecord};

/// Abstract storage backend keyed by server name.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_batch`](RegistryStore::upsert_batch) | Insert-or-replace a batch of records (atomic per batch) |
/// | [`hybrid_rank`](RegistryStore::hybrid_rank) | Combined full-text + vector-similarity ranking |
/// | [`list`](RegistryStore::list) | Name-ordered paginated listing, no status filter |
/// | [`count`](RegistryStore::count) | Total number of stored records |
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Insert or fully replace records, keyed by name.
    ///
    /// On conflict every field is overwritten, including the embedding.
    /// The batch is atomic: either all rows become visible or none do.
    /// Returns the number of rows written.
    async fn upsert_batch(&self, records: &[IndexedRecord]) -> Result<u64>;

    /// Rank records by a weighted fusion of full-text relevance and vector
    /// similarity, best first.
    ///
    /// Excluded-status records never appear: they are filtered from the
    /// full-text channel and absent from the vector channel by virtue of
    /// their null embedding.
    async fn hybrid_rank(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        match_limit: i64,
        full_text_weight: f64,
        semantic_weight: f64,
    ) -> Result<Vec<ScoredRecord>>;

    /// List records ordered by name ascending, including excluded statuses.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<IndexedRecord>>;

    /// Total number of stored records.
    async fn count(&self) -> Result<u64>;
}

/// Reciprocal-rank-fusion smoothing constant.
pub(crate) const RRF_K: f64 = 50.0;

/// Fuse two ranked candidate lists with weighted reciprocal-rank fusion.
///
/// `score(name) = w_ft / (k + rank_ft) + w_sem / (k + rank_sem)`, where a
/// rank is the candidate's zero-based position in its channel. Names absent
/// from a channel contribute nothing for it; names whose combined score is
/// zero (both weights zero, or zero-weighted channels only) are dropped.
///
/// Output is ordered by score descending, name ascending for ties, and
/// truncated to `limit`.
pub(crate) fn fuse_ranks(
    full_text: &[String],
    semantic: &[String],
    full_text_weight: f64,
    semantic_weight: f64,
    limit: usize,
) -> Vec<(String, f64)> {
    let mut scores: std::collections::HashMap<&str, f64> = std::collections::HashMap::new();

    for (rank, name) in full_text.iter().enumerate() {
        *scores.entry(name.as_str()).or_default() += full_text_weight / (RRF_K + rank as f64);
    }
    for (rank, name) in semantic.iter().enumerate() {
        *scores.entry(name.as_str()).or_default() += semantic_weight / (RRF_K + rank as f64);
    }

    let mut fused: Vec<(String, f64)> = scores
        .into_iter()
        .filter(|(_, score)| *score > 0.0)
        .map(|(name, score)| (name.to_string(), score))
        .collect();

    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused.truncate(limit);
    fused
}
