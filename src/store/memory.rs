//! In-memory [`RegistryStore`] implementation for tests.
//!
//! Rows live in a `BTreeMap` keyed by name behind `std::sync::RwLock`, so
//! listing order falls out of the map. The full-text channel is a naive
//! term-frequency match over name + description; the vector channel is
//! brute-force cosine similarity. Both feed the same reciprocal-rank fusion
//! as the SQLite store so fixture expectations carry over.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{IndexedRecord, ScoredRecord};

use super::{fuse_ranks, RegistryStore};

/// In-memory store for tests and fixtures.
#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<BTreeMap<String, IndexedRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a single record by name (test helper).
    pub fn get(&self, name: &str) -> Option<IndexedRecord> {
        self.rows.read().unwrap().get(name).cloned()
    }
}

/// Occurrences of query terms in the record's searchable text.
fn term_frequency(record: &IndexedRecord, terms: &[String]) -> usize {
    let haystack = format!("{} {}", record.name, record.description).to_lowercase();
    terms
        .iter()
        .map(|term| haystack.matches(term.as_str()).count())
        .sum()
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    async fn upsert_batch(&self, records: &[IndexedRecord]) -> Result<u64> {
        let mut rows = self.rows.write().unwrap();
        for record in records {
            rows.insert(record.name.clone(), record.clone());
        }
        Ok(records.len() as u64)
    }

    async fn hybrid_rank(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        match_limit: i64,
        full_text_weight: f64,
        semantic_weight: f64,
    ) -> Result<Vec<ScoredRecord>> {
        let rows = self.rows.read().unwrap();

        let terms: Vec<String> = query_text
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();

        // Full-text channel: all non-excluded rows matching every term,
        // ranked by term frequency.
        let mut text_hits: Vec<(&IndexedRecord, usize)> = rows
            .values()
            .filter(|r| !r.status.eq_ignore_ascii_case(crate::models::EXCLUDED_STATUS))
            .filter_map(|r| {
                let haystack = format!("{} {}", r.name, r.description).to_lowercase();
                let matches =
                    !terms.is_empty() && terms.iter().all(|t| haystack.contains(t.as_str()));
                matches.then(|| (r, term_frequency(r, &terms)))
            })
            .collect();
        text_hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(&b.0.name)));
        let text_names: Vec<String> = text_hits.iter().map(|(r, _)| r.name.clone()).collect();

        // Vector channel: excluded rows are absent by construction (null
        // embedding), ranked by cosine similarity.
        let mut vector_hits: Vec<(&IndexedRecord, f32)> = rows
            .values()
            .filter(|r| !r.status.eq_ignore_ascii_case(crate::models::EXCLUDED_STATUS))
            .filter_map(|r| {
                r.embedding
                    .as_ref()
                    .map(|e| (r, cosine_similarity(query_embedding, e)))
            })
            .collect();
        vector_hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.name.cmp(&b.0.name))
        });
        let vector_names: Vec<String> = vector_hits.iter().map(|(r, _)| r.name.clone()).collect();

        let fused = fuse_ranks(
            &text_names,
            &vector_names,
            full_text_weight,
            semantic_weight,
            match_limit.max(0) as usize,
        );

        Ok(fused
            .into_iter()
            .filter_map(|(name, score)| {
                rows.get(&name).map(|r| ScoredRecord {
                    name: r.name.clone(),
                    description: r.description.clone(),
                    version: r.version.clone(),
                    repository: r.repository.clone(),
                    packages: r.packages.clone(),
                    remotes: r.remotes.clone(),
                    status: r.status.clone(),
                    score,
                })
            })
            .collect())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<IndexedRecord>> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows.read().unwrap().len() as u64)
    }
}
