//! ETL pipeline: fetch the registry catalog, select latest versions, embed,
//! and upsert into the store.
//!
//! A run is a single sequential pass; each stage fully materializes its
//! output before the next begins. Any stage failure aborts the run and
//! bubbles up. Upserts are batched, and a failure after some batches have
//! committed leaves a mix of old and new rows — every row individually
//! well-formed — which the next successful run reconciles. Runs hold no
//! cross-run lock; an external scheduler is assumed to serialize them.

use std::collections::HashMap;

use anyhow::{bail, Result};
use tracing::info;

use crate::embedding::Embedder;
use crate::models::{IndexedRecord, RegistryEntry};
use crate::registry::{select_latest, RegistryClient};
use crate::store::RegistryStore;

/// Rows per store upsert batch.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Counters from a completed pipeline run.
#[derive(Debug, Clone, Default)]
pub struct EtlReport {
    /// Raw catalog items fetched across all pages.
    pub fetched: usize,
    /// Entries retained after latest-version selection.
    pub latest: usize,
    /// Entries that received a computed embedding.
    pub embedded: usize,
    /// Rows written to the store.
    pub upserted: u64,
}

/// Run the full pipeline once.
///
/// `limit` truncates the latest-version set before embedding; it exists for
/// test runs against the live registry and is `None` in production.
pub async fn run(
    client: &RegistryClient,
    embedder: &dyn Embedder,
    store: &dyn RegistryStore,
    limit: Option<usize>,
) -> Result<EtlReport> {
    info!("starting ETL run");

    let raw = client.fetch_all().await?;
    info!(fetched = raw.len(), "fetched catalog");

    let mut latest = select_latest(&raw);
    info!(latest = latest.len(), "selected latest versions (all statuses)");

    if let Some(n) = limit {
        latest.truncate(n);
        info!(limit = n, "test mode: truncated latest set");
    }

    let embedding_map = build_embedding_map(embedder, &latest).await?;
    let embedded = embedding_map.values().filter(|e| e.is_some()).count();

    let upserted = sync(store, &latest, &embedding_map).await?;
    info!(upserted, "ETL run completed");

    Ok(EtlReport {
        fetched: raw.len(),
        latest: latest.len(),
        embedded,
        upserted,
    })
}

/// Embed every non-excluded entry and build the name→embedding mapping.
///
/// Excluded-status entries are never sent to the embedding service; they get
/// an explicit `None`. Entries somehow absent from the computed set also
/// default to `None` — a safety net, not an expected path.
pub async fn build_embedding_map(
    embedder: &dyn Embedder,
    latest: &[RegistryEntry],
) -> Result<HashMap<String, Option<Vec<f32>>>> {
    let candidates: Vec<&RegistryEntry> = latest.iter().filter(|e| !e.is_excluded()).collect();
    let texts: Vec<String> = candidates.iter().map(|e| e.search_text()).collect();

    let embeddings = if texts.is_empty() {
        Vec::new()
    } else {
        embedder.embed(&texts).await?
    };

    if embeddings.len() != candidates.len() {
        bail!(
            "Embedding count mismatch: {} texts, {} vectors",
            candidates.len(),
            embeddings.len()
        );
    }

    let mut map: HashMap<String, Option<Vec<f32>>> = HashMap::with_capacity(latest.len());
    for (entry, embedding) in candidates.into_iter().zip(embeddings) {
        map.insert(entry.name.clone(), Some(embedding));
    }
    for entry in latest {
        map.entry(entry.name.clone()).or_insert(None);
    }

    Ok(map)
}

/// Idempotently write the latest-version set into the store.
///
/// Every entry becomes one row keyed by name, carrying its embedding from
/// the map or null. Writes go in batches of [`UPSERT_BATCH_SIZE`]; each
/// batch is atomic, the run as a whole is not.
pub async fn sync(
    store: &dyn RegistryStore,
    latest: &[RegistryEntry],
    embedding_map: &HashMap<String, Option<Vec<f32>>>,
) -> Result<u64> {
    let rows: Vec<IndexedRecord> = latest
        .iter()
        .map(|entry| {
            let embedding = embedding_map.get(&entry.name).cloned().flatten();
            IndexedRecord::from_entry(entry, embedding)
        })
        .collect();

    let batches = rows.len().div_ceil(UPSERT_BATCH_SIZE).max(1);
    let mut upserted = 0u64;

    for (i, batch) in rows.chunks(UPSERT_BATCH_SIZE).enumerate() {
        info!(batch = i + 1, batches, size = batch.len(), "upserting batch");
        upserted += store.upsert_batch(batch).await?;
    }

    Ok(upserted)
}
