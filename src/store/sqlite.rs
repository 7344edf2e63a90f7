//! SQLite-backed [`RegistryStore`].
//!
//! Records live in a `servers` table keyed by name, with JSON columns stored
//! as TEXT and embeddings as little-endian f32 BLOBs. Full-text matching uses
//! an FTS5 virtual table over name + description, maintained inside the same
//! transaction as each upsert batch. Vector similarity is computed in Rust
//! over the stored BLOBs, and both channels feed weighted reciprocal-rank
//! fusion.
//!
//! Each upsert batch runs in one transaction, so a batch is visible all at
//! once or not at all. There is no cross-batch transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{IndexedRecord, ScoredRecord, EXCLUDED_STATUS};

use super::{fuse_ranks, RegistryStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_record(&self, name: &str) -> Result<Option<IndexedRecord>> {
        let row = sqlx::query(
            r#"
            SELECT name, description, version, repository, packages, remotes,
                   status, is_latest, embedding
            FROM servers
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<IndexedRecord> {
    let repository: String = row.get("repository");
    let packages: String = row.get("packages");
    let remotes: String = row.get("remotes");
    let embedding: Option<Vec<u8>> = row.get("embedding");

    Ok(IndexedRecord {
        name: row.get("name"),
        description: row.get("description"),
        version: row.get("version"),
        repository: serde_json::from_str(&repository).context("Corrupt repository column")?,
        packages: serde_json::from_str(&packages).context("Corrupt packages column")?,
        remotes: serde_json::from_str(&remotes).context("Corrupt remotes column")?,
        status: row.get("status"),
        is_latest: row.get::<i64, _>("is_latest") != 0,
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
    })
}

/// Normalize a free-text query into an FTS5 match expression.
///
/// Each whitespace token becomes a quoted phrase (implicit AND between
/// them), so registry names like `io.example/files` cannot trip FTS5
/// operator parsing.
fn fts_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl RegistryStore for SqliteStore {
    async fn upsert_batch(&self, records: &[IndexedRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let repository = serde_json::to_string(&record.repository)?;
            let packages = serde_json::to_string(&record.packages)?;
            let remotes = serde_json::to_string(&record.remotes)?;
            let embedding = record.embedding.as_deref().map(vec_to_blob);

            sqlx::query(
                r#"
                INSERT INTO servers
                    (name, description, version, repository, packages, remotes,
                     status, is_latest, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    version = excluded.version,
                    repository = excluded.repository,
                    packages = excluded.packages,
                    remotes = excluded.remotes,
                    status = excluded.status,
                    is_latest = excluded.is_latest,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.name)
            .bind(&record.description)
            .bind(&record.version)
            .bind(&repository)
            .bind(&packages)
            .bind(&remotes)
            .bind(&record.status)
            .bind(record.is_latest as i64)
            .bind(&embedding)
            .execute(&mut *tx)
            .await?;

            // FTS5 has no upsert; delete-then-insert inside the transaction.
            sqlx::query("DELETE FROM servers_fts WHERE name = ?")
                .bind(&record.name)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO servers_fts (name, description) VALUES (?, ?)")
                .bind(&record.name)
                .bind(&record.description)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
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
        // Over-fetch per channel so fusion has something to merge.
        let candidate_k = (match_limit * 2).max(match_limit);

        let match_expr = fts_match_expr(query_text);
        let text_names: Vec<String> = if match_expr.is_empty() {
            Vec::new()
        } else {
            let rows = sqlx::query(
                r#"
                SELECT name FROM (
                    SELECT name AS fts_name, rank
                    FROM servers_fts
                    WHERE servers_fts MATCH ?
                    ORDER BY rank
                    LIMIT ?
                )
                JOIN servers ON servers.name = fts_name
                WHERE lower(servers.status) != ?
                ORDER BY rank
                "#,
            )
            .bind(&match_expr)
            .bind(candidate_k)
            .bind(EXCLUDED_STATUS)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(|r| r.get("name")).collect()
        };

        // Vector channel: brute-force cosine over stored embeddings.
        // Excluded rows carry a null embedding and are filtered twice over.
        let rows = sqlx::query(
            "SELECT name, embedding FROM servers WHERE embedding IS NOT NULL AND lower(status) != ?",
        )
        .bind(EXCLUDED_STATUS)
        .fetch_all(&self.pool)
        .await?;

        let mut vector_hits: Vec<(String, f32)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query_embedding, &blob_to_vec(&blob));
                (row.get("name"), similarity)
            })
            .collect();
        vector_hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        vector_hits.truncate(candidate_k.max(0) as usize);
        let vector_names: Vec<String> = vector_hits.into_iter().map(|(name, _)| name).collect();

        let fused = fuse_ranks(
            &text_names,
            &vector_names,
            full_text_weight,
            semantic_weight,
            match_limit.max(0) as usize,
        );

        let mut results = Vec::with_capacity(fused.len());
        for (name, score) in fused {
            if let Some(record) = self.fetch_record(&name).await? {
                results.push(ScoredRecord {
                    name: record.name,
                    description: record.description,
                    version: record.version,
                    repository: record.repository,
                    packages: record.packages,
                    remotes: record.remotes,
                    status: record.status,
                    score,
                });
            }
        }

        Ok(results)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<IndexedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT name, description, version, repository, packages, remotes,
                   status, is_latest, embedding
            FROM servers
            ORDER BY name ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM servers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("test.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn record(name: &str, description: &str, status: &str, embedding: Option<Vec<f32>>) -> IndexedRecord {
        IndexedRecord {
            name: name.to_string(),
            description: description.to_string(),
            version: "1.0.0".to_string(),
            repository: serde_json::json!({"url": "https://example.com"}),
            packages: serde_json::json!([]),
            remotes: serde_json::json!([]),
            status: status.to_string(),
            is_latest: true,
            embedding,
        }
    }

    #[test]
    fn test_fts_match_expr_quotes_tokens() {
        assert_eq!(fts_match_expr("file system"), "\"file\" \"system\"");
        assert_eq!(fts_match_expr("io.example/files"), "\"io.example/files\"");
        assert_eq!(fts_match_expr("a\"b"), "\"ab\"");
        assert_eq!(fts_match_expr("  "), "");
    }

    #[tokio::test]
    async fn test_upsert_idempotent() {
        let (_tmp, store) = test_store().await;
        let records = vec![
            record("alpha", "file tools", "active", Some(vec![1.0, 0.0])),
            record("beta", "db tools", "active", Some(vec![0.0, 1.0])),
        ];

        store.upsert_batch(&records).await.unwrap();
        store.upsert_batch(&records).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let listed = store.list(10, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], records[0]);
        assert_eq!(listed[1], records[1]);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_all_fields() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_batch(&[record("alpha", "old", "active", Some(vec![1.0]))])
            .await
            .unwrap();
        store
            .upsert_batch(&[record("alpha", "new", "deleted", None)])
            .await
            .unwrap();

        let rows = store.list(10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "new");
        assert_eq!(rows[0].status, "deleted");
        assert!(rows[0].embedding.is_none());
    }

    #[tokio::test]
    async fn test_list_ordered_by_name_with_pagination() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_batch(&[
                record("c", "", "active", None),
                record("a", "", "active", None),
                record("b", "", "deleted", None),
            ])
            .await
            .unwrap();

        let names: Vec<String> = store
            .list(10, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let page = store.list(1, 2).await.unwrap();
        assert_eq!(page[0].name, "c");
    }

    #[tokio::test]
    async fn test_hybrid_rank_excludes_deleted_from_both_channels() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_batch(&[
                record("alpha", "file system tool", "active", Some(vec![1.0, 0.0])),
                record("beta", "file system tool", "deleted", None),
            ])
            .await
            .unwrap();

        let results = store
            .hybrid_rank("file system", &[1.0, 0.0], 10, 1.0, 1.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "alpha");
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_hybrid_rank_full_text_only() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_batch(&[
                record("textual", "file system file tools", "active", Some(vec![0.0, 1.0])),
                record("vectorial", "unrelated words", "active", Some(vec![1.0, 0.0])),
            ])
            .await
            .unwrap();

        // Semantic weight zero: only the textual match may appear, even
        // though "vectorial" is the nearest embedding.
        let results = store
            .hybrid_rank("file", &[1.0, 0.0], 10, 1.0, 0.0)
            .await
            .unwrap();
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["textual"]);
    }

    #[tokio::test]
    async fn test_hybrid_rank_semantic_only() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_batch(&[
                record("near", "zzz", "active", Some(vec![1.0, 0.0])),
                record("far", "zzz", "active", Some(vec![0.0, 1.0])),
            ])
            .await
            .unwrap();

        let results = store
            .hybrid_rank("qqq", &[1.0, 0.1], 10, 0.0, 1.0)
            .await
            .unwrap();
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["near", "far"]);
    }
}
