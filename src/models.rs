//! Core data models for the registry mirror.
//!
//! These types represent registry entries as they move through the ETL
//! pipeline: the raw wire shape fetched from the registry, the normalized
//! entry selected for indexing, and the scored rows returned by search.

use serde::{Deserialize, Serialize};

/// Lifecycle status a registry entry is excluded from semantic ranking under.
///
/// Entries with this status are still stored (with a null embedding) so that
/// later status transitions are captured by subsequent syncs.
pub const EXCLUDED_STATUS: &str = "deleted";

/// Namespaced `_meta` key the registry uses for its official metadata.
pub const OFFICIAL_META_KEY: &str = "io.modelcontextprotocol.registry/official";

/// A raw catalog item as returned by the registry API, before normalization.
///
/// Wire shape: `{ "server": {...}, "_meta": { "<namespaced-key>": { "isLatest": bool, "status": str } } }`.
/// Both halves are kept as loose JSON; [`RegistryEntry::from_raw`] applies the
/// schema-with-defaults normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawServer {
    #[serde(default)]
    pub server: serde_json::Value,
    #[serde(rename = "_meta", default)]
    pub meta: serde_json::Value,
}

/// A normalized registry entry: one version of one logical server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Globally unique identifier for the logical server.
    pub name: String,
    pub description: String,
    /// Semver-like version string; not required to be parseable.
    pub version: String,
    /// Free-form repository metadata blob.
    pub repository: serde_json::Value,
    /// Ordered list of package descriptors.
    pub packages: serde_json::Value,
    /// Ordered list of remote endpoint descriptors.
    pub remotes: serde_json::Value,
    /// Lifecycle status: `active`, `deprecated`, `deleted`, or `unknown`.
    pub status: String,
    /// Whether the registry designates this version as current for its name.
    pub is_latest: bool,
}

impl RegistryEntry {
    /// Normalize a raw catalog item into an entry.
    ///
    /// Every optional field gets an explicit default rather than failing:
    /// empty string for text fields, empty object/list for structured blobs,
    /// `"unknown"` for a missing status. The latest flag defaults to `false`,
    /// which means entries without official metadata are dropped by
    /// [`select_latest`](crate::registry::select_latest).
    pub fn from_raw(raw: &RawServer) -> Self {
        let srv = &raw.server;
        let meta = raw
            .meta
            .get(OFFICIAL_META_KEY)
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        Self {
            name: str_field(srv, "name"),
            description: str_field(srv, "description"),
            version: str_field(srv, "version"),
            repository: srv
                .get("repository")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({})),
            packages: srv
                .get("packages")
                .cloned()
                .unwrap_or_else(|| serde_json::json!([])),
            remotes: srv
                .get("remotes")
                .cloned()
                .unwrap_or_else(|| serde_json::json!([])),
            status: meta
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            is_latest: meta
                .get("isLatest")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }

    /// Whether this entry's status excludes it from embedding and ranking.
    pub fn is_excluded(&self) -> bool {
        self.status.eq_ignore_ascii_case(EXCLUDED_STATUS)
    }

    /// The text sent to the embedding service for this entry.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.name, self.description)
    }
}

fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// A row of the mirror store, keyed by server name.
///
/// Exactly one record exists per logical name; a sync overwrites all fields.
/// `embedding` is `None` for excluded-status records (and for the safety-net
/// case of a latest record missing from the embedding map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub name: String,
    pub description: String,
    pub version: String,
    pub repository: serde_json::Value,
    pub packages: serde_json::Value,
    pub remotes: serde_json::Value,
    pub status: String,
    pub is_latest: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl IndexedRecord {
    /// Build a store row from a latest-version entry and its embedding (or
    /// `None` for excluded records).
    pub fn from_entry(entry: &RegistryEntry, embedding: Option<Vec<f32>>) -> Self {
        Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            version: entry.version.clone(),
            repository: entry.repository.clone(),
            packages: entry.packages.clone(),
            remotes: entry.remotes.clone(),
            status: entry.status.clone(),
            is_latest: true,
            embedding,
        }
    }
}

/// A search result: record fields plus the combined relevance score.
///
/// Ordering is by `score` descending, as produced by the store's ranking
/// capability; this type forwards the store's output unmodified.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    pub name: String,
    pub description: String,
    pub version: String,
    pub repository: serde_json::Value,
    pub packages: serde_json::Value,
    pub remotes: serde_json::Value,
    pub status: String,
    /// Combined full-text + semantic score (store-defined fusion).
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: serde_json::Value) -> RawServer {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_from_raw_full_item() {
        let item = raw(serde_json::json!({
            "server": {
                "name": "io.example/files",
                "description": "File system tools",
                "version": "1.2.0",
                "repository": {"url": "https://github.com/example/files"},
                "packages": [{"registry_type": "npm"}],
                "remotes": [{"type": "sse", "url": "https://example.com"}],
            },
            "_meta": {
                OFFICIAL_META_KEY: {"isLatest": true, "status": "active"}
            }
        }));

        let entry = RegistryEntry::from_raw(&item);
        assert_eq!(entry.name, "io.example/files");
        assert_eq!(entry.version, "1.2.0");
        assert_eq!(entry.status, "active");
        assert!(entry.is_latest);
        assert!(!entry.is_excluded());
        assert_eq!(entry.search_text(), "io.example/files File system tools");
    }

    #[test]
    fn test_from_raw_defaults() {
        let entry = RegistryEntry::from_raw(&raw(serde_json::json!({})));
        assert_eq!(entry.name, "");
        assert_eq!(entry.description, "");
        assert_eq!(entry.version, "");
        assert_eq!(entry.repository, serde_json::json!({}));
        assert_eq!(entry.packages, serde_json::json!([]));
        assert_eq!(entry.remotes, serde_json::json!([]));
        assert_eq!(entry.status, "unknown");
        assert!(!entry.is_latest);
    }

    #[test]
    fn test_from_raw_ignores_other_meta_namespaces() {
        let item = raw(serde_json::json!({
            "server": {"name": "x"},
            "_meta": {"some.other/namespace": {"isLatest": true, "status": "active"}}
        }));
        let entry = RegistryEntry::from_raw(&item);
        assert!(!entry.is_latest);
        assert_eq!(entry.status, "unknown");
    }

    #[test]
    fn test_excluded_status_case_insensitive() {
        let item = raw(serde_json::json!({
            "server": {"name": "x"},
            "_meta": {OFFICIAL_META_KEY: {"isLatest": true, "status": "Deleted"}}
        }));
        assert!(RegistryEntry::from_raw(&item).is_excluded());
    }

    #[test]
    fn test_indexed_record_forces_is_latest() {
        let item = raw(serde_json::json!({
            "server": {"name": "x"},
            "_meta": {OFFICIAL_META_KEY: {"isLatest": true, "status": "active"}}
        }));
        let entry = RegistryEntry::from_raw(&item);
        let record = IndexedRecord::from_entry(&entry, Some(vec![0.1, 0.2]));
        assert!(record.is_latest);
        assert_eq!(record.embedding.as_deref(), Some(&[0.1f32, 0.2][..]));
    }
}
