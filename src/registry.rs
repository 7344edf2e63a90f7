//! Remote registry client and latest-version selection.
//!
//! [`RegistryClient::fetch_all`] pulls the full server catalog page by page
//! using the registry's opaque continuation cursor, then
//! [`select_latest`] reduces the raw items to one entry per logical name.
//!
//! The fetch is all-or-nothing: any non-success response aborts the run and
//! already-fetched pages are discarded. There is no cursor checkpointing —
//! a rerun starts from the first page.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::models::{RawServer, RegistryEntry};

/// One page of the catalog listing.
#[derive(Debug, Deserialize)]
struct ServersPage {
    #[serde(default)]
    servers: Vec<RawServer>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Extract the continuation cursor from a page's metadata blob.
///
/// The registry has shipped both `next_cursor` and `nextCursor`; accept
/// either. A cursor field that is present but not a string (or empty) is
/// treated as absent, which terminates pagination.
fn next_cursor(metadata: &serde_json::Value) -> Option<String> {
    ["next_cursor", "nextCursor"]
        .iter()
        .filter_map(|key| metadata.get(key))
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .find(|s| !s.is_empty())
}

/// HTTP client for the remote registry catalog API.
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    page_limit: u32,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build registry HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_limit: config.page_limit,
        })
    }

    /// Fetch the entire catalog, following cursors until exhaustion.
    ///
    /// Returns raw items in page order. Any non-success status or transport
    /// error aborts the whole fetch.
    pub async fn fetch_all(&self) -> Result<Vec<RawServer>> {
        let mut servers = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = format!("{}/v0/servers?limit={}", self.base_url, self.page_limit);
            if let Some(c) = &cursor {
                url.push_str("&cursor=");
                url.push_str(&urlencode(c));
            }

            debug!(cursor = cursor.as_deref().unwrap_or("initial"), "fetching servers page");

            let page: ServersPage = self
                .http
                .get(&url)
                .send()
                .await
                .context("Registry request failed")?
                .error_for_status()
                .context("Registry returned an error status")?
                .json()
                .await
                .context("Failed to decode registry response")?;

            let batch = page.servers.len();
            servers.extend(page.servers);
            cursor = next_cursor(&page.metadata);

            debug!(batch, total = servers.len(), "fetched servers page");

            if cursor.is_none() {
                break;
            }
        }

        Ok(servers)
    }
}

/// Percent-encode a cursor for use as a query parameter value.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Reduce raw catalog items to the latest version of each logical server.
///
/// Pure function. Items without the official latest flag are dropped; all
/// statuses (including `deleted`) are retained so that status flips are
/// captured by the next sync. Status-based filtering happens later, at
/// embedding and ranking time.
pub fn select_latest(raw: &[RawServer]) -> Vec<RegistryEntry> {
    raw.iter()
        .map(RegistryEntry::from_raw)
        .filter(|entry| entry.is_latest)
        .collect()
}
