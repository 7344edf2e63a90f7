//! # Registry Search
//!
//! A searchable mirror of the MCP server registry.
//!
//! The ETL pipeline periodically pulls the full registry catalog, keeps only
//! the latest version of each server, embeds the entries via a remote
//! embedding service, and upserts everything into a SQLite store indexed for
//! both full-text (FTS5) and vector similarity search. Clients query through
//! a hybrid ranking that fuses both signals with tunable weights.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌───────────┐
//! │ Registry │──▶│  Latest  │──▶│  Embed  │──▶│  SQLite   │
//! │  client  │   │ selector │   │ (batch) │   │ FTS5+Vec  │
//! └──────────┘   └──────────┘   └─────────┘   └─────┬─────┘
//!                                                   │
//!                                    ┌──────────────┤
//!                                    ▼              ▼
//!                               ┌─────────┐    ┌─────────┐
//!                               │   CLI   │    │  HTTP   │
//!                               │(regsearch)   │  (API)  │
//!                               └─────────┘    └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! regsearch init                # create database
//! regsearch etl                 # sync the registry mirror
//! regsearch search "file system tools"
//! regsearch serve               # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration + env-provided secrets |
//! | [`models`] | Core data types |
//! | [`registry`] | Paginated catalog client + latest-version selection |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Storage contract, SQLite and in-memory backends |
//! | [`etl`] | Synchronization pipeline |
//! | [`search`] | Hybrid search engine |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod etl;
pub mod migrate;
pub mod models;
pub mod registry;
pub mod search;
pub mod server;
pub mod store;
