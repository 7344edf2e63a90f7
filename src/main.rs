//! # Registry Search CLI (`regsearch`)
//!
//! The `regsearch` binary drives the registry mirror: database
//! initialization, pipeline runs, ad hoc queries, and the HTTP API server.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `regsearch init` | Create the SQLite database and run schema migrations |
//! | `regsearch etl` | Run the synchronization pipeline once |
//! | `regsearch search "<query>"` | Hybrid search from the command line |
//! | `regsearch servers` | List the indexed catalog |
//! | `regsearch serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! regsearch init --config ./config/regsearch.toml
//!
//! # Sync a handful of servers while testing
//! regsearch etl --limit 20
//!
//! # Weighted search
//! regsearch search "file system tools" --semantic-weight 2.0
//!
//! # Serve the API (reads OPENAI_API_KEY and CRON_SECRET from the environment)
//! regsearch serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use registry_search::config::{self, Config, Secrets};
use registry_search::embedding::{Embedder, OpenAiEmbedder};
use registry_search::registry::RegistryClient;
use registry_search::search::HybridSearch;
use registry_search::server::{run_server, AppState};
use registry_search::store::sqlite::SqliteStore;
use registry_search::store::RegistryStore;
use registry_search::{db, etl, migrate};

/// Registry Search — a searchable mirror of the MCP server registry.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; credentials come from the environment (`OPENAI_API_KEY`,
/// optionally `CRON_SECRET`).
#[derive(Parser)]
#[command(
    name = "regsearch",
    about = "Registry Search — hybrid full-text + semantic search over the MCP server registry",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/regsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the servers table, and the FTS5
    /// index. Idempotent — running it multiple times is safe.
    Init,

    /// Run the synchronization pipeline once.
    ///
    /// Fetches the full catalog, selects latest versions, embeds
    /// non-deleted entries, and upserts everything into the store.
    Etl {
        /// Only process the first N latest servers (test mode).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search the indexed catalog.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (1-100).
        #[arg(long, default_value_t = 10)]
        limit: i64,

        /// Weight for full-text relevance (0-10).
        #[arg(long, default_value_t = 1.0)]
        full_text_weight: f64,

        /// Weight for semantic similarity (0-10).
        #[arg(long, default_value_t = 1.0)]
        semantic_weight: f64,
    },

    /// List the indexed catalog, ordered by name.
    Servers {
        /// Maximum number of rows (1-1000).
        #[arg(long, default_value_t = 100)]
        limit: i64,

        /// Number of rows to skip.
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Start the HTTP API server.
    Serve,
}

fn build_embedder(config: &Config, secrets: &Secrets) -> Result<Arc<dyn Embedder>> {
    match config.embedding.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(&config.embedding, secrets)?)),
        "disabled" => bail!("Embedding provider is disabled; set [embedding] provider = \"openai\""),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn RegistryStore>> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "registry_search=info,regsearch=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;
    let secrets = Secrets::from_env();

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized at {}", config.db.path.display());
        }

        Commands::Etl { limit } => {
            let store = open_store(&config).await?;
            let embedder = build_embedder(&config, &secrets)?;
            let client = RegistryClient::new(&config.registry)?;

            let report = etl::run(&client, embedder.as_ref(), store.as_ref(), limit).await?;
            println!(
                "ok: fetched {}, latest {}, embedded {}, upserted {}",
                report.fetched, report.latest, report.embedded, report.upserted
            );
        }

        Commands::Search {
            query,
            limit,
            full_text_weight,
            semantic_weight,
        } => {
            let store = open_store(&config).await?;
            let embedder = build_embedder(&config, &secrets)?;
            let engine = HybridSearch::new(store, embedder);

            let results = engine
                .search(&query, limit, full_text_weight, semantic_weight)
                .await?;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }

            for (i, result) in results.iter().enumerate() {
                println!("{}. [{:.4}] {}", i + 1, result.score, result.name);
                println!("    version: {} ({})", result.version, result.status);
                println!("    {}", result.description.replace('\n', " "));
                println!();
            }
        }

        Commands::Servers { limit, offset } => {
            let store = open_store(&config).await?;
            let embedder = build_embedder(&config, &secrets)?;
            let engine = HybridSearch::new(store, embedder);

            let servers = engine.list(limit, offset).await?;
            let total = engine.count().await?;

            for server in &servers {
                let embedded = if server.embedding.is_some() { "embedded" } else { "no embedding" };
                println!(
                    "{}  {}  {}  ({})",
                    server.name, server.version, server.status, embedded
                );
            }
            println!("{} of {} servers", servers.len(), total);
        }

        Commands::Serve => {
            let store = open_store(&config).await?;
            let embedder = build_embedder(&config, &secrets)?;
            let engine = Arc::new(HybridSearch::new(store.clone(), embedder.clone()));
            let client = Arc::new(RegistryClient::new(&config.registry)?);

            let state = AppState::new(engine, client, embedder, store, &secrets);
            run_server(&config.server.bind, state).await?;
        }
    }

    Ok(())
}
