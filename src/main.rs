//! # Asset Finder CLI (`asset-finder`)
//!
//! Commands for database setup, document ingestion, querying the asset
//! catalog, and starting the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! asset-finder --config ./config/asset-finder.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `asset-finder init` | Create the database, run migrations, repair legacy columns |
//! | `asset-finder repair-schema` | Convert legacy filter columns to TEXT |
//! | `asset-finder ingest <file>` | Extract assets from one JSON document |
//! | `asset-finder options` | Show filter options |
//! | `asset-finder search` | Search the catalog |
//! | `asset-finder get <id>` | Show one asset occurrence |
//! | `asset-finder count <raw-data-id>` | Occurrence count for one document |
//! | `asset-finder serve` | Start the HTTP API |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `asset_finder=info`).

use asset_finder::config;
use asset_finder::ingest;
use asset_finder::migrate;
use asset_finder::models::RequestMetadata;
use asset_finder::options;
use asset_finder::search::{self, SearchRequest};
use asset_finder::server;
use asset_finder::{get, stats};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Asset Finder: image and icon metadata extraction with a searchable,
/// versioned catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/asset-finder.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "asset-finder",
    about = "Asset Finder: extract, reconcile, and search image/icon metadata from JSON documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/asset-finder.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Business context filters shared by `ingest` and `search`.
#[derive(Args, Debug, Default)]
struct ContextArgs {
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    environment: Option<String>,
    #[arg(long)]
    project: Option<String>,
    #[arg(long)]
    site: Option<String>,
    #[arg(long)]
    geo: Option<String>,
    #[arg(long)]
    locale: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all tables, collapses duplicate
    /// active region rows, and converts legacy filter columns to TEXT.
    /// Running it repeatedly is safe.
    Init,

    /// Convert legacy (non-TEXT) filter columns to TEXT.
    RepairSchema,

    /// Extract assets from one JSON document.
    ///
    /// Reprocessing the same `--source-uri`/`--source-version` replaces the
    /// previous occurrence set for that version.
    Ingest {
        /// Path to the JSON document.
        file: PathBuf,

        /// Identifier of the raw document in the ingestion pipeline.
        #[arg(long)]
        raw_data_id: String,

        /// Logical source URI of the document.
        #[arg(long)]
        source_uri: String,

        /// Document version; omit when unknown.
        #[arg(long)]
        source_version: Option<i64>,

        #[command(flatten)]
        context: ContextArgs,

        /// Print the extraction report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show filter options (tenants, sites, geos, locales).
    Options {
        #[arg(long)]
        json: bool,
    },

    /// Search the asset catalog.
    Search {
        #[command(flatten)]
        filters: ContextArgs,

        /// Zero-based page number.
        #[arg(long)]
        page: Option<i64>,

        /// Page size (capped by `[search] max_page_size`).
        #[arg(long)]
        size: Option<i64>,

        #[arg(long)]
        json: bool,
    },

    /// Show one asset occurrence with its catalog entry.
    Get {
        /// Occurrence ID.
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Count the occurrences stored for one raw document.
    Count {
        raw_data_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

impl From<ContextArgs> for RequestMetadata {
    fn from(args: ContextArgs) -> Self {
        RequestMetadata {
            tenant: args.tenant,
            environment: args.environment,
            project: args.project,
            site: args.site,
            geo: args.geo,
            locale: args.locale,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asset_finder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            let converted = repair(&cfg).await?;
            if !converted.is_empty() {
                println!("Converted filter columns: {}", converted.join(", "));
            }
            println!("Database initialized successfully.");
        }
        Commands::RepairSchema => {
            let converted = repair(&cfg).await?;
            if converted.is_empty() {
                println!("Filter columns already compatible.");
            } else {
                println!("Converted filter columns: {}", converted.join(", "));
            }
        }
        Commands::Ingest {
            file,
            raw_data_id,
            source_uri,
            source_version,
            context,
            json,
        } => {
            let source =
                ingest::source_document(&raw_data_id, &source_uri, source_version, context.into());
            ingest::run_ingest(&cfg, &file, source, json).await?;
        }
        Commands::Options { json } => {
            options::run_options(&cfg, json).await?;
        }
        Commands::Search {
            filters,
            page,
            size,
            json,
        } => {
            let request = SearchRequest {
                tenant: filters.tenant,
                environment: filters.environment,
                project: filters.project,
                site: filters.site,
                geo: filters.geo,
                locale: filters.locale,
                page,
                size,
            };
            search::run_search(&cfg, request, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Count { raw_data_id, json } => {
            stats::run_count(&cfg, &raw_data_id, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn repair(cfg: &config::Config) -> anyhow::Result<Vec<String>> {
    let pool = asset_finder::db::connect(cfg).await?;
    let converted = migrate::repair_filter_columns(&pool).await;
    pool.close().await;
    converted
}
