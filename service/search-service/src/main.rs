use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use record_store::SqliteStore;
use search_service::http::{self, AppState};
use search_service::{IndexRegistry, ServiceConfig};

#[derive(Debug, Parser)]
#[command(name = "search-service", about = "Hybrid table search service")]
struct Args {
    /// Path to the TOML config; built-in sample config when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let schemas = config
        .schema_registry()
        .context("validating table schemas")?;
    let embedder = config.embedder.build().context("initializing embedder")?;

    // Startup-only store connection: FTS mirrors and index builds. The
    // request path opens its own connection per request.
    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening store at {}", config.database_path.display()))?;
    for schema in schemas.iter() {
        // The store is external; a table that is not provisioned yet only
        // degrades that table's retrieval.
        if let Err(err) = store.ensure_fts(&schema.name, &schema.text_columns) {
            warn!(table = %schema.name, %err, "could not prepare full-text mirror");
        }
    }

    let registry = Arc::new(IndexRegistry::new(
        schemas,
        config.indexes_dir.clone(),
        embedder,
    ));
    registry
        .initialize(&store)
        .context("building vector indexes")?;
    drop(store);

    let state = AppState {
        registry,
        database_path: Arc::new(config.database_path.clone()),
    };
    http::serve(
        state,
        &config.listen,
        Duration::from_secs(config.request_timeout_secs),
    )
    .await
    .context("serving HTTP")?;
    Ok(())
}
