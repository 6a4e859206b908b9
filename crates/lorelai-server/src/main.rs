use anyhow::Context;
use clap::Parser;
use lorelai_core::config::LorelaiConfig;
use lorelai_core::storage::Store;
use lorelai_server::{router, AppState};
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "lorelai-server",
    version,
    about = "Integration panels and indexing history API for Lorelai"
)]
struct Args {
    /// YAML config file (default: $LORELAI_CONFIG, then ./lorelai.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8080 (overrides config and LORELAI_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// SQLite database path (overrides config and LORELAI_DB)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = LorelaiConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(db) = args.db {
        config.database_path = db;
    }

    let level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    lorelai_core::logging::init(&level, config.log_format);

    let store = Store::open(&config.database_path)?;
    let report = store.init_schema()?;
    tracing::info!(
        event = "schema_ready",
        db = %config.database_path.display(),
        applied = report.applied.len()
    );
    if config.api_key.is_none() {
        tracing::warn!("no API key configured; requests are trusted on the user header alone");
    }

    let state = AppState::from_config(store, &config);
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!(
        event = "listening",
        addr = %listener.local_addr()?,
        environment = %config.environment
    );

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
