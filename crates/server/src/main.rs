// crates/server/src/main.rs
//! cui server binary.
//!
//! Opens the session store, starts the HTTP server immediately, and runs
//! the history indexer in the background — the first list request is
//! served from whatever the store already holds while the scan catches
//! up.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cui_db::Database;
use cui_server::{create_app, AppState, HistoryIndexer, StreamBroadcaster};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cui", version, about = "Session history server for AI-assistant chat archives")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "CUI_PORT", default_value_t = 3001)]
    port: u16,

    /// Interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Config directory holding session-info.db. The literal `:memory:`
    /// selects a non-persistent store. Defaults to ~/.cui.
    #[arg(long)]
    config_dir: Option<String>,

    /// Session archive root. Defaults to ~/.claude/projects.
    #[arg(long)]
    projects_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let db = match &args.config_dir {
        Some(dir) => Database::open_config_dir(dir).await?,
        None => Database::open_default().await?,
    };

    let projects_dir = args
        .projects_dir
        .or_else(cui_core::paths::projects_dir)
        .context("could not determine projects directory")?;

    let broadcaster = StreamBroadcaster::new();
    let indexer = HistoryIndexer::new(db.clone(), broadcaster.clone(), projects_dir.clone());
    indexer.start();

    let state = AppState::new(db, broadcaster, projects_dir);
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("cui listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    indexer.stop();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {}", e);
    }
}
