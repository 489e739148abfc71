//! Mural server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use mural_core::config::AppConfig;
use mural_engine::{FallbackGenerator, TileEngine};
use mural_server::{AppState, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mural - an infinitely zoomable collaborative tile map server
#[derive(Parser, Debug)]
#[command(name = "murald")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MURAL_CONFIG", default_value = "config/server.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("mural v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; the file is optional since every field has a
    // default and env vars can override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("no config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("MURAL_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize the blob store and verify it before accepting requests.
    let blobs = mural_storage::from_config(&config.storage)
        .await
        .context("failed to initialize blob storage")?;
    tracing::info!(backend = blobs.backend_name(), "blob storage initialized");

    // Initialize the metadata store.
    let store = mural_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    store
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("metadata store initialized");

    // Recover tiles orphaned mid-generation by a previous instance.
    recover_orphaned_tiles(store.as_ref()).await?;

    // The real model integration plugs in as a primary generator; the
    // deterministic stub keeps the pipeline producing output without one.
    let generator = Arc::new(FallbackGenerator::stub_only());

    let engine = TileEngine::new(store, blobs, generator, config.generation.clone());
    let state = AppState::new(config.clone(), engine);

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Settle tiles left Pending by a crashed or killed server.
///
/// A Pending record with no running job would refuse claims forever. A
/// tile that still carries content hashes was Ready before its
/// regeneration started, so it reverts to Ready; a fresh claim reverts
/// to Empty.
async fn recover_orphaned_tiles(store: &dyn mural_metadata::TileStore) -> Result<()> {
    use mural_metadata::{TilePatch, TileStatus};

    let orphaned = store
        .list_pending()
        .await
        .context("failed to query pending tiles")?;

    if orphaned.is_empty() {
        return Ok(());
    }

    tracing::warn!(
        count = orphaned.len(),
        "found tiles stuck pending from a previous instance, reverting"
    );

    for record in orphaned {
        let revert = if record.content_hash.is_some() {
            TilePatch::status(TileStatus::Ready)
        } else {
            TilePatch::empty()
        };
        store
            .update(record.coord, revert)
            .await
            .with_context(|| format!("failed to revert orphaned tile {}", record.coord))?;
        tracing::warn!(coord = %record.coord, "orphaned pending tile reverted");
    }

    Ok(())
}
