use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use attestation_server::{
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{Config, StorageConfig, read_config_file},
    relay::{JanitorHandle, RelayDispatcher, SessionRegistry},
    storage::{MemoryBackend, StorageBackend},
};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (TOML, or JSON with a `.json` extension)
    #[arg(short)]
    file: Option<PathBuf>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("attestation_server", LevelFilter::DEBUG),
        ("attestation_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, records are lost on restart");
            Ok(Arc::new(MemoryBackend::new()))
        }

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = attestation_server::storage::sqlite::SqliteBackend::new(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            Ok(Arc::new(backend))
        }

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { path } => {
            warn!(
                "built without SQLite support, ignoring {} and using in-memory storage",
                path.display()
            );
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };
    config.apply_env_overrides();

    let storage = open_storage(&config.storage).await?;

    let registry = Arc::new(SessionRegistry::new(config.relay.window_policy()));
    let dispatcher = Arc::new(RelayDispatcher::new(
        registry.clone(),
        config.relay.broadcast_capacity,
    ));
    let janitor = JanitorHandle::spawn(
        registry,
        dispatcher.clock(),
        config.relay.session_grace(),
        config.relay.janitor_interval(),
    );

    let api_config = ApiConfig {
        bind_addr: config.server.bind_addr(),
        cors_origins: config.server.cors_origins.clone(),
    };
    let addr = spawn_api_server(api_config, ApiState::new(storage.clone(), dispatcher))
        .await
        .context("failed to start API server")?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    if let Err(e) = janitor.shutdown().await {
        warn!("janitor shutdown failed: {e:#}");
    }
    storage.close().await?;

    Ok(())
}
