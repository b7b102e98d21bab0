//! SyncJam Server - standalone server for the synchronized listening room.
//!
//! Wires together the core crate's coordinator, session registry, and API
//! layer into a single long-running process. There is no desktop
//! counterpart - this is the only entry point SyncJam has.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use syncjam_core::{
    start_server, AppState, BroadcastEventEmitter, FileSnapshotStore, HttpCatalogResolver,
    InMemorySnapshotStore, ProdCoordinator, RoomState, SessionRegistry, SnapshotStore, SystemClock,
    TokioSpawner, UnconfiguredResolver,
};

use crate::config::ServerConfig;

/// How often the running room state is persisted to the snapshot store.
/// Best-effort: a missed tick just means the next restart resumes from a
/// slightly staler position, never a hard failure.
const SNAPSHOT_PERSIST_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

/// SyncJam Server - server-authoritative synchronized listening room.
#[derive(Parser, Debug)]
#[command(name = "syncjam-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SYNCJAM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "SYNCJAM_BIND_PORT")]
    port: Option<u16>,

    /// Bind host/interface (overrides config file).
    #[arg(short = 'H', long, env = "SYNCJAM_BIND_HOST")]
    host: Option<String>,

    /// Base URL of the track catalog used to resolve playable audio URLs.
    #[arg(short = 'u', long, env = "SYNCJAM_CATALOG_BASE_URL")]
    catalog_base_url: Option<String>,

    /// Directory to persist room snapshots in. Snapshots are memory-only
    /// for the process if unset.
    #[arg(short = 'd', long, env = "SYNCJAM_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("SyncJam Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(host) = args.host {
        config.bind_host = host;
    }
    if let Some(catalog_base_url) = args.catalog_base_url {
        config.catalog_base_url = Some(catalog_base_url);
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    let addr = config.bind_addr()?;
    log::info!(
        "Configuration: bind_addr={}, broadcast_capacity={}, snapshot_ttl_hours={}",
        addr,
        config.broadcast_capacity,
        config.snapshot_ttl_hours
    );

    let (emitter, _rx) = BroadcastEventEmitter::new(config.broadcast_capacity);
    let emitter = Arc::new(emitter);

    let snapshot_store: Arc<dyn SnapshotStore> = match &config.data_dir {
        Some(dir) => {
            log::info!("Persisting room snapshots under {}", dir.display());
            Arc::new(FileSnapshotStore::with_ttl(dir.clone(), config.snapshot_ttl()))
        }
        None => {
            log::info!("No data directory configured, snapshots are memory-only for this process");
            Arc::new(InMemorySnapshotStore::with_ttl(config.snapshot_ttl()))
        }
    };

    // "may be hydrated from an external snapshot at startup if non-empty"
    let coordinator = match snapshot_store.get().await {
        Some(snapshot) => {
            log::info!(
                "Hydrating room from snapshot: {} tracks, index {}",
                snapshot.queue.len(),
                snapshot.current_index
            );
            ProdCoordinator::from_room_state(
                Arc::new(SystemClock),
                Arc::new(TokioSpawner::current()),
                Arc::clone(&emitter),
                Arc::new(SessionRegistry::new()),
                RoomState::from_snapshot(snapshot),
            )
        }
        None => ProdCoordinator::new(
            Arc::new(SystemClock),
            Arc::new(TokioSpawner::current()),
            Arc::clone(&emitter),
            Arc::new(SessionRegistry::new()),
        ),
    };

    let resolver: Arc<dyn syncjam_core::AudioUrlResolver> = match &config.catalog_base_url {
        Some(base_url) => {
            log::info!("Resolving tracks against catalog at {}", base_url);
            Arc::new(HttpCatalogResolver::new(base_url.clone()))
        }
        None => {
            log::warn!("No catalog base URL configured, streaming will be unavailable");
            Arc::new(UnconfiguredResolver)
        }
    };

    let snapshot_task = tokio::spawn(persist_snapshot_periodically(
        Arc::clone(&coordinator),
        Arc::clone(&snapshot_store),
    ));

    let app_state = AppState::builder()
        .coordinator(Arc::clone(&coordinator))
        .emitter(Arc::clone(&emitter))
        .resolver(resolver)
        .snapshot_store(snapshot_store)
        .build();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, addr).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP/WebSocket server started on {}", addr);

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    server_handle.abort();
    snapshot_task.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Periodically writes the room's current state to `snapshot_store`, best
/// effort. Runs for the lifetime of the process; the caller aborts it on
/// shutdown.
async fn persist_snapshot_periodically(
    coordinator: Arc<ProdCoordinator>,
    snapshot_store: Arc<dyn SnapshotStore>,
) {
    let mut interval = tokio::time::interval(SNAPSHOT_PERSIST_INTERVAL);
    loop {
        interval.tick().await;
        let snapshot = coordinator.persist_snapshot().await;
        snapshot_store.set(snapshot).await;
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
