//! HTTP/WebSocket API layer.
//!
//! Thin handlers that delegate to [`PlaybackCoordinator`]. This module
//! provides the router construction and server startup functionality:
//! `AppState`/`AppStateBuilder`, `ServerError`, `start_server`.

use std::sync::Arc;

use thiserror::Error;

use crate::events::BroadcastEventEmitter;
use crate::resolver::AudioUrlResolver;
use crate::snapshot::SnapshotStore;
use crate::ProdCoordinator;

pub mod http;
pub mod ws;

/// Errors that can occur when starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the configured TCP port.
    #[error("failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// A thin wrapper holding references to the coordinator and its external
/// collaborators. All business logic lives in [`ProdCoordinator`] itself.
#[derive(Clone)]
pub struct AppState {
    /// The room's playback coordinator.
    pub coordinator: Arc<ProdCoordinator>,
    /// Broadcast event source, subscribed once per websocket connection.
    pub emitter: Arc<BroadcastEventEmitter>,
    /// Resolves catalog track ids to playable audio URLs.
    pub resolver: Arc<dyn AudioUrlResolver>,
    /// Best-effort room-state persistence.
    pub snapshot_store: Arc<dyn SnapshotStore>,
}

/// Builder for constructing an [`AppState`].
#[derive(Default)]
pub struct AppStateBuilder {
    coordinator: Option<Arc<ProdCoordinator>>,
    emitter: Option<Arc<BroadcastEventEmitter>>,
    resolver: Option<Arc<dyn AudioUrlResolver>>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the playback coordinator.
    #[must_use]
    pub fn coordinator(mut self, coordinator: Arc<ProdCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Sets the broadcast event emitter.
    #[must_use]
    pub fn emitter(mut self, emitter: Arc<BroadcastEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Sets the audio URL resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn AudioUrlResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets the snapshot store.
    #[must_use]
    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    /// Builds the `AppState`, panicking if a required field is missing.
    #[must_use]
    pub fn build(self) -> AppState {
        AppState {
            coordinator: self.coordinator.expect("coordinator is required"),
            emitter: self.emitter.expect("emitter is required"),
            resolver: self.resolver.expect("resolver is required"),
            snapshot_store: self.snapshot_store.expect("snapshot_store is required"),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Starts the HTTP/WebSocket server, binding to `addr`.
pub async fn start_server(state: AppState, addr: std::net::SocketAddr) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("SyncJam server listening on http://{}", addr);
    let app = http::create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::resolver::test_support::StaticResolver;
    use crate::runtime::TokioSpawner;
    use crate::session::SessionRegistry;
    use crate::snapshot::InMemorySnapshotStore;

    #[tokio::test]
    async fn builder_assembles_all_fields() {
        let (emitter, _rx) = BroadcastEventEmitter::new(16);
        let emitter = Arc::new(emitter);
        let coordinator = ProdCoordinator::new(
            Arc::new(SystemClock),
            Arc::new(TokioSpawner::current()),
            Arc::clone(&emitter),
            Arc::new(SessionRegistry::new()),
        );

        let state = AppState::builder()
        .coordinator(coordinator)
        .emitter(emitter)
        .resolver(Arc::new(StaticResolver::new()))
        .snapshot_store(Arc::new(InMemorySnapshotStore::new()))
        .build();

        assert_eq!(state.coordinator.session_count(), 0);
    }

    #[test]
    fn builder_panics_without_required_fields() {
        let result = std::panic::catch_unwind(|| AppState::builder().build());
        assert!(result.is_err());
    }
}
