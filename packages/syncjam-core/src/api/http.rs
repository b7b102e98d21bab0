//! HTTP route handlers: the admin surface and the stream proxy.
//!
//! All handlers are thin - they delegate to the coordinator or the
//! resolver for anything interesting.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::protocol::ServerMessage;

/// Creates the Axum router with all routes.
///
/// CORS is wide open (any origin, any method/header) since the room has no
/// authentication boundary to protect - any browser with the room
/// URL is a legitimate client. `TraceLayer` logs each request.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/health", get(health_check))
        .route("/admin/reload", post(force_reload))
        .route("/stream/{track_id}", get(proxy_stream))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// `GET /health`: room size, play mode, and snapshot-store health,
/// so an operator can see the room is alive without opening a websocket.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let payload = state.coordinator.snapshot().await;
    // The store contract treats "no snapshot yet" and "store unreachable"
    // identically, so there's nothing finer-grained to report than
    // whether the call itself completed.
    let _ = state.snapshot_store.get().await;

    Json(json!({
        "status": "ok",
        "roomSize": state.coordinator.session_count(),
        "mode": payload.mode,
    }))
}

/// `POST /admin/reload`: broadcasts `forceReload` to every
/// connected client. Clients decide locally what "reload" means.
async fn force_reload(State(state): State<AppState>) -> impl IntoResponse {
    // Routed through the emitter directly: this isn't a room-state mutation,
    // so it doesn't belong behind the coordinator's command guard.
    state.emitter.emit(ServerMessage::ForceReload);
    StatusCode::NO_CONTENT
}

/// `GET /stream/:track_id`: resolves the track's playable URL
/// via the injected [`crate::resolver::AudioUrlResolver`] and forwards the
/// byte-range response through, unbuffered.
///
/// The resolver and the upstream media host are both external, best-effort
/// collaborators: any failure here is a client-local streaming
/// error, never a [`crate::error::SyncJamError`] that would reach the room.
async fn proxy_stream(
    Path(track_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let resolved = match state.resolver.resolve(&track_id).await {
        Ok(resolved) => resolved,
        Err(e) => {
            log::warn!("[stream] resolve failed for {}: {}", track_id, e);
            return (StatusCode::BAD_GATEWAY, format!("resolve failed: {e}")).into_response();
        }
    };

    let client = reqwest::Client::new();
    let mut upstream_request = client.get(&resolved.url);
    if let Some(range) = headers.get(header::RANGE) {
        upstream_request = upstream_request.header(header::RANGE, range);
    }

    let upstream = match upstream_request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            log::warn!("[stream] upstream fetch failed for {}: {}", track_id, e);
            return (StatusCode::BAD_GATEWAY, format!("upstream fetch failed: {e}"))
                .into_response();
        }
    };

    let status = upstream.status();
    let content_length = upstream.content_length();
    let content_range = upstream.headers().get(header::CONTENT_RANGE).cloned();

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, resolved.content_type)
        .header(header::ACCEPT_RANGES, "bytes");

    if let Some(len) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }
    if let Some(range) = content_range {
        builder = builder.header(header::CONTENT_RANGE, range);
    }

    let body = axum::body::Body::from_stream(upstream.bytes_stream());
    match builder.body(body) {
        Ok(response) => response,
        Err(e) => {
            log::error!("[stream] failed to build response for {}: {}", track_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::events::BroadcastEventEmitter;
    use crate::resolver::test_support::StaticResolver;
    use crate::runtime::TokioSpawner;
    use crate::session::SessionRegistry;
    use crate::snapshot::InMemorySnapshotStore;
    use crate::ProdCoordinator;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let (emitter, _rx) = BroadcastEventEmitter::new(16);
        let emitter = Arc::new(emitter);
        let coordinator = ProdCoordinator::new(
            Arc::new(SystemClock),
            Arc::new(TokioSpawner::current()),
            Arc::clone(&emitter),
            Arc::new(SessionRegistry::new()),
        );
        AppState {
            coordinator,
            emitter,
            resolver: Arc::new(StaticResolver::new()),
            snapshot_store: Arc::new(InMemorySnapshotStore::new()),
        }
    }

    #[tokio::test]
    async fn health_check_reports_idle_empty_room() {
        let state = test_state();
        let response = health_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn force_reload_broadcasts_to_subscribers() {
        let state = test_state();
        let mut rx = state.emitter.subscribe();
        let response = force_reload(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let received = rx.try_recv().expect("should have broadcast forceReload");
        assert!(matches!(received, ServerMessage::ForceReload));
    }
}
