//! WebSocket handler for real-time client communication.
//!
//! One connection = one session. The handler loops on `tokio::select!` over
//! incoming client messages and the room's broadcast channel, translating
//! between the wire protocol and [`PlaybackCoordinator`] commands. There is
//! no per-connection force-close registry — the admin surface only ever
//! needs to broadcast `forceReload`, never to sever a socket directly, so
//! that bookkeeping would have no caller (see `DESIGN.md`).

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use uuid::Uuid;

use crate::api::AppState;
use crate::protocol::{ClientMessage, ServerMessage};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn to_message(event: &ServerMessage) -> Option<Message> {
    serde_json::to_string(event).ok().map(|s| Message::Text(s.into()))
}

/// Main per-connection loop: one session attached to the coordinator for
/// the lifetime of the socket.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let session_id = Uuid::new_v4().to_string();
    let mut broadcast_rx = state.emitter.subscribe();

    let initial = state.coordinator.attach_session(session_id.clone()).await;
    if let Some(msg) = to_message(&ServerMessage::RoomState(initial)) {
        if sender.send(msg).await.is_err() {
            log::warn!("[ws] failed to send initial roomState, client disconnected");
            state.coordinator.detach_session(&session_id).await;
            return;
        }
    }

    log::info!("[ws] session attached: {}", session_id);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_incoming(&state, &session_id, &mut sender, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            event = broadcast_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(msg) = to_message(&event) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("[ws] session {} lagged by {} events", session_id, n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    state.coordinator.detach_session(&session_id).await;
    log::info!("[ws] session detached: {}", session_id);
}

/// Parses and dispatches one client message (, §7 "malformed or
/// out-of-range client messages are logged and ignored").
async fn handle_incoming(
    state: &AppState,
    session_id: &str,
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    text: &str,
) {
    let parsed = match serde_json::from_str::<ClientMessage>(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("[ws] malformed message from {}: {}", session_id, e);
            return;
        }
    };

    match parsed {
        ClientMessage::Ping { client_ts } => {
            if let Some(pong) = state.coordinator.ping(session_id, client_ts) {
                if let Some(msg) = to_message(&pong) {
                    let _ = sender.send(msg).await;
                }
            }
        }
        ClientMessage::Play => {
            if let Err(reason) = state.coordinator.play().await {
                log::debug!("[ws] play rejected for {}: {:?}", session_id, reason);
            }
        }
        ClientMessage::Pause => {
            if let Err(reason) = state.coordinator.pause().await {
                log::debug!("[ws] pause rejected for {}: {:?}", session_id, reason);
            }
        }
        ClientMessage::Skip => state.coordinator.skip().await,
        ClientMessage::Previous => state.coordinator.previous().await,
        ClientMessage::JumpTo { index } => state.coordinator.jump_to(index).await,
        ClientMessage::Seek { seconds } => state.coordinator.seek(seconds).await,
        ClientMessage::AddToQueue { track } => state.coordinator.add_to_queue(track).await,
        ClientMessage::RemoveFromQueue { index } => {
            state.coordinator.remove_from_queue(index).await
        }
        ClientMessage::ReorderQueue {
            queue,
            current_track_index,
        } => {
            state
            .coordinator
            .reorder_queue(queue, current_track_index)
            .await
        }
        ClientMessage::ReadyToPlay { epoch } => {
            state.coordinator.ready_to_play(session_id, epoch).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_json_shape_does_not_panic_to_parse() {
        let err = serde_json::from_str::<ClientMessage>("{\"type\":\"bogus\"}").unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn ping_round_trips_through_to_message() {
        let msg = ServerMessage::Pong {
            client_timestamp: 1,
            server_timestamp: 2,
            latency: 3,
        };
        let encoded = to_message(&msg).expect("should encode");
        assert!(matches!(encoded, Message::Text(_)));
    }
}
