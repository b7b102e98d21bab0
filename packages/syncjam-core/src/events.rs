//! Event emission: decouples the coordinator from the transport layer.
//!
//! Services call a trait object instead of touching a websocket broadcast
//! channel directly, so the coordinator can be unit-tested without
//! standing up any networking.

use tokio::sync::broadcast;

use crate::protocol::ServerMessage;

/// Receives [`ServerMessage`] values produced by the coordinator.
///
/// Implementations must not block: the coordinator calls `emit` from its
/// single-threaded command loop, so a slow emitter stalls every client.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, message: ServerMessage);
}

/// Discards every event. Useful in unit tests that only check `RoomState`.
#[derive(Debug, Default)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _message: ServerMessage) {}
}

/// Logs every event at debug level, then drops it. Useful for diagnosing a
/// running server without a broadcast subscriber attached.
#[derive(Debug, Default)]
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, message: ServerMessage) {
        tracing::debug!(?message, "syncjam_event");
    }
}

/// Fans events out to every connected websocket via a broadcast channel.
///
/// Lagging receivers (a client whose socket write is stalled) drop old
/// messages rather than back-pressuring the coordinator — this is the
/// intended behavior of [`tokio::sync::broadcast`] and gives each client
/// isolated backpressure: one slow client cannot stall the room.
pub struct BroadcastEventEmitter {
    sender: broadcast::Sender<ServerMessage>,
}

impl BroadcastEventEmitter {
    /// Creates a new emitter with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<ServerMessage>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Subscribes a new receiver (one per connected websocket).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.sender.subscribe()
    }
}

impl EventEmitter for BroadcastEventEmitter {
    fn emit(&self, message: ServerMessage) {
        // No receivers is a normal idle-room state, not an error.
        let _ = self.sender.send(message);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every emitted event for assertion in coordinator tests.
    #[derive(Default, Clone)]
    pub struct RecordingEventEmitter {
        pub events: Arc<Mutex<Vec<ServerMessage>>>,
    }

    impl EventEmitter for RecordingEventEmitter {
        fn emit(&self, message: ServerMessage) {
            self.events.lock().push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingEventEmitter;
    use super::*;

    #[test]
    fn broadcast_emitter_delivers_to_subscriber() {
        let (emitter, mut rx) = BroadcastEventEmitter::new(16);
        emitter.emit(ServerMessage::ForceReload);
        let received = rx.try_recv().unwrap();
        assert!(matches!(received, ServerMessage::ForceReload));
    }

    #[test]
    fn broadcast_emitter_tolerates_no_subscribers() {
        let (emitter, _rx) = BroadcastEventEmitter::new(16);
        drop(_rx);
        emitter.emit(ServerMessage::ForceReload);
    }

    #[test]
    fn recording_emitter_captures_events_in_order() {
        let emitter = RecordingEventEmitter::default();
        emitter.emit(ServerMessage::ForceReload);
        emitter.emit(ServerMessage::ForceReload);
        assert_eq!(emitter.events.lock().len(), 2);
    }
}
