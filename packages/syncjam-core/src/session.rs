//! Session registry.
//!
//! Tracks connected clients: measured latency and epoch-scoped readiness.
//! Uses a `DashMap` for fine-grained concurrent access per session.

use dashmap::DashMap;

use crate::protocol::MAX_LATENCY_MS;

/// Stable identifier for a connected client.
pub type SessionId = String;

/// One per connected client.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub session_id: SessionId,
    /// Last-observed one-way latency, in milliseconds. `None` until the
    /// first valid `ping`/`pong` round-trip.
    pub latency_ms: Option<u64>,
    /// Wall-clock ms of the last accepted ping.
    pub last_ping_at: Option<u64>,
    /// Whether this session has signaled `readyToPlay` for the current epoch.
    pub ready: bool,
}

impl ClientSession {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            latency_ms: None,
            last_ping_at: None,
            ready: false,
        }
    }
}

/// The set of currently-connected clients.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, ClientSession>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session, idempotently. Returns a copy of the session.
    pub fn attach(&self, session_id: SessionId) -> ClientSession {
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| ClientSession::new(session_id))
            .clone()
    }

    /// Removes a session on disconnect. Releases its `ready` bit without
    /// touching room `mode`.
    pub fn detach(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Records a latency measurement from a ping round-trip.
    ///
    /// `rtt_ms` is the full round-trip time observed by the server
    /// (`now_server - client_ts`); `latency_ms = rtt_ms / 2` (§4.2).
    /// Rejects (drops, does not clamp — I5) negative RTTs (clock skew) and
    /// latencies exceeding [`MAX_LATENCY_MS`].
    ///
    /// Returns the accepted latency, or `None` if the measurement was
    /// rejected.
    pub fn record_latency(&self, session_id: &str, rtt_ms: i64, now: u64) -> Option<u64> {
        if rtt_ms < 0 {
            return None;
        }
        let latency_ms = (rtt_ms as u64) / 2;
        if latency_ms > MAX_LATENCY_MS {
            return None;
        }

        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.latency_ms = Some(latency_ms);
            session.last_ping_at = Some(now);
        }
        Some(latency_ms)
    }

    /// Marks a session ready for the current epoch.
    ///
    /// Returns `false` if the session is not attached (disconnected
    /// mid-flight — caller should treat this as a no-op, not an error).
    pub fn mark_ready(&self, session_id: &str) -> bool {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.ready = true;
            true
        } else {
            false
        }
    }

    /// Resets `ready = false` for every currently-attached session (I4).
    pub fn reset_ready_all(&self) {
        for mut entry in self.sessions.iter_mut() {
            entry.ready = false;
        }
    }

    /// Returns `(ready_count, total_count)` for the current epoch.
    #[must_use]
    pub fn snapshot_ready(&self) -> (usize, usize) {
        let total = self.sessions.len();
        let ready = self.sessions.iter().filter(|s| s.ready).count();
        (ready, total)
    }

    /// Whether every currently-connected session is ready.
    ///
    /// An empty room is vacuously "all ready" — the ready-timeout still
    /// bounds a genuinely empty Preparing epoch, but convergence should
    /// not wait forever for sessions that don't exist.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.sessions.iter().all(|s| s.ready)
    }

    /// Number of currently-connected sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry has no connected sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
