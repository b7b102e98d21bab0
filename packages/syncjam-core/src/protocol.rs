//! Wire protocol: constants and message types shared between the
//! coordinator and connected clients.
//!
//! These values are defined by the synchronized-playback design and should
//! not be changed casually — clients are written against them.

use serde::{Deserialize, Serialize};

use crate::queue::Track;

// ─────────────────────────────────────────────────────────────────────────────
// Protocol Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Period of the authoritative sync broadcast while playing (ms).
pub const SYNC_INTERVAL_MS: u64 = 100;

/// Maximum time spent in Preparing before starting regardless of readiness (ms).
pub const READY_TIMEOUT_MS: u64 = 10_000;

/// Minimum gap between accepted play/pause commands (ms).
pub const PLAY_PAUSE_COOLDOWN_MS: u64 = 300;

/// Delay between a navigation command and the next `preparePlayback` (ms).
pub const NAV_PREPARE_DELAY_MS: u64 = 500;

/// Soft drift-correction threshold under normal conditions (seconds).
pub const DRIFT_SOFT_NORMAL_S: f64 = 0.3;

/// Soft drift-correction threshold after repeated corrections (seconds).
pub const DRIFT_SOFT_DEGRADED_S: f64 = 0.5;

/// Drift magnitude above which a hard seek is used instead of rate correction (seconds).
pub const DRIFT_HARD_S: f64 = 1.0;

/// Normal cooldown between client-side drift corrections (ms).
pub const CLIENT_RESYNC_COOLDOWN_MS: u64 = 2_000;

/// Cooldown between corrections once the degraded window is triggered (ms).
pub const DEGRADED_COOLDOWN_MS: u64 = 5_000;

/// Consecutive corrections that trigger the degraded window.
pub const MAX_CONSECUTIVE_RESYNCS: u32 = 3;

/// Time without a correction before the degraded window clears (ms).
pub const DEGRADED_RESET_MS: u64 = 10_000;

/// Client ping cadence for latency measurement (ms).
pub const PING_INTERVAL_MS: u64 = 5_000;

/// Seconds of buffered-ahead media required before signaling ready.
pub const MIN_PREBUFFER_S: f64 = 3.0;

/// Buffering timeout while pre-buffering a track (ms).
pub const PREBUFFER_TIMEOUT_MS: u64 = 10_000;

/// Soft-correction playback rate applied when the server is ahead.
pub const SOFT_RATE_FAST: f64 = 1.10;

/// Soft-correction playback rate applied when the server is behind.
pub const SOFT_RATE_SLOW: f64 = 0.90;

/// Duration a soft-correction rate adjustment is held before returning to 1.0 (ms).
pub const SOFT_CORRECTION_DURATION_MS: u64 = 500;

/// Window after `synchronizedPlay` during which the client stays in transition (ms).
pub const SYNCHRONIZED_PLAY_TRANSITION_MS: u64 = 1_000;

/// Window after a `queueUpdate` that changes the current index during which
/// the client stays in transition (ms).
pub const QUEUE_UPDATE_TRANSITION_MS: u64 = 3_000;

/// Client-side UI cooldown for the play/pause button (ms). The server-side
/// cooldown ([`PLAY_PAUSE_COOLDOWN_MS`]) is the authoritative defense.
pub const UI_BUTTON_COOLDOWN_MS: u64 = 400;

/// Health-watchdog check interval (ms).
pub const WATCHDOG_CHECK_INTERVAL_MS: u64 = 2_000;

/// Window within which media currentTime must have advanced while playing (ms).
pub const WATCHDOG_STALL_WINDOW_MS: u64 = 3_000;

/// Valid latency range; measurements outside this are dropped, not clamped (I5).
pub const MAX_LATENCY_MS: u64 = 10_000;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of the queue + index, broadcast on connect and on queue changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queue: Vec<Track>,
    pub current_index: usize,
}

/// Client → server commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Client monotonic timestamp (ms), echoed back in `pong`.
    Ping { client_ts: i64 },
    Play,
    Pause,
    Skip,
    Previous,
    JumpTo { index: usize },
    Seek { seconds: f64 },
    AddToQueue { track: Track },
    RemoveFromQueue { index: usize },
    ReorderQueue {
        queue: Vec<Track>,
        current_track_index: usize,
    },
    ReadyToPlay { epoch: u64 },
}

/// Server → client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full state snapshot, sent once on connect.
    RoomState(RoomStatePayload),
    /// Full state snapshot, sent after any queue/index change.
    QueueUpdate(RoomStatePayload),
    PlayerUpdate {
        is_playing: bool,
        current_time: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_wall_ms: Option<u64>,
    },
    PreparePlayback {
        track_index: usize,
        start_time: f64,
        server_timestamp: u64,
        epoch: u64,
    },
    SynchronizedPlay {
        start_time: f64,
        server_timestamp: u64,
        is_playing: bool,
        epoch: u64,
    },
    SyncTime {
        current_time: f64,
        is_playing: bool,
        current_track_index: usize,
        server_timestamp: u64,
        epoch: u64,
    },
    Pong {
        client_timestamp: i64,
        server_timestamp: u64,
        latency: u64,
    },
    /// Optional admin broadcast asking clients to reload their page/session.
    ForceReload,
}

/// Full room state snapshot used by `roomState`/`queueUpdate`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatePayload {
    pub queue: Vec<Track>,
    pub current_index: usize,
    pub mode: RoomModeWire,
    pub current_time: f64,
    pub epoch: u64,
}

/// Wire representation of the playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomModeWire {
    Idle,
    Preparing,
    Playing,
    Paused,
}
