//! Room state: the authoritative playback mode and position.
//!
//! `RoomState` is owned exclusively by the coordinator (see
//! `coordinator.rs`) — nothing else mutates it directly. It exists as its
//! own module because the wire payload (`RoomStatePayload`) and the
//! internal invariants around mode/index consistency are useful to reason
//! about in isolation from the command-handling logic.

use crate::protocol::{RoomModeWire, RoomStatePayload};
use crate::queue::Queue;
use crate::snapshot::{RoomSnapshot, SnapshotMode};

/// The playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomMode {
    /// Nothing queued, or queue exhausted with nothing to resume.
    Idle,
    /// Waiting for all connected clients to pre-buffer and signal ready for
    /// `epoch`, bounded by `READY_TIMEOUT_MS`.
    Preparing { epoch: u64 },
    /// Media is advancing; `base_position_s`/`started_at_ms` anchor the
    /// authoritative position (I6).
    Playing,
    /// Media is stopped at `base_position_s`.
    Paused,
}

/// Authoritative playback position and mode, mutated only by the
/// coordinator actor.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub queue: Queue,
    pub mode: RoomMode,
    /// Position (seconds into the current track) at `started_at_ms`, or the
    /// paused/idle position when not playing.
    pub base_position_s: f64,
    /// Server wall-clock ms at which `base_position_s` was last anchored.
    /// Only meaningful while `mode == Playing` (I6).
    pub started_at_ms: u64,
    /// Monotonically increasing counter, bumped on every Preparing entry.
    /// Stale `readyToPlay`/client messages referencing an old epoch are
    /// ignored.
    pub epoch: u64,
}

impl RoomState {
    /// Starts in `Idle` with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Queue::default(),
            mode: RoomMode::Idle,
            base_position_s: 0.0,
            started_at_ms: 0,
            epoch: 0,
        }
    }

    /// Computes the authoritative playback position at `now_ms` (I6).
    ///
    /// While playing this extrapolates from the anchor; otherwise it's just
    /// the stored base position.
    #[must_use]
    pub fn current_time_s(&self, now_ms: u64) -> f64 {
        match self.mode {
            RoomMode::Playing => {
                let elapsed_ms = now_ms.saturating_sub(self.started_at_ms);
                self.base_position_s + (elapsed_ms as f64 / 1000.0)
            }
            _ => self.base_position_s,
        }
    }

    /// Freezes the current extrapolated position into `base_position_s`.
    /// Called before any transition out of `Playing`.
    pub fn freeze_position(&mut self, now_ms: u64) {
        self.base_position_s = self.current_time_s(now_ms);
    }

    /// Bumps the epoch and enters `Preparing`. Returns the new epoch.
    pub fn enter_preparing(&mut self, now_ms: u64) -> u64 {
        self.freeze_position(now_ms);
        self.bump_epoch();
        self.set_mode_preparing();
        self.epoch
    }

    /// Increments the epoch counter without otherwise touching `mode`.
    ///
    /// Split out from [`Self::enter_preparing`] so navigation commands can
    /// bump the epoch immediately while deferring the actual
    /// `Preparing` transition until the post-navigation delay fires.
    pub fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Transitions to `Preparing` at the current epoch, without bumping it.
    pub fn set_mode_preparing(&mut self) {
        self.mode = RoomMode::Preparing {
            epoch: self.epoch,
        };
    }

    /// Re-anchors `started_at_ms` to `now_ms` without changing `base_position_s`
    /// or `mode`. Used by `seek` while Playing.
    pub fn reanchor(&mut self, now_ms: u64) {
        self.started_at_ms = now_ms;
    }

    /// Anchors playback at `base_position_s` starting at `now_ms`.
    pub fn enter_playing(&mut self, now_ms: u64) {
        self.started_at_ms = now_ms;
        self.mode = RoomMode::Playing;
    }

    /// Freezes position and enters `Paused`.
    pub fn enter_paused(&mut self, now_ms: u64) {
        self.freeze_position(now_ms);
        self.mode = RoomMode::Paused;
    }

    /// Freezes position (if playing) and enters `Idle`, resetting to 0.
    pub fn enter_idle(&mut self) {
        self.mode = RoomMode::Idle;
        self.base_position_s = 0.0;
    }

    /// Whether a message tagged with `msg_epoch` belongs to the current
    /// epoch (stale-message discarding, ).
    #[must_use]
    pub fn is_current_epoch(&self, msg_epoch: u64) -> bool {
        msg_epoch == self.epoch
    }

    /// Checks I1-I3 and aborts in a debug build on violation (§7, "Fatal
    /// (process-level): coordinator invariant violation detected in a debug
    /// build - abort"). A no-op in release builds: `debug_assert!` compiles
    /// out, and a release build is expected to log and fall back to a
    /// snapshot restore rather than crash the process.
    ///
    /// Called by the coordinator after every mutation, never by `RoomState`
    /// itself - this type has no opinion on what a release build should do
    /// about a violation.
    pub fn debug_check_invariants(&self, now_ms: u64) {
        if self.queue.is_empty() {
            // I2: an empty queue pins mode to Idle/Paused and the position to 0.
            debug_assert!(
                matches!(self.mode, RoomMode::Idle | RoomMode::Paused),
                "I2 violated: empty queue but mode is {:?}",
                self.mode
            );
            debug_assert_eq!(self.queue.current_index(), 0, "I2 violated: empty queue with nonzero current_index");
            debug_assert_eq!(self.base_position_s, 0.0, "I2 violated: empty queue with nonzero position");
        } else {
            // I3: current_index always refers to an existing track.
            debug_assert!(
                self.queue.current_index() < self.queue.len(),
                "I3 violated: current_index {} out of range for queue of length {}",
                self.queue.current_index(),
                self.queue.len()
            );
        }

        // I1: while Playing, current_time_s is always the live extrapolation
        // from started_at_ms - trivially true by construction, checked here
        // against a fresh computation to catch a future refactor that starts
        // caching `current_time` instead of deriving it.
        if self.mode == RoomMode::Playing {
            debug_assert!(now_ms >= self.started_at_ms, "I1 violated: started_at_ms is in the future");
        }
    }

    /// Builds the wire snapshot for `roomState`/`queueUpdate`.
    #[must_use]
    pub fn to_payload(&self, now_ms: u64) -> RoomStatePayload {
        RoomStatePayload {
            queue: self.queue.tracks().to_vec(),
            current_index: self.queue.current_index(),
            mode: self.mode.into(),
            current_time: self.current_time_s(now_ms),
            epoch: self.epoch,
        }
    }

    /// Builds a persistable snapshot. The Session Registry
    /// is deliberately not part of this — sessions are never restored.
    #[must_use]
    pub fn to_snapshot(&self, now_ms: u64) -> RoomSnapshot {
        RoomSnapshot {
            queue: self.queue.tracks().to_vec(),
            current_index: self.queue.current_index(),
            mode: match self.mode {
                RoomMode::Idle => SnapshotMode::Idle,
                RoomMode::Playing => SnapshotMode::Playing,
                RoomMode::Paused | RoomMode::Preparing { .. } => SnapshotMode::Paused,
            },
            current_time: self.current_time_s(now_ms),
        }
    }

    /// Hydrates a fresh `Idle`/`Paused` room from a snapshot (,
    /// "may be hydrated from an external snapshot at startup if non-empty").
    ///
    /// A persisted `Playing` mode is restored as `Paused`: the wall-clock
    /// anchor it depended on is gone after a restart, so resuming requires
    /// a fresh `play` rather than guessing where playback would be now.
    #[must_use]
    pub fn from_snapshot(snapshot: RoomSnapshot) -> Self {
        let mut queue = Queue::default();
        queue.reorder(snapshot.queue, snapshot.current_index);
        let mode = match snapshot.mode {
            SnapshotMode::Idle => RoomMode::Idle,
            SnapshotMode::Playing | SnapshotMode::Paused => RoomMode::Paused,
        };
        Self {
            queue,
            mode,
            base_position_s: snapshot.current_time,
            started_at_ms: 0,
            epoch: 0,
        }
    }
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}

impl From<RoomMode> for RoomModeWire {
    fn from(mode: RoomMode) -> Self {
        match mode {
            RoomMode::Idle => RoomModeWire::Idle,
            RoomMode::Preparing { .. } => RoomModeWire::Preparing,
            RoomMode::Playing => RoomModeWire::Playing,
            RoomMode::Paused => RoomModeWire::Paused,
        }
    }
}
