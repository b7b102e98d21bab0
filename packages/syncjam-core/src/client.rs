//! Client Controller: the per-client playback-sync state machine.
//!
//! Unlike every other module here, this doesn't run inside the server — it
//! models what a connected client does in response to the wire messages
//! `coordinator` emits. It's written as a plain, host-agnostic state machine
//! (no socket, no timers of its own) so it can run in integration tests
//! against a real [`crate::coordinator::PlaybackCoordinator`], and so a
//! reference/load-testing client can embed it directly instead of
//! reimplementing the pre-buffer/drift-correction rules in a browser script.
//! Every method takes `now_ms` explicitly rather than holding a [`Clock`] —
//! the caller (test harness or reference client event loop) owns time.
//!
//! [`Clock`]: crate::clock::Clock

use std::sync::Arc;

use crate::protocol::{
    CLIENT_RESYNC_COOLDOWN_MS, DEGRADED_COOLDOWN_MS, DEGRADED_RESET_MS, DRIFT_HARD_S,
    DRIFT_SOFT_DEGRADED_S, DRIFT_SOFT_NORMAL_S, MAX_CONSECUTIVE_RESYNCS, MIN_PREBUFFER_S,
    PING_INTERVAL_MS, PREBUFFER_TIMEOUT_MS, QUEUE_UPDATE_TRANSITION_MS, SOFT_CORRECTION_DURATION_MS,
    SOFT_RATE_FAST, SOFT_RATE_SLOW, SYNCHRONIZED_PLAY_TRANSITION_MS, UI_BUTTON_COOLDOWN_MS,
    WATCHDOG_STALL_WINDOW_MS,
};

/// Abstraction over "the media element" a browser would drive directly.
///
/// Lets [`ClientController`] run against a [`SimulatedMediaSink`] in tests
/// instead of a real `<audio>` element.
pub trait MediaSink: Send + Sync {
    /// Begins loading the track at `track_index`. Synchronous for
    /// simplicity — a real implementation would need to report load
    /// completion asynchronously, but nothing in depends on load
    /// taking observable time beyond pre-buffering.
    fn load(&self, track_index: usize);
    /// The track index currently loaded, if any.
    fn loaded_track_index(&self) -> Option<usize>;
    /// Seeks to an absolute position, in seconds.
    fn seek(&self, seconds: f64);
    /// Starts playback from the current position.
    fn play(&self);
    /// Stops playback, freezing the current position.
    fn pause(&self);
    /// Sets the playback rate (1.0 = normal speed).
    fn set_playback_rate(&self, rate: f64);
    /// Seconds of buffered-ahead media beyond the current position.
    fn buffered_ahead_s(&self) -> f64;
    /// The media element's current position, in seconds.
    fn current_time_s(&self) -> f64;
}

/// A side effect the embedding application must carry out: send a protocol
/// message, or escalate a persistent playback failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Send `readyToPlay(epoch)` — pre-buffering for this epoch is done.
    SendReadyToPlay { epoch: u64 },
    /// The health watchdog gave up after a reload-and-retry; the embedder
    /// should send `skip` ("the room interprets [this] as
    /// `skip`").
    RequestSkip,
}

/// Where the controller is in the pre-buffer / playback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientState {
    /// No track prepared yet.
    Idle,
    /// Waiting for the media element to report the right track loaded.
    Loading,
    /// Loaded; waiting for enough buffered-ahead data (or the timeout).
    PreBuffering,
    /// Actively playing at normal rate.
    Playing,
    /// Stopped at a fixed position.
    Paused,
    /// Playing at an adjusted rate to correct drift; reverts to `Playing`
    /// at `resume_at_ms`. Further rate corrections are suppressed while in
    /// this state ("further rate changes are suppressed").
    SoftCorrecting { resume_at_ms: u64 },
}

/// Per-client playback-sync state machine.
pub struct ClientController<M> {
    media: Arc<M>,
    state: ClientState,
    epoch: u64,
    pending_track_index: usize,
    pending_start_time: f64,
    buffering_since_ms: Option<u64>,
    current_track_index: usize,
    /// While `Some(t)` and `now_ms < t`, incoming `syncTime` is ignored.
    transition_until_ms: Option<u64>,
    latency_ms: u64,
    server_time_offset_ms: i64,
    last_ping_sent_at_ms: Option<u64>,
    last_correction_at_ms: Option<u64>,
    consecutive_corrections: u32,
    last_watchdog_sample: Option<(u64, f64)>,
    watchdog_failures: u32,
    last_button_click_ms: Option<u64>,
}

impl<M: MediaSink> ClientController<M> {
    /// Creates a controller with no track loaded, in [`ClientState::Idle`].
    #[must_use]
    pub fn new(media: Arc<M>) -> Self {
        Self {
            media,
            state: ClientState::Idle,
            epoch: 0,
            pending_track_index: 0,
            pending_start_time: 0.0,
            buffering_since_ms: None,
            current_track_index: 0,
            transition_until_ms: None,
            latency_ms: 0,
            server_time_offset_ms: 0,
            last_ping_sent_at_ms: None,
            last_correction_at_ms: None,
            consecutive_corrections: 0,
            last_watchdog_sample: None,
            watchdog_failures: 0,
            last_button_click_ms: None,
        }
    }

    /// Current lifecycle state, for assertions and host UI.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Last-measured one-way latency, in milliseconds.
    #[must_use]
    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    fn is_transitioning(&self, now_ms: u64) -> bool {
        matches!(self.state, ClientState::Loading | ClientState::PreBuffering)
        || self.transition_until_ms.is_some_and(|t| now_ms < t)
    }

    // ── Incoming protocol messages ───────────────────────────────────────

    /// `preparePlayback` (, steps 1-2 start here; 3-4 finish in
    /// [`Self::tick`] once buffering completes).
    pub fn on_prepare_playback(&mut self, track_index: usize, start_time: f64, epoch: u64, now_ms: u64) {
        self.epoch = epoch;
        self.pending_track_index = track_index;
        self.pending_start_time = start_time;
        self.buffering_since_ms = Some(now_ms);

        if self.media.loaded_track_index() == Some(track_index) {
            self.state = ClientState::PreBuffering;
        } else {
            self.media.load(track_index);
            self.state = ClientState::Loading;
        }
    }

    /// `synchronizedPlay`.
    pub fn on_synchronized_play(&mut self, start_time: f64, server_timestamp: u64, now_ms: u64) {
        let adjusted_time =
        start_time + (now_ms as f64 - server_timestamp as f64) / 1000.0 + self.latency_ms as f64 / 1000.0;
        self.media.seek(adjusted_time);
        self.media.play();
        self.state = ClientState::Playing;
        self.transition_until_ms = Some(now_ms + SYNCHRONIZED_PLAY_TRANSITION_MS);
        self.last_watchdog_sample = Some((now_ms, adjusted_time));
        self.watchdog_failures = 0;
    }

    /// `playerUpdate` — a non-epoch-bearing pause/seek broadcast.
    pub fn on_player_update(&mut self, is_playing: bool, current_time: f64, start_wall_ms: Option<u64>, now_ms: u64) {
        if is_playing {
            let adjusted = match start_wall_ms {
                Some(wall_ms) => {
                    current_time + (now_ms as f64 - wall_ms as f64) / 1000.0 + self.latency_ms as f64 / 1000.0
                }
                None => current_time,
            };
            self.media.seek(adjusted);
            self.media.play();
            self.state = ClientState::Playing;
        } else {
            self.media.seek(current_time);
            self.media.pause();
            self.state = ClientState::Paused;
        }
    }

    /// `queueUpdate` ("transition is also set... after any
    /// `queueUpdate` that changes `currentIndex`").
    pub fn on_queue_update(&mut self, current_index: usize, now_ms: u64) {
        if current_index != self.current_track_index {
            self.current_track_index = current_index;
            self.transition_until_ms = Some(now_ms + QUEUE_UPDATE_TRANSITION_MS);
        }
    }

    /// `syncTime` drift correction.
    pub fn on_sync_time(&mut self, server_current_time: f64, now_ms: u64) {
        if self.is_transitioning(now_ms) {
            return;
        }

        if let Some(last) = self.last_correction_at_ms {
            if now_ms.saturating_sub(last) >= DEGRADED_RESET_MS {
                self.consecutive_corrections = 0;
            }
        }

        let local_time = self.media.current_time_s();
        let drift = (server_current_time - local_time).abs();
        let degraded = self.consecutive_corrections >= MAX_CONSECUTIVE_RESYNCS;
        let threshold = if degraded { DRIFT_SOFT_DEGRADED_S } else { DRIFT_SOFT_NORMAL_S };
        if drift < threshold {
            return;
        }

        let cooldown = if degraded { DEGRADED_COOLDOWN_MS } else { CLIENT_RESYNC_COOLDOWN_MS };
        if let Some(last) = self.last_correction_at_ms {
            if now_ms.saturating_sub(last) < cooldown {
                return;
            }
        }

        if drift >= DRIFT_HARD_S {
            self.media.seek(server_current_time + self.latency_ms as f64 / 1000.0);
        } else {
            if matches!(self.state, ClientState::SoftCorrecting { .. }) {
                return;
            }
            let rate = if server_current_time > local_time { SOFT_RATE_FAST } else { SOFT_RATE_SLOW };
            self.media.set_playback_rate(rate);
            self.state = ClientState::SoftCorrecting {
                resume_at_ms: now_ms + SOFT_CORRECTION_DURATION_MS,
            };
        }

        self.last_correction_at_ms = Some(now_ms);
        self.consecutive_corrections += 1;
    }

    /// `pong`.
    pub fn on_pong(&mut self, server_timestamp: u64, latency_ms: u64, now_ms: u64) {
        self.latency_ms = latency_ms;
        self.server_time_offset_ms = server_timestamp as i64 - now_ms as i64;
    }

    /// Server-clock offset derived from the last `pong` (,
    /// "for use in compensated scheduling").
    #[must_use]
    pub fn server_time_offset_ms(&self) -> i64 {
        self.server_time_offset_ms
    }

    // ── Timers the embedder is expected to drive ────────────────────────

    /// Advances pre-buffering and soft-correction timers. Call this
    /// frequently (e.g. every animation frame or every `SYNC_INTERVAL_MS`).
    pub fn tick(&mut self, now_ms: u64) -> Option<ClientAction> {
        if let ClientState::SoftCorrecting { resume_at_ms } = self.state {
            if now_ms >= resume_at_ms {
                self.media.set_playback_rate(1.0);
                self.state = ClientState::Playing;
            }
        }

        match self.state {
            ClientState::Loading => {
                if self.media.loaded_track_index() == Some(self.pending_track_index) {
                    self.state = ClientState::PreBuffering;
                }
                None
            }
            ClientState::PreBuffering => {
                let elapsed = now_ms.saturating_sub(self.buffering_since_ms.unwrap_or(now_ms));
                if self.media.buffered_ahead_s() >= MIN_PREBUFFER_S || elapsed >= PREBUFFER_TIMEOUT_MS {
                    self.media.seek(self.pending_start_time);
                    self.state = ClientState::Paused;
                    Some(ClientAction::SendReadyToPlay { epoch: self.epoch })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Returns a ping timestamp to send if `PING_INTERVAL_MS` has elapsed
    /// since the last one.
    pub fn maybe_ping(&mut self, now_ms: u64) -> Option<i64> {
        let due = self
            .last_ping_sent_at_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= PING_INTERVAL_MS);
        if due {
            self.last_ping_sent_at_ms = Some(now_ms);
            Some(now_ms as i64)
        } else {
            None
        }
    }

    /// Health watchdog. Call roughly every
    /// `WATCHDOG_CHECK_INTERVAL_MS`.
    ///
    /// The baseline sample is held until either the media position actually
    /// advances (proof of life, baseline resets to now) or
    /// `WATCHDOG_STALL_WINDOW_MS` has genuinely elapsed since it was taken —
    /// it is never overwritten on a tick that's merely confirming the
    /// position hasn't moved yet, or a stall spanning several checks at the
    /// documented cadence would never be seen as the full window.
    pub fn check_watchdog(&mut self, now_ms: u64) -> Option<ClientAction> {
        if !matches!(self.state, ClientState::Playing | ClientState::SoftCorrecting { .. }) {
            self.last_watchdog_sample = None;
            return None;
        }

        let current_time = self.media.current_time_s();
        let Some((baseline_ms, baseline_time)) = self.last_watchdog_sample else {
            self.last_watchdog_sample = Some((now_ms, current_time));
            self.watchdog_failures = 0;
            return None;
        };

        if (current_time - baseline_time).abs() >= f64::EPSILON {
            self.last_watchdog_sample = Some((now_ms, current_time));
            self.watchdog_failures = 0;
            return None;
        }

        if now_ms.saturating_sub(baseline_ms) < WATCHDOG_STALL_WINDOW_MS {
            return None;
        }

        self.watchdog_failures += 1;
        let action = if self.watchdog_failures > 1 {
            Some(ClientAction::RequestSkip)
        } else {
            self.media.load(self.current_track_index);
            self.media.seek(current_time);
            self.media.play();
            None
        };
        self.last_watchdog_sample = Some((now_ms, current_time));
        action
    }

    /// Play/pause button press. Returns `true` if the press is
    /// outside the `UI_BUTTON_COOLDOWN_MS` window and should actually send
    /// a command; `false` if it should be silently dropped client-side.
    pub fn on_play_pause_button(&mut self, now_ms: u64) -> bool {
        let suppressed = self
            .last_button_click_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < UI_BUTTON_COOLDOWN_MS);
        if suppressed {
            false
        } else {
            self.last_button_click_ms = Some(now_ms);
            true
        }
    }
}

/// In-memory [`MediaSink`] double for tests: tracks loaded track, position,
/// playback rate, and buffered-ahead seconds without any real decoding.
#[derive(Debug)]
pub struct SimulatedMediaSink {
    inner: parking_lot::Mutex<SimulatedMediaState>,
}

#[derive(Debug, Clone)]
struct SimulatedMediaState {
    loaded_track_index: Option<usize>,
    position_s: f64,
    rate: f64,
    buffered_ahead_s: f64,
    playing: bool,
}

impl SimulatedMediaSink {
    /// Creates a sink with nothing loaded and `buffered_ahead_s` preset —
    /// tests typically set this high enough to skip pre-buffer waiting.
    #[must_use]
    pub fn new(buffered_ahead_s: f64) -> Arc<Self> {
        Arc::new(Self {
                inner: parking_lot::Mutex::new(SimulatedMediaState {
                        loaded_track_index: None,
                        position_s: 0.0,
                        rate: 1.0,
                        buffered_ahead_s,
                        playing: false,
                    }),
            })
    }

    /// Advances `position_s` by `seconds` if currently playing, scaled by
    /// the active playback rate — lets tests simulate elapsed wall time.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.inner.lock();
        if state.playing {
            state.position_s += seconds * state.rate;
        }
    }

    /// Freezes `position_s`, simulating a stall (for watchdog tests).
    pub fn freeze(&self) {
        self.inner.lock().playing = false;
    }

    #[must_use]
    pub fn playback_rate(&self) -> f64 {
        self.inner.lock().rate
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }
}

impl MediaSink for SimulatedMediaSink {
    fn load(&self, track_index: usize) {
        let mut state = self.inner.lock();
        state.loaded_track_index = Some(track_index);
        state.position_s = 0.0;
    }

    fn loaded_track_index(&self) -> Option<usize> {
        self.inner.lock().loaded_track_index
    }

    fn seek(&self, seconds: f64) {
        self.inner.lock().position_s = seconds;
    }

    fn play(&self) {
        self.inner.lock().playing = true;
    }

    fn pause(&self) {
        self.inner.lock().playing = false;
    }

    fn set_playback_rate(&self, rate: f64) {
        self.inner.lock().rate = rate;
    }

    fn buffered_ahead_s(&self) -> f64 {
        self.inner.lock().buffered_ahead_s
    }

    fn current_time_s(&self) -> f64 {
        self.inner.lock().position_s
    }
}
