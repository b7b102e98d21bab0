//! Playback Coordinator: the synchronized-playback state machine.
//!
//! This is the heart of SyncJam. `PlaybackCoordinator` owns `RoomState` and
//! the `SessionRegistry` behind a single `tokio::sync::Mutex` guarding all
//! mutations, chosen over a dedicated actor task because it lets every
//! command be a plain `async fn` on `&Arc<Self>` that background tasks (the
//! ready-timeout, the post-navigation delay, the sync ticker) can call back
//! into directly. Holding the lock for the duration of a mutation *and*
//! its broadcast is what gives the ordering guarantee that broadcasts
//! following a mutation are emitted before the next mutation is processed:
//! no other command can acquire the lock until the current one has both
//! mutated state and told the emitter about it.
//!
//! Background work (ready-timeout, post-navigation delay, sync ticker) is
//! spawned through the injected [`TaskSpawner`] rather than calling
//! `tokio::spawn` directly. Each is cancelable via a [`CancellationToken`]
//! torn down per invocation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::events::EventEmitter;
use crate::protocol::{
    RoomStatePayload, ServerMessage, NAV_PREPARE_DELAY_MS, PLAY_PAUSE_COOLDOWN_MS, READY_TIMEOUT_MS,
    SYNC_INTERVAL_MS,
};
use crate::queue::{RemovalEffect, Track};
use crate::room::{RoomMode, RoomState};
use crate::runtime::TaskSpawner;
use crate::session::{SessionId, SessionRegistry};

/// Why a guarded command (`play`/`pause`) was silently dropped.
///
/// Not broadcast to clients — this is a protocol-local condition, logged
/// and otherwise invisible on the wire. Returned to the caller so the admin
/// surface and tests can assert on *why* a command had no effect rather
/// than inferring it from logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRejected {
    /// Within `PLAY_PAUSE_COOLDOWN_MS` of the last accepted guarded command.
    Cooldown,
    /// The command doesn't apply in the current mode (e.g. `play` while
    /// already Playing, `pause` while not Playing).
    WrongMode,
    /// The queue is empty; there is no track to act on.
    EmptyQueue,
}

struct Inner {
    room: RoomState,
    last_guarded_command_at: Option<u64>,
    ready_timeout: Option<CancellationToken>,
    nav_delay: Option<CancellationToken>,
    ticker: Option<CancellationToken>,
}

impl Inner {
    fn cancel_ready_timeout(&mut self) {
        if let Some(token) = self.ready_timeout.take() {
            token.cancel();
        }
    }

    fn cancel_nav_delay(&mut self) {
        if let Some(token) = self.nav_delay.take() {
            token.cancel();
        }
    }

    fn cancel_ticker(&mut self) {
        if let Some(token) = self.ticker.take() {
            token.cancel();
        }
    }
}

/// The server-authoritative playback state machine.
///
/// Generic over [`Clock`], [`TaskSpawner`], and [`EventEmitter`] so tests can
/// inject a [`crate::clock::FakeClock`] and a recording emitter while
/// production wiring uses [`crate::clock::SystemClock`] and
/// [`crate::events::BroadcastEventEmitter`].
pub struct PlaybackCoordinator<C, S, E> {
    clock: Arc<C>,
    spawner: Arc<S>,
    emitter: Arc<E>,
    sessions: Arc<SessionRegistry>,
    inner: Mutex<Inner>,
}

impl<C, S, E> PlaybackCoordinator<C, S, E>
where
    C: Clock + 'static,
    S: TaskSpawner + 'static,
    E: EventEmitter + 'static,
{
    /// Builds a coordinator with an empty, Idle room.
    #[must_use]
    pub fn new(clock: Arc<C>, spawner: Arc<S>, emitter: Arc<E>, sessions: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            spawner,
            emitter,
            sessions,
            inner: Mutex::new(Inner {
                room: RoomState::new(),
                last_guarded_command_at: None,
                ready_timeout: None,
                nav_delay: None,
                ticker: None,
            }),
        })
    }

    /// Builds a coordinator hydrated from a previously-persisted snapshot
    /// ("may be hydrated from an external snapshot at startup if
    /// non-empty"). Sessions are never restored.
    #[must_use]
    pub fn from_room_state(
        clock: Arc<C>,
        spawner: Arc<S>,
        emitter: Arc<E>,
        sessions: Arc<SessionRegistry>,
        room: RoomState,
    ) -> Arc<Self> {
        Arc::new(Self {
            clock,
            spawner,
            emitter,
            sessions,
            inner: Mutex::new(Inner {
                room,
                last_guarded_command_at: None,
                ready_timeout: None,
                nav_delay: None,
                ticker: None,
            }),
        })
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    /// Registers a new session and returns the current room snapshot for it
    /// (the `roomState` message — sent once on connect, not broadcast).
    pub async fn attach_session(&self, session_id: SessionId) -> RoomStatePayload {
        self.sessions.attach(session_id);
        let inner = self.inner.lock().await;
        inner.room.to_payload(self.now())
    }

    /// Removes a session on disconnect. If this
    /// leaves every remaining session ready while the room is Preparing,
    /// re-checks convergence: a slow session leaving shouldn't be able to
    /// strand the room in Preparing until the ready-timeout (an enrichment
    /// consistent with "ready convergence", see `DESIGN.md`).
    pub async fn detach_session(self: &Arc<Self>, session_id: &str) {
        self.sessions.detach(session_id);
        let mut inner = self.inner.lock().await;
        if matches!(inner.room.mode, RoomMode::Preparing { .. }) && self.sessions.all_ready() {
            self.converge_to_playing(&mut inner).await;
        }
    }

    /// Records a latency measurement and returns the `pong` reply. Pong is
    /// unicast to the requesting session, never broadcast, so it's returned
    /// directly rather than emitted.
    pub fn ping(&self, session_id: &str, client_ts: i64) -> Option<ServerMessage> {
        let now = self.now();
        let rtt_ms = now as i64 - client_ts;
        let latency = match self.sessions.record_latency(session_id, rtt_ms, now) {
            Some(latency) => latency,
            None => {
                tracing::warn!(session_id, rtt_ms, "dropping out-of-range ping latency");
                return None;
            }
        };
        Some(ServerMessage::Pong {
            client_timestamp: client_ts,
            server_timestamp: now,
            latency,
        })
    }

    /// Current room snapshot, for the admin health surface.
    pub async fn snapshot(&self) -> RoomStatePayload {
        let inner = self.inner.lock().await;
        inner.room.to_payload(self.now())
    }

    /// Number of currently-connected sessions, for the admin health surface.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Builds a persistable snapshot of the current room. The
    /// caller decides when/whether to write it to a [`crate::snapshot::SnapshotStore`];
    /// the coordinator itself never touches storage.
    pub async fn persist_snapshot(&self) -> crate::snapshot::RoomSnapshot {
        let inner = self.inner.lock().await;
        inner.room.to_snapshot(self.now())
    }

    // ── Guarded commands (play / pause) ─────────────────────────────────────

    fn guarded_allowed(inner: &Inner, now: u64) -> bool {
        match inner.last_guarded_command_at {
            Some(last) => now.saturating_sub(last) >= PLAY_PAUSE_COOLDOWN_MS,
            None => true,
        }
    }

    /// `play`. Resets readiness, opens a new epoch, enters
    /// Preparing, and arms the ready-timeout.
    pub async fn play(self: &Arc<Self>) -> Result<(), CommandRejected> {
        let mut inner = self.inner.lock().await;
        let now = self.now();

        if !Self::guarded_allowed(&inner, now) {
            tracing::debug!("play dropped: within PLAY_PAUSE_COOLDOWN_MS");
            return Err(CommandRejected::Cooldown);
        }

        match inner.room.mode {
            RoomMode::Playing => Err(CommandRejected::WrongMode),
            RoomMode::Paused | RoomMode::Idle => {
                if inner.room.queue.is_empty() {
                    return Err(CommandRejected::EmptyQueue);
                }
                inner.last_guarded_command_at = Some(now);
                self.sessions.reset_ready_all();
                let epoch = inner.room.enter_preparing(now);
                let track_index = inner.room.queue.current_index();
                let start_time = inner.room.base_position_s;
                inner.room.debug_check_invariants(now);
                self.emitter.emit(ServerMessage::PreparePlayback {
                    track_index,
                    start_time,
                    server_timestamp: now,
                    epoch,
                });
                self.arm_ready_timeout(&mut inner, epoch);
                Ok(())
            }
            RoomMode::Preparing { .. } => Err(CommandRejected::WrongMode),
        }
    }

    /// `pause`. Only valid from Playing; freezes the
    /// authoritative position and stops the ticker.
    pub async fn pause(self: &Arc<Self>) -> Result<(), CommandRejected> {
        let mut inner = self.inner.lock().await;
        let now = self.now();

        if !Self::guarded_allowed(&inner, now) {
            tracing::debug!("pause dropped: within PLAY_PAUSE_COOLDOWN_MS");
            return Err(CommandRejected::Cooldown);
        }
        if inner.room.mode != RoomMode::Playing {
            return Err(CommandRejected::WrongMode);
        }

        inner.last_guarded_command_at = Some(now);
        inner.cancel_ticker();
        inner.room.enter_paused(now);
        let current_time = inner.room.base_position_s;
        inner.room.debug_check_invariants(now);
        self.emitter.emit(ServerMessage::PlayerUpdate {
            is_playing: false,
            current_time,
            start_wall_ms: None,
        });
        Ok(())
    }

    // ── Navigation (skip / previous / jumpTo) ───────────────────────────────

    /// `skip`.
    pub async fn skip(self: &Arc<Self>) {
        self.navigate(|queue| queue.advance()).await;
    }

    /// `previous`.
    pub async fn previous(self: &Arc<Self>) {
        self.navigate(|queue| queue.previous()).await;
    }

    /// `jumpTo(index)`. No-op (dropped, logged) if out of range.
    pub async fn jump_to(self: &Arc<Self>, index: usize) {
        self.navigate(move |queue| queue.jump_to(index)).await;
    }

    /// Shared navigation path: unconditionally move the index, zero the
    /// position, bump the epoch, reset readiness, stop the ticker, and
    /// broadcast `queueUpdate`. If the room was Playing, re-enter Preparing
    /// after `NAV_PREPARE_DELAY_MS` so clients can tear down the old track's
    /// audio pipeline first.
    async fn navigate(self: &Arc<Self>, mutate: impl FnOnce(&mut crate::queue::Queue) -> bool) {
        let mut inner = self.inner.lock().await;
        let now = self.now();

        if !mutate(&mut inner.room.queue) {
            tracing::warn!("navigation command dropped: index out of range");
            return;
        }

        let was_playing = inner.room.mode == RoomMode::Playing;
        inner.cancel_ready_timeout();
        inner.cancel_nav_delay();
        inner.cancel_ticker();
        inner.room.base_position_s = 0.0;
        self.sessions.reset_ready_all();
        let epoch = inner.room.bump_epoch();
        if was_playing {
            inner.room.mode = RoomMode::Paused;
        }

        inner.room.debug_check_invariants(now);
        let payload = inner.room.to_payload(now);
        self.emitter.emit(ServerMessage::QueueUpdate(payload));

        if was_playing {
            self.arm_nav_prepare_delay(&mut inner, epoch);
        }
    }

    // ── Seek ─────────────────────────────────────────────────────────────

    /// `seek(t)`. Does not re-enter Preparing.
    pub async fn seek(self: &Arc<Self>, seconds: f64) {
        let mut inner = self.inner.lock().await;
        let now = self.now();

        inner.room.base_position_s = seconds;
        let is_playing = inner.room.mode == RoomMode::Playing;
        let start_wall_ms = if is_playing {
            inner.room.reanchor(now);
            Some(now)
        } else {
            None
        };

        inner.room.debug_check_invariants(now);
        self.emitter.emit(ServerMessage::PlayerUpdate {
                is_playing,
                current_time: seconds,
                start_wall_ms,
            });
    }

    // ── Queue mutation ───────────────────────────────────────────────────

    /// `addToQueue(track)`.
    pub async fn add_to_queue(&self, track: Track) {
        let mut inner = self.inner.lock().await;
        inner.room.queue.append(track);
        let now = self.now();
        inner.room.debug_check_invariants(now);
        let payload = inner.room.to_payload(now);
        self.emitter.emit(ServerMessage::QueueUpdate(payload));
    }

    /// `removeFromQueue(index)`. Out-of-range indices are dropped silently
    /// as a protocol error.
    pub async fn remove_from_queue(&self, index: usize) {
        let mut inner = self.inner.lock().await;
        let now = self.now();

        let Some(effect) = inner.room.queue.remove_at(index) else {
            tracing::warn!(index, "removeFromQueue dropped: index out of range");
            return;
        };

        match effect {
            RemovalEffect::Unaffected | RemovalEffect::IndexShifted => {}
            RemovalEffect::BecameEmpty | RemovalEffect::CurrentRemovedWrap => {
                inner.cancel_ready_timeout();
                inner.cancel_nav_delay();
                inner.cancel_ticker();
                inner.room.mode = RoomMode::Paused;
                inner.room.base_position_s = 0.0;
            }
            RemovalEffect::CurrentRemovedMiddle => {
                // The next track silently becomes current; doesn't
                // call for a mode or position reset here.
            }
        }

        inner.room.debug_check_invariants(now);
        let payload = inner.room.to_payload(now);
        self.emitter.emit(ServerMessage::QueueUpdate(payload));
    }

    /// `reorderQueue{ queue, currentTrackIndex }`. Hardens the
    /// client-supplied index by recomputing it from the previously current
    /// track's id when that track is still present in the new queue.
    pub async fn reorder_queue(&self, new_queue: Vec<Track>, client_index: usize) {
        let mut inner = self.inner.lock().await;
        let previous_current_id = inner.room.queue.current().map(|t| t.id.clone());

        let hardened_index = previous_current_id
            .as_deref()
            .and_then(|id| new_queue.iter().position(|t| t.id == id))
            .unwrap_or(client_index);

        inner.room.queue.reorder(new_queue, hardened_index);
        let now = self.now();
        inner.room.debug_check_invariants(now);
        let payload = inner.room.to_payload(now);
        self.emitter.emit(ServerMessage::QueueUpdate(payload));
    }

    // ── Ready convergence ────────────────────────────────────────────────

    /// `readyToPlay(epoch)`. Ignored if `epoch` is stale.
    pub async fn ready_to_play(self: &Arc<Self>, session_id: &str, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if !inner.room.is_current_epoch(epoch) {
            tracing::debug!(session_id, epoch, "dropping stale readyToPlay");
            return;
        }
        self.sessions.mark_ready(session_id);
        if matches!(inner.room.mode, RoomMode::Preparing { .. }) && self.sessions.all_ready() {
            self.converge_to_playing(&mut inner).await;
        }
    }

    /// Transitions Preparing → Playing: cancels the ready-timeout, starts
    /// the ticker, and broadcasts `synchronizedPlay`. Shared by ready
    /// convergence, the ready-timeout firing, and the detach-triggered
    /// re-check.
    async fn converge_to_playing(self: &Arc<Self>, inner: &mut Inner) {
        let now = self.now();
        let epoch = inner.room.epoch;
        inner.cancel_ready_timeout();
        inner.room.enter_playing(now);
        let start_time = inner.room.base_position_s;
        inner.room.debug_check_invariants(now);
        self.emitter.emit(ServerMessage::SynchronizedPlay {
            start_time,
            server_timestamp: now,
            is_playing: true,
            epoch,
        });
        self.arm_ticker(inner, epoch);
    }

    // ── Background tasks ─────────────────────────────────────────────────

    fn arm_ready_timeout(self: &Arc<Self>, inner: &mut Inner, epoch: u64) {
        let token = CancellationToken::new();
        inner.ready_timeout = Some(token.clone());
        let me = Arc::clone(self);
        self.spawner.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(READY_TIMEOUT_MS)) => {
                    me.on_ready_timeout(epoch).await;
                }
            }
        });
    }

    async fn on_ready_timeout(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.room.mode, RoomMode::Preparing { .. }) || inner.room.epoch != epoch {
            return;
        }
        let (ready, total) = self.sessions.snapshot_ready();
        tracing::info!(ready, total, epoch, "ready-timeout elapsed, starting playback");
        self.converge_to_playing(&mut inner).await;
    }

    fn arm_nav_prepare_delay(self: &Arc<Self>, inner: &mut Inner, epoch: u64) {
        let token = CancellationToken::new();
        inner.nav_delay = Some(token.clone());
        let me = Arc::clone(self);
        self.spawner.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(NAV_PREPARE_DELAY_MS)) => {
                    me.on_nav_delay_fire(epoch).await;
                }
            }
        });
    }

    async fn on_nav_delay_fire(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.room.epoch != epoch || inner.room.mode != RoomMode::Paused {
            return;
        }
        let now = self.now();
        inner.room.set_mode_preparing();
        let track_index = inner.room.queue.current_index();
        let start_time = inner.room.base_position_s;
        inner.room.debug_check_invariants(now);
        self.emitter.emit(ServerMessage::PreparePlayback {
            track_index,
            start_time,
            server_timestamp: now,
            epoch,
        });
        self.arm_ready_timeout(&mut inner, epoch);
    }

    fn arm_ticker(self: &Arc<Self>, inner: &mut Inner, epoch: u64) {
        let token = CancellationToken::new();
        inner.ticker = Some(token.clone());
        let me = Arc::clone(self);
        self.spawner.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(SYNC_INTERVAL_MS));
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if !me.on_tick(epoch).await {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// One Sync Ticker tick. Returns `false` if the ticker
    /// should stop (end-of-track handling, or the epoch moved on).
    async fn on_tick(self: &Arc<Self>, epoch: u64) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.room.mode != RoomMode::Playing || inner.room.epoch != epoch {
            return false;
        }

        let now = self.now();
        let current_time = inner.room.current_time_s(now);
        let duration = inner.room.queue.current().map(|t| t.duration);

        match duration {
            Some(duration) if current_time >= duration => {
                self.advance_end_of_track(&mut inner, now).await;
                false
            }
            _ => {
                let current_track_index = inner.room.queue.current_index();
                self.emitter.emit(ServerMessage::SyncTime {
                    current_time,
                    is_playing: true,
                    current_track_index,
                    server_timestamp: now,
                    epoch,
                });
                true
            }
        }
    }

    /// End-of-track handling, raised by the sync ticker. Caller holds
    /// `inner`'s lock and has already decided the ticker must stop.
    async fn advance_end_of_track(self: &Arc<Self>, inner: &mut Inner, now: u64) {
        if inner.room.queue.advance() {
            inner.room.base_position_s = 0.0;
            inner.room.mode = RoomMode::Paused;
            self.sessions.reset_ready_all();
            let epoch = inner.room.bump_epoch();
            inner.room.debug_check_invariants(now);
            let payload = inner.room.to_payload(now);
            self.emitter.emit(ServerMessage::QueueUpdate(payload));
            self.arm_nav_prepare_delay(inner, epoch);
        } else {
            inner.room.mode = RoomMode::Paused;
            inner.room.base_position_s = 0.0;
            inner.room.debug_check_invariants(now);
            self.emitter.emit(ServerMessage::PlayerUpdate {
                is_playing: false,
                current_time: 0.0,
                start_wall_ms: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::events::test_support::RecordingEventEmitter;
    use crate::runtime::TokioSpawner;

    type TestCoordinator = PlaybackCoordinator<FakeClock, TokioSpawner, RecordingEventEmitter>;

    fn harness() -> (Arc<TestCoordinator>, FakeClock, RecordingEventEmitter) {
        let clock = FakeClock::new(1_000_000);
        let spawner = TokioSpawner::current();
        let emitter = RecordingEventEmitter::default();
        let coordinator = PlaybackCoordinator::new(
            Arc::new(clock.clone()),
            Arc::new(spawner),
            Arc::new(emitter.clone()),
            Arc::new(SessionRegistry::new()),
        );
        (coordinator, clock, emitter)
    }

    fn track(id: &str, duration: f64) -> Track {
        Track::new(id, "test", duration)
    }

    fn last_event(emitter: &RecordingEventEmitter) -> ServerMessage {
        emitter.events.lock().last().cloned().expect("an event was emitted")
    }

    #[tokio::test]
    async fn play_on_empty_queue_is_rejected() {
        let (coordinator, _clock, _emitter) = harness();
        let result = coordinator.play().await;
        assert_eq!(result, Err(CommandRejected::EmptyQueue));
    }

    #[tokio::test]
    async fn play_enters_preparing_and_broadcasts_prepare_playback() {
        let (coordinator, _clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;

        coordinator.play().await.unwrap();

        match last_event(&emitter) {
            ServerMessage::PreparePlayback { track_index, start_time, epoch,.. } => {
                assert_eq!(track_index, 0);
                assert_eq!(start_time, 0.0);
                assert_eq!(epoch, 1);
            }
            other => panic!("expected PreparePlayback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_play_within_cooldown_is_rejected() {
        let (coordinator, _clock, _emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.play().await.unwrap();

        // No time has passed, so this is within PLAY_PAUSE_COOLDOWN_MS: the
        // cooldown check runs before the mode check and wins.
        let result = coordinator.play().await;
        assert_eq!(result, Err(CommandRejected::Cooldown));
    }

    #[tokio::test]
    async fn play_while_already_playing_is_rejected_after_cooldown_elapses() {
        let (coordinator, clock, _emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.play().await.unwrap();
        coordinator.ready_to_play("x", 1).await;

        clock.advance(PLAY_PAUSE_COOLDOWN_MS + 10);
        let result = coordinator.play().await;
        assert_eq!(result, Err(CommandRejected::WrongMode));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_convergence_transitions_to_playing() {
        let (coordinator, _clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.attach_session("y".into()).await;
        coordinator.play().await.unwrap();

        coordinator.ready_to_play("x", 1).await;
        coordinator.ready_to_play("y", 1).await;
        tokio::task::yield_now().await;

        match last_event(&emitter) {
            ServerMessage::SynchronizedPlay { epoch, is_playing,.. } => {
                assert_eq!(epoch, 1);
                assert!(is_playing);
            }
            other => panic!("expected SynchronizedPlay, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_timeout_starts_playback_without_full_convergence() {
        let (coordinator, _clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.attach_session("y".into()).await;
        coordinator.play().await.unwrap();

        coordinator.ready_to_play("x", 1).await; // y never signals ready

        tokio::time::advance(Duration::from_millis(READY_TIMEOUT_MS + 10)).await;
        tokio::task::yield_now().await;

        match last_event(&emitter) {
            ServerMessage::SynchronizedPlay { epoch,.. } => assert_eq!(epoch, 1),
            other => panic!("expected SynchronizedPlay after ready-timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ready_to_play_is_ignored() {
        let (coordinator, _clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.play().await.unwrap();

        coordinator.ready_to_play("x", 0).await; // stale epoch
        tokio::task::yield_now().await;

        assert!(matches!(last_event(&emitter), ServerMessage::PreparePlayback { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn sync_ticker_emits_sync_time_while_playing() {
        let (coordinator, clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.play().await.unwrap();
        coordinator.ready_to_play("x", 1).await;
        tokio::task::yield_now().await;

        clock.advance(SYNC_INTERVAL_MS);
        tokio::time::advance(Duration::from_millis(SYNC_INTERVAL_MS)).await;
        tokio::task::yield_now().await;

        match last_event(&emitter) {
            ServerMessage::SyncTime { current_time, epoch,.. } => {
                assert!((current_time - 0.1).abs() < 0.01);
                assert_eq!(epoch, 1);
            }
            other => panic!("expected SyncTime, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_track_advances_and_reenters_preparing_after_delay() {
        let (coordinator, clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 0.2)).await;
        coordinator.add_to_queue(track("b", 180.0)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.play().await.unwrap();
        coordinator.ready_to_play("x", 1).await;
        tokio::task::yield_now().await;

        clock.advance(SYNC_INTERVAL_MS * 3);
        tokio::time::advance(Duration::from_millis(SYNC_INTERVAL_MS * 3)).await;
        tokio::task::yield_now().await;

        match last_event(&emitter) {
            ServerMessage::QueueUpdate(payload) => assert_eq!(payload.current_index, 1),
            other => panic!("expected QueueUpdate on end-of-track, got {other:?}"),
        }

        clock.advance(NAV_PREPARE_DELAY_MS);
        tokio::time::advance(Duration::from_millis(NAV_PREPARE_DELAY_MS + 10)).await;
        tokio::task::yield_now().await;

        match last_event(&emitter) {
            ServerMessage::PreparePlayback { track_index, epoch,.. } => {
                assert_eq!(track_index, 1);
                assert_eq!(epoch, 2);
            }
            other => panic!("expected PreparePlayback after NAV_PREPARE_DELAY_MS, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn end_of_queue_pauses_instead_of_preparing() {
        let (coordinator, clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 0.1)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.play().await.unwrap();
        coordinator.ready_to_play("x", 1).await;
        tokio::task::yield_now().await;

        clock.advance(1_000);
        // Drive end-of-track directly: no further track to advance to.
        let mut inner = coordinator.inner.lock().await;
        let now = coordinator.now();
        coordinator.advance_end_of_track(&mut inner, now).await;
        drop(inner);

        match last_event(&emitter) {
            ServerMessage::PlayerUpdate { is_playing, current_time,.. } => {
                assert!(!is_playing);
                assert_eq!(current_time, 0.0);
            }
            other => panic!("expected PlayerUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_mid_track_resets_time_and_bumps_epoch() {
        let (coordinator, clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.add_to_queue(track("b", 180.0)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.play().await.unwrap();
        coordinator.ready_to_play("x", 1).await;
        tokio::task::yield_now().await;

        clock.advance(42_000);
        coordinator.skip().await;

        match last_event(&emitter) {
            ServerMessage::QueueUpdate(payload) => {
                assert_eq!(payload.current_index, 1);
                assert_eq!(payload.current_time, 0.0);
                assert_eq!(payload.epoch, 2);
            }
            other => panic!("expected QueueUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remove_current_last_pauses_and_zeroes_time() {
        let (coordinator, _clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.add_to_queue(track("b", 180.0)).await;
        coordinator.attach_session("x".into()).await;
        coordinator.play().await.unwrap();
        coordinator.ready_to_play("x", 1).await;
        coordinator.jump_to(1).await;

        coordinator.remove_from_queue(1).await;

        let payload = coordinator.snapshot().await;
        assert_eq!(payload.current_index, 0);
        assert_eq!(payload.current_time, 0.0);
        assert_eq!(payload.mode, crate::protocol::RoomModeWire::Paused);
        assert!(matches!(last_event(&emitter), ServerMessage::QueueUpdate(_)));
    }

    #[tokio::test]
    async fn reorder_hardens_index_by_track_id() {
        let (coordinator, _clock, _emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;
        coordinator.add_to_queue(track("b", 180.0)).await;
        coordinator.jump_to(1).await; // current = "b"

        // Client reports stale index 0, but "b" is still in the new queue at 0.
        coordinator
            .reorder_queue(vec![track("b", 180.0), track("a", 180.0)], 0)
            .await;

        let payload = coordinator.snapshot().await;
        assert_eq!(payload.queue[payload.current_index].id, "b");
    }

    #[tokio::test]
    async fn seek_while_paused_does_not_set_start_wall_ms() {
        let (coordinator, _clock, emitter) = harness();
        coordinator.add_to_queue(track("a", 180.0)).await;

        coordinator.seek(30.0).await;

        match last_event(&emitter) {
            ServerMessage::PlayerUpdate { is_playing, current_time, start_wall_ms } => {
                assert!(!is_playing);
                assert_eq!(current_time, 30.0);
                assert_eq!(start_wall_ms, None);
            }
            other => panic!("expected PlayerUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_computes_half_rtt_pong() {
        let (coordinator, clock, _emitter) = harness();
        coordinator.attach_session("x".into()).await;
        let client_ts = clock.now_millis() as i64 - 40;

        let pong = coordinator.ping("x", client_ts).unwrap();
        match pong {
            ServerMessage::Pong { latency,.. } => assert_eq!(latency, 20),
            other => panic!("expected Pong, got {other:?}"),
        }
    }
}
