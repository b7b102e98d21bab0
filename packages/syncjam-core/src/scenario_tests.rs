//! End-to-end scenario tests wiring real [`crate::client::ClientController`]s
//! up to a real [`crate::coordinator::PlaybackCoordinator`], the way a
//! reference/load-testing client would. Unit tests elsewhere in this crate
//! exercise the coordinator and the client controller in isolation; these
//! drive both together the way the protocol actually connects them, so a
//! regression in how an event's fields map onto the client's inputs (not
//! just in either side's internal logic) would show up here.

use std::sync::Arc;

use crate::client::{ClientAction, ClientController, ClientState, SimulatedMediaSink};
use crate::clock::FakeClock;
use crate::coordinator::PlaybackCoordinator;
use crate::events::test_support::RecordingEventEmitter;
use crate::protocol::{ServerMessage, MIN_PREBUFFER_S, READY_TIMEOUT_MS, SYNC_INTERVAL_MS};
use crate::queue::Track;
use crate::runtime::TokioSpawner;
use crate::session::SessionRegistry;

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

fn events_since(emitter: &RecordingEventEmitter, from: usize) -> Vec<ServerMessage> {
    emitter.events.lock()[from..].to_vec()
}

fn find_prepare_playback(events: &[ServerMessage]) -> Option<(usize, f64, u64, u64)> {
    events.iter().find_map(|e| match e {
        ServerMessage::PreparePlayback {
            track_index,
            start_time,
            server_timestamp,
            epoch,
        } => Some((*track_index, *start_time, *server_timestamp, *epoch)),
        _ => None,
    })
}

fn find_synchronized_play(events: &[ServerMessage]) -> Option<(f64, u64)> {
    events.iter().find_map(|e| match e {
        ServerMessage::SynchronizedPlay {
            start_time,
            server_timestamp,
            ..
        } => Some((*start_time, *server_timestamp)),
        _ => None,
    })
}

fn find_sync_time(events: &[ServerMessage]) -> Option<f64> {
    events.iter().find_map(|e| match e {
        ServerMessage::SyncTime { current_time, .. } => Some(*current_time),
        _ => None,
    })
}

/// Scenario 1 ("Two-client cold start"): queue has one 180s track. Client X
/// issues `play`; both clients pre-buffer, signal ready, and converge on
/// `synchronizedPlay`. After a tick of `syncTime`, both clients' simulated
/// media positions track the authoritative position within one tick period.
#[tokio::test(start_paused = true)]
async fn two_client_cold_start_converges_on_synchronized_play() {
    let (coordinator, clock, emitter) = harness();
    coordinator.add_to_queue(Track::new("a", "test", 180.0)).await;
    coordinator.attach_session("x".into()).await;
    coordinator.attach_session("y".into()).await;

    let mut mark = 0;
    coordinator.play().await.unwrap();
    let prepare_events = events_since(&emitter, mark);
    let (track_index, start_time, server_timestamp, epoch) =
        find_prepare_playback(&prepare_events).expect("preparePlayback broadcast");
    assert_eq!(track_index, 0);
    assert_eq!(start_time, 0.0);
    assert_eq!(epoch, 1);
    mark = emitter.events.lock().len();

    let sink_x = SimulatedMediaSink::new(MIN_PREBUFFER_S);
    let sink_y = SimulatedMediaSink::new(MIN_PREBUFFER_S);
    let mut client_x = ClientController::new(Arc::clone(&sink_x));
    let mut client_y = ClientController::new(Arc::clone(&sink_y));

    let now = clock.now_millis();
    client_x.on_prepare_playback(track_index, start_time, epoch, now);
    client_y.on_prepare_playback(track_index, start_time, epoch, now);

    let action_x = client_x.tick(now).or_else(|| client_x.tick(now));
    let action_y = client_y.tick(now).or_else(|| client_y.tick(now));
    assert_eq!(action_x, Some(ClientAction::SendReadyToPlay { epoch }));
    assert_eq!(action_y, Some(ClientAction::SendReadyToPlay { epoch }));

    coordinator.ready_to_play("x", epoch).await;
    // Only one of two sessions ready: the room must still be Preparing.
    let mid_events = events_since(&emitter, mark);
    assert!(find_synchronized_play(&mid_events).is_none());

    coordinator.ready_to_play("y", epoch).await;
    let converge_events = events_since(&emitter, mark);
    let (sync_start_time, sync_server_ts) =
        find_synchronized_play(&converge_events).expect("synchronizedPlay broadcast");
    mark = emitter.events.lock().len();

    let now = clock.now_millis();
    client_x.on_synchronized_play(sync_start_time, sync_server_ts, now);
    client_y.on_synchronized_play(sync_start_time, sync_server_ts, now);
    assert_eq!(client_x.state(), ClientState::Playing);
    assert_eq!(client_y.state(), ClientState::Playing);

    // Both clients started at the exact same adjusted position (no network
    // delay or latency injected in this harness).
    assert!((sink_x.current_time_s() - sink_y.current_time_s()).abs() < 1e-9);

    // Let the synchronizedPlay transition window lapse, then drive a tick.
    clock.advance(1_100);
    tokio::time::advance(std::time::Duration::from_millis(1_100)).await;
    sink_x.advance(1.1);
    sink_y.advance(1.1);

    clock.advance(SYNC_INTERVAL_MS);
    tokio::time::advance(std::time::Duration::from_millis(SYNC_INTERVAL_MS)).await;
    tokio::task::yield_now().await;

    let tick_events = events_since(&emitter, mark);
    let server_current_time = find_sync_time(&tick_events).expect("syncTime broadcast");

    let now = clock.now_millis();
    client_x.on_sync_time(server_current_time, now);
    client_y.on_sync_time(server_current_time, now);

    // Both clients track the authoritative position within one tick period.
    assert!((sink_x.current_time_s() - server_current_time).abs() < (SYNC_INTERVAL_MS as f64 / 1000.0) + 0.05);
    assert!((sink_y.current_time_s() - server_current_time).abs() < (SYNC_INTERVAL_MS as f64 / 1000.0) + 0.05);
}

/// Scenario 2 ("Stall-one ready-timeout"): client Y never signals ready.
/// After exactly `READY_TIMEOUT_MS` in Preparing, the coordinator starts
/// playback anyway, and X's controller plays while Y's never receives a
/// `synchronizedPlay` to act on.
#[tokio::test(start_paused = true)]
async fn stalled_client_does_not_block_ready_timeout_playback() {
    let (coordinator, clock, emitter) = harness();
    coordinator.add_to_queue(Track::new("a", "test", 180.0)).await;
    coordinator.attach_session("x".into()).await;
    coordinator.attach_session("y".into()).await;

    coordinator.play().await.unwrap();
    let mark = emitter.events.lock().len();

    let sink_x = SimulatedMediaSink::new(MIN_PREBUFFER_S);
    let mut client_x = ClientController::new(Arc::clone(&sink_x));
    client_x.on_prepare_playback(0, 0.0, 1, clock.now_millis());
    assert_eq!(client_x.tick(clock.now_millis()), Some(ClientAction::SendReadyToPlay { epoch: 1 }));
    coordinator.ready_to_play("x", 1).await;
    // Y never calls ready_to_play.

    clock.advance(READY_TIMEOUT_MS + 10);
    tokio::time::advance(std::time::Duration::from_millis(READY_TIMEOUT_MS + 10)).await;
    tokio::task::yield_now().await;

    let events = events_since(&emitter, mark);
    let (sync_start_time, sync_server_ts) =
        find_synchronized_play(&events).expect("synchronizedPlay after ready-timeout");

    client_x.on_synchronized_play(sync_start_time, sync_server_ts, clock.now_millis());
    assert_eq!(client_x.state(), ClientState::Playing);
}
