//! SyncJam Core - shared library for the synchronized listening-room server.
//!
//! This crate provides the server-authoritative coordinator that keeps a
//! room of browser clients playing the same track at (approximately) the
//! same position, plus the transport layer (WebSocket + HTTP) that exposes
//! it. It is designed to be used by the standalone `syncjam-server` binary;
//! nothing here depends on a particular deployment shape.
//!
//! # Architecture
//!
//! - [`clock`]: monotonic time source, fakeable for deterministic tests
//! - [`runtime`]: task-spawning abstraction for runtime independence
//! - [`session`]: the Session Registry (connected clients, latency, readiness)
//! - [`queue`]: the Queue & Track model
//! - [`room`]: the authoritative playback mode/position state machine
//! - [`coordinator`]: the Playback Coordinator, tying room + sessions + sync
//!   ticker together behind guarded commands
//! - [`client`]: a reference `ClientController` implementation of the
//!   client-side drift-correction state machine, used in tests and as a
//!   model for real browser clients
//! - [`protocol`]: wire constants and the `ClientMessage`/`ServerMessage` types
//! - [`events`]: decouples the coordinator from the transport layer
//! - [`resolver`]: external audio-URL resolution
//! - [`snapshot`]: best-effort persistence of room state across restarts
//! - [`error`]: centralized error types
//! - [`api`]: HTTP/WebSocket transport layer
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple the coordinator from any
//! particular production backend:
//!
//! - [`Clock`](clock::Clock): time source
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): emitting room events
//! - [`AudioUrlResolver`](resolver::AudioUrlResolver): catalog id -> playable URL
//! - [`SnapshotStore`](snapshot::SnapshotStore): room-state persistence
//!
//! Each trait has a production implementation suitable for the standalone
//! server, and a fake/recording implementation used by tests.

pub mod api;
pub mod client;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod protocol;
pub mod queue;
pub mod resolver;
pub mod room;
pub mod runtime;
pub mod session;
pub mod snapshot;

#[cfg(test)]
mod scenario_tests;

// Re-export commonly used types at the crate root.
pub use client::{ClientAction, ClientController, ClientState, MediaSink};
pub use clock::{Clock, FakeClock, SystemClock};
pub use coordinator::{CommandRejected, PlaybackCoordinator};
pub use error::{ErrorCode, SyncJamError, SyncJamResult};
pub use events::{BroadcastEventEmitter, EventEmitter, LoggingEventEmitter, NoopEventEmitter};
pub use protocol::{ClientMessage, RoomStatePayload, ServerMessage};
pub use queue::{Queue, RemovalEffect, Track};
pub use resolver::{
    AudioUrlResolver, HttpCatalogResolver, ResolvedAudio, ResolverError, UnconfiguredResolver,
};
pub use room::{RoomMode, RoomState};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{ClientSession, SessionId, SessionRegistry};
pub use snapshot::{FileSnapshotStore, InMemorySnapshotStore, RoomSnapshot, SnapshotMode, SnapshotStore};

// Re-export API types.
pub use api::{start_server, AppState, AppStateBuilder, ServerError};

/// The concrete [`PlaybackCoordinator`] instantiation used by the standalone
/// server: real wall-clock time, a Tokio-backed spawner, and a broadcast
/// channel fanning events out to every connected websocket.
pub type ProdCoordinator = PlaybackCoordinator<SystemClock, TokioSpawner, BroadcastEventEmitter>;
