//! Snapshot store: best-effort persistence of room state across restarts.
//!
//! Only `queue`, `current_index`, `mode`, and `current_time` are persisted —
//! session registrations are never restored; sessions are ephemeral
//! and must always reconnect fresh. Absence of a snapshot, or a
//! store that's down, is not an error: the coordinator simply starts from
//! an empty `Idle` room, rebuilt from scratch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::queue::Track;

/// Playback mode as persisted in a snapshot. `Preparing` collapses to
/// `Paused` on save: an in-flight ready-convergence has no well-defined
/// restored meaning (the epoch and session readiness it depended on are
/// gone), so it is always safer to resume paused than to guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotMode {
    Idle,
    Playing,
    Paused,
}

/// Persisted room state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub queue: Vec<Track>,
    pub current_index: usize,
    pub mode: SnapshotMode,
    pub current_time: f64,
}

/// Best-effort persistence for [`RoomSnapshot`].
///
/// Implementations must not block the coordinator's command loop for long:
/// a slow or unavailable store degrades to memory-only operation.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the most recently stored snapshot, if any and still fresh.
    async fn get(&self) -> Option<RoomSnapshot>;
    /// Persists a snapshot, overwriting any previous one.
    async fn set(&self, snapshot: RoomSnapshot);
}

/// In-process, in-memory implementation with a roughly 24-hour TTL.
/// Nothing is written to disk; this exists so the server survives an
/// in-process restart path (e.g. a supervised respawn) without external
/// infrastructure, not to survive a host reboot.
pub struct InMemorySnapshotStore {
    ttl: std::time::Duration,
    state: parking_lot::Mutex<Option<(std::time::Instant, RoomSnapshot)>>,
}

/// Default snapshot freshness window.
pub const SNAPSHOT_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

impl InMemorySnapshotStore {
    /// Creates an empty store using [`SNAPSHOT_TTL`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(SNAPSHOT_TTL)
    }

    /// Creates an empty store with a custom TTL (mainly for tests).
    #[must_use]
    pub fn with_ttl(ttl: std::time::Duration) -> Self {
        Self {
            ttl,
            state: parking_lot::Mutex::new(None),
        }
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get(&self) -> Option<RoomSnapshot> {
        let guard = self.state.lock();
        match guard.as_ref() {
            Some((stored_at, snapshot)) if stored_at.elapsed() < self.ttl => Some(snapshot.clone()),
            _ => None,
        }
    }

    async fn set(&self, snapshot: RoomSnapshot) {
        *self.state.lock() = Some((std::time::Instant::now(), snapshot));
    }
}

/// File name the snapshot is persisted under inside a configured data
/// directory.
const SNAPSHOT_FILE: &str = "room_snapshot.json";

/// File-backed [`SnapshotStore`]: a local JSON file under a configured data
/// directory stands in for a remote key-value store, so the "hydrate at
/// startup if non-empty" lifecycle is exercisable without standing up
/// external infrastructure. Writes go through a temp-file-then-rename so a
/// crash mid-write never leaves a corrupt snapshot behind.
pub struct FileSnapshotStore {
    dir: std::path::PathBuf,
    ttl: std::time::Duration,
}

impl FileSnapshotStore {
    /// Creates a store that persists under `dir`, using [`SNAPSHOT_TTL`].
    #[must_use]
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self::with_ttl(dir, SNAPSHOT_TTL)
    }

    /// Creates a store with a custom TTL (mainly for tests).
    #[must_use]
    pub fn with_ttl(dir: impl Into<std::path::PathBuf>, ttl: std::time::Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    fn read_sync(dir: &std::path::Path, ttl: std::time::Duration) -> Option<RoomSnapshot> {
        let path = dir.join(SNAPSHOT_FILE);
        let metadata = std::fs::metadata(&path).ok()?;
        let modified = metadata.modified().ok()?;
        if modified.elapsed().unwrap_or(ttl) >= ttl {
            return None;
        }
        let contents = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn write_sync(dir: &std::path::Path, snapshot: &RoomSnapshot) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SNAPSHOT_FILE);
        let temp_path = dir.join("room_snapshot.json.tmp");
        let contents = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &path)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get(&self) -> Option<RoomSnapshot> {
        let dir = self.dir.clone();
        let ttl = self.ttl;
        tokio::task::spawn_blocking(move || Self::read_sync(&dir, ttl))
            .await
            .unwrap_or(None)
    }

    async fn set(&self, snapshot: RoomSnapshot) {
        let dir = self.dir.clone();
        match tokio::task::spawn_blocking(move || Self::write_sync(&dir, &snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[snapshot] failed to persist room snapshot: {e}"),
            Err(e) => log::warn!("[snapshot] write task panicked: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RoomSnapshot {
        RoomSnapshot {
            queue: vec![Track::new("a", "test", 180.0)],
            current_index: 0,
            mode: SnapshotMode::Paused,
            current_time: 12.5,
        }
    }

    #[tokio::test]
    async fn empty_store_returns_none() {
        let store = InMemorySnapshotStore::new();
        assert_eq!(store.get().await, None);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemorySnapshotStore::new();
        store.set(snapshot()).await;
        assert_eq!(store.get().await, Some(snapshot()));
    }

    #[tokio::test]
    async fn expired_snapshot_is_absent_not_an_error() {
        let store = InMemorySnapshotStore::with_ttl(std::time::Duration::from_millis(1));
        store.set(snapshot()).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.get().await, None);
    }

    #[tokio::test]
    async fn file_store_empty_directory_returns_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert_eq!(store.get().await, None);
    }

    #[tokio::test]
    async fn file_store_set_then_get_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.set(snapshot()).await;
        assert_eq!(store.get().await, Some(snapshot()));
    }

    #[tokio::test]
    async fn file_store_survives_across_instances() {
        // Simulates a process restart: a fresh `FileSnapshotStore` pointed
        // at the same directory picks up what the previous one wrote.
        let dir = tempfile::TempDir::new().unwrap();
        FileSnapshotStore::new(dir.path()).set(snapshot()).await;
        let restarted = FileSnapshotStore::new(dir.path());
        assert_eq!(restarted.get().await, Some(snapshot()));
    }

    #[tokio::test]
    async fn file_store_expired_snapshot_is_absent() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileSnapshotStore::with_ttl(dir.path(), std::time::Duration::from_millis(1));
        store.set(snapshot()).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.get().await, None);
    }
}
