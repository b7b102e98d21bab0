//! Task spawning abstraction for runtime independence.
//!
//! Services spawn background work (the sync ticker, ready-timeouts, the
//! post-navigation delay) through this trait rather than calling
//! `tokio::spawn` directly, so tests can swap in a spawner that tracks
//! handles instead of firing-and-forgetting them.

use std::future::Future;

/// Abstraction for spawning background tasks.
///
/// The coordinator is generic over a concrete `S: TaskSpawner`, never
/// `Arc<dyn TaskSpawner>`, so this stays a plain generic method rather than
/// carrying object-safe, boxed-future machinery no caller needs.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner for the standalone server.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
