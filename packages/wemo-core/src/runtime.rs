//! Task spawning abstraction.
//!
//! Background work (one synchronizer per bound appliance, the discovery loop)
//! is spawned through [`TaskSpawner`] so tests and the server can share the
//! same code paths. [`TokioSpawner`] additionally tracks its tasks so shutdown
//! can wait for them to wind down.

use std::future::Future;

use tokio_util::task::TaskTracker;

/// Abstraction for spawning background tasks.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    ///
    /// The task runs independently of the caller. Cancellation is the
    /// caller's job (typically via a `CancellationToken` the future observes).
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Waits for spawned tasks to wind down once they have been cancelled.
    ///
    /// Spawners that do not track their tasks return immediately.
    fn shutdown(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Tokio-based spawner that tracks every task it starts.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
    tracker: TaskTracker,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            tracker: TaskTracker::new(),
        }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Number of tracked tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(future, &self.handle);
    }

    /// Stops accepting new tasks and waits for the running ones to finish.
    fn shutdown(&self) -> impl Future<Output = ()> + Send {
        self.tracker.close();
        let tracker = self.tracker.clone();
        async move { tracker.wait().await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn tokio_spawner_executes_task() {
        let spawner = TokioSpawner::current();
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        spawner.spawn(async move {
            executed_clone.store(true, Ordering::SeqCst);
        });

        spawner.shutdown().await;
        assert!(executed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_cancelled_tasks() {
        let spawner = TokioSpawner::current();
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            let token = cancel.child_token();
            spawner.spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                }
            });
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(spawner.active_tasks(), 3);

        cancel.cancel();
        spawner.shutdown().await;
        assert_eq!(spawner.active_tasks(), 0);
    }
}
