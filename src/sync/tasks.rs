//! Owned set of background tasks for one sync session

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinSet};

/// Every timer and request loop a session spawns lands here, so teardown
/// can join or abort all of them in one place.
#[derive(Clone, Default)]
pub struct TaskSet {
    inner: Arc<Mutex<JoinSet<()>>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task, reaping any that already finished
    pub fn spawn<F>(&self, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.inner.lock();
        while set.try_join_next().is_some() {}
        set.spawn(future)
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn abort_all(&self) {
        self.inner.lock().abort_all();
    }

    /// Wait for every task to finish, aborting stragglers after `timeout`
    pub async fn drain(&self, timeout: Duration) {
        // Take the set out so the lock is never held across an await
        let mut set = std::mem::take(&mut *self.inner.lock());
        let joined = tokio::time::timeout(timeout, async {
            while let Some(res) = set.join_next().await {
                if let Err(e) = res {
                    if e.is_panic() {
                        tracing::error!(error = %e, "Sync task panicked");
                    }
                }
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!(remaining = set.len(), "Sync tasks did not stop in time, aborting");
            set.abort_all();
            while set.join_next().await.is_some() {}
        }
    }
}

impl std::fmt::Debug for TaskSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSet").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_stuck_tasks() {
        let tasks = TaskSet::new();
        tasks.spawn(async {});
        tasks.spawn(std::future::pending());

        tasks.drain(Duration::from_secs(5)).await;
        assert!(tasks.is_empty());
    }
}
