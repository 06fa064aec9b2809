//! A group of cancellable tasks with a three-phase shutdown:
//! signal the cancel token, close the tracker, wait for completion.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub struct TaskPool {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl TaskPool {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// The token tasks should select on to observe shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Cancels every task and blocks until all of them have finished.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_stops_a_looping_task() {
        let pool = TaskPool::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let cancel = pool.cancel_token();
        let flag = stopped.clone();
        pool.spawn(async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::Release);
        });
        pool.shutdown().await;
        assert!(stopped.load(Ordering::Acquire));
    }
}
