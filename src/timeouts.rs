//! Keyed, cancellable delayed tasks.
//!
//! Two tasks exist per seated user: task 101 force-kicks a user stuck in the
//! queue, task 102 force-ends a battle that never reported back. Scheduling
//! under an existing key supersedes the prior task; cancellation is keyed the
//! same way.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Queue idle kick.
pub const TASK_QUEUE_KICK: u32 = 101;
/// Battle turn-off.
pub const TASK_BATTLE_OFF: u32 = 102;

/// Scheduler for per-user delayed actions.
#[derive(Clone, Default)]
pub struct DelayTaskScheduler {
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
}

impl DelayTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay`. An existing schedule under the same key is
    /// aborted first.
    pub fn schedule<F, Fut>(&self, key: String, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        if let Some((_, old)) = self.tasks.remove(&key) {
            old.abort();
            debug!(key, "superseded delayed task");
        }

        let tasks = self.tasks.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action().await;
            tasks.remove(&task_key);
        });
        self.tasks.insert(key, handle);
    }

    /// Abort the schedule under `key`. Returns whether one existed.
    pub fn cancel(&self, key: &str) -> bool {
        if let Some((_, handle)) = self.tasks.remove(key) {
            handle.abort();
            debug!(key, "cancelled delayed task");
            true
        } else {
            false
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}
