//! Monitor task registry - one supervised background task per run

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::AbortHandle;
use tracing::{debug, error};

use crate::error::Result;

/// How a monitor task left the registry
#[derive(Debug)]
pub enum MonitorExit {
    /// Loop reached a terminal condition on its own
    Finished,
    /// Aborted by an explicit stop or a replacing spawn
    Cancelled,
    /// Returned an error or panicked
    Failed(String),
}

struct Entry {
    /// Generation token so a supervisor only removes its own entry
    token: u64,
    abort: AbortHandle,
}

/// Process-wide map of run_id to live monitor task
///
/// Each spawn installs an abort handle and a detached supervisor that awaits
/// the task, logs the tagged exit, and removes the entry - unless a newer
/// spawn has already replaced it.
pub struct MonitorRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    next_token: AtomicU64,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Spawn a monitor for `run_id`, atomically aborting and replacing any
    /// existing one.
    pub fn spawn<F>(self: &Arc<Self>, run_id: &str, future: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let abort = handle.abort_handle();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .entries
            .lock()
            .expect("task registry lock poisoned")
            .insert(run_id.to_string(), Entry { token, abort });
        if let Some(previous) = previous {
            debug!(run_id, "replacing stale monitor task");
            previous.abort.abort();
        }

        let registry = Arc::clone(self);
        let run_id = run_id.to_string();
        tokio::spawn(async move {
            let exit = match handle.await {
                Ok(Ok(())) => MonitorExit::Finished,
                Ok(Err(err)) => MonitorExit::Failed(err.to_string()),
                Err(join_err) if join_err.is_cancelled() => MonitorExit::Cancelled,
                Err(join_err) => MonitorExit::Failed(join_err.to_string()),
            };
            registry.complete(&run_id, token, exit);
        });
    }

    fn complete(&self, run_id: &str, token: u64, exit: MonitorExit) {
        {
            let mut entries = self.entries.lock().expect("task registry lock poisoned");
            if entries.get(run_id).map(|entry| entry.token) == Some(token) {
                entries.remove(run_id);
            }
        }
        match exit {
            MonitorExit::Finished => debug!(run_id, "monitor task finished"),
            MonitorExit::Cancelled => debug!(run_id, "monitor task cancelled"),
            MonitorExit::Failed(reason) => error!(run_id, %reason, "monitor task failed"),
        }
    }

    /// Abort the monitor for `run_id`, if one is live. Returns whether a
    /// task was actually cancelled.
    pub fn cancel(&self, run_id: &str) -> bool {
        let entry = self
            .entries
            .lock()
            .expect("task registry lock poisoned")
            .remove(run_id);
        match entry {
            Some(entry) => {
                entry.abort.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, run_id: &str) -> bool {
        self.entries
            .lock()
            .expect("task registry lock poisoned")
            .contains_key(run_id)
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .lock()
            .expect("task registry lock poisoned")
            .len()
    }
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn finished_task_removes_itself() {
        let registry = Arc::new(MonitorRegistry::new());
        registry.spawn("run-1", async { Ok(()) });
        wait_until(|| !registry.is_active("run-1")).await;
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn cancel_aborts_a_sleeping_task() {
        let registry = Arc::new(MonitorRegistry::new());
        registry.spawn("run-1", async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        assert!(registry.is_active("run-1"));
        assert!(registry.cancel("run-1"));
        assert!(!registry.is_active("run-1"));
        assert!(!registry.cancel("run-1"));
    }

    #[tokio::test]
    async fn respawn_replaces_previous_task() {
        let registry = Arc::new(MonitorRegistry::new());
        registry.spawn("run-1", async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        registry.spawn("run-1", async {
            sleep(Duration::from_millis(20)).await;
            Ok(())
        });
        assert_eq!(registry.active_count(), 1);

        // The replacement finishes and cleans up; the aborted first task's
        // supervisor must not remove the newer generation beforehand.
        wait_until(|| !registry.is_active("run-1")).await;
    }

    #[tokio::test]
    async fn failed_task_is_removed_too() {
        let registry = Arc::new(MonitorRegistry::new());
        registry.spawn("run-1", async {
            Err(crate::error::RunnerError::WalletNotConnected)
        });
        wait_until(|| !registry.is_active("run-1")).await;
    }
}
