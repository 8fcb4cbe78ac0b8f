use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Tracks the service's background tasks (one per adapter connection plus
/// the fallback poller) and tears them down on shutdown.
///
/// Shutdown first waits a grace period for each task to observe the
/// shutdown signal and close its socket, then aborts whatever is left.
pub struct TaskSupervisor {
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor { tasks: Vec::new() }
    }

    /// Spawn a background task and register it for shutdown.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);
        info!("Spawned background task: {}", name);
        self.tasks.push((name, handle));
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Join every task, aborting those that outlive the grace period.
    pub async fn shutdown_all(&mut self, grace: Duration) {
        info!("Shutting down {} background tasks", self.tasks.len());

        for (name, mut handle) in self.tasks.drain(..) {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("Task {} did not stop within grace period, aborting", name);
                handle.abort();
            }
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
