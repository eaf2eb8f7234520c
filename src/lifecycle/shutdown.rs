//! Shutdown coordination for the daemon.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A named task awaited during shutdown.
pub type Task = (&'static str, JoinHandle<()>);

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for `tasks` to finish, aborting whatever is left after `deadline`.
    pub async fn drain(&self, tasks: Vec<Task>, deadline: Duration) {
        let drained = tokio::time::timeout(deadline, async {
            for (name, task) in tasks {
                if let Err(e) = task.await {
                    tracing::error!(task = name, error = %e, "Task ended abnormally");
                } else {
                    tracing::debug!(task = name, "Task drained");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(deadline = ?deadline, "Shutdown deadline exceeded, abandoning remaining tasks");
        }
    }
}

/// Stop each stage in turn: signal it, then wait for its tasks.
///
/// Stages that publish events must come before the stages consuming them.
pub async fn stop_in_order(stages: Vec<(Shutdown, Vec<Task>)>, deadline: Duration) {
    for (shutdown, tasks) in stages {
        shutdown.trigger();
        shutdown.drain(tasks, deadline).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
