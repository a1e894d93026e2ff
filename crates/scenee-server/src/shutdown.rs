//! Graceful shutdown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the root token every session token descends from.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire shutdown; every session observes it on its next poll.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire shutdown, stop `tasks` from accepting new work, and wait up to
    /// `timeout` for the tracked tasks to finish.
    ///
    /// Returns `false` if the wait timed out.
    pub async fn drain(&self, tasks: &TaskTracker, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        let _ = tasks.close();
        info!(tasks = tasks.len(), timeout_secs = timeout.as_secs(), "draining tasks");

        let finished = tokio::time::timeout(timeout, tasks.wait()).await.is_ok();
        if !finished {
            warn!(?timeout, remaining = tasks.len(), "drain timed out, some tasks are still running");
        }
        finished
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
