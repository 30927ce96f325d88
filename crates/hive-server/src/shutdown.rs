//! Shutdown of the listener, live WebSocket sessions and the hub.
//!
//! Cancelling the token stops the listener from accepting and tells every
//! session writer to send a going-away close frame. [`ShutdownCoordinator::drain`]
//! then waits for tracked sessions to finish and closes whatever subscribers
//! are still registered.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hive_broadcast::TelemetryHub;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// How long sessions get to flush their close frames.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the shutdown signal and the set of live sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
    hub: Arc<TelemetryHub>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator for sessions subscribed to `hub`.
    pub fn new(hub: Arc<TelemetryHub>) -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
            hub,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Override how long [`drain`](Self::drain) waits for sessions.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Token observed by the listener and every session.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Count `session` as live until it completes.
    pub fn track_session<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.sessions.track_future(session)
    }

    /// Sessions that have not finished yet.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Signal shutdown, wait for sessions, then close remaining subscribers.
    ///
    /// Returns how many subscribers had to be closed by the hub.
    pub async fn drain(&self) -> usize {
        self.shutdown();
        let _ = self.sessions.close();

        let pending = self.sessions.len();
        if tokio::time::timeout(self.drain_timeout, self.sessions.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.sessions.len(),
                "sessions still open after {:?}", self.drain_timeout
            );
        }

        let closed = self.hub.close_all().await;
        info!(sessions = pending, closed_subscribers = closed, "shutdown drained");
        closed
    }
}
