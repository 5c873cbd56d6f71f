//! Listener state machine and shutdown control.
//!
//! # Responsibilities
//! - Track listener state (Idle → Serving → Closed)
//! - Deliver a sticky graceful-shutdown request to the serve loop
//! - Let `stop()` wait until the serve loop has actually returned

use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use tokio::sync::watch;

/// Listener state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not yet bound.
    Idle,
    /// Bound and accepting connections.
    Serving,
    /// Serve loop returned (stopped, failed, or never bound).
    Closed,
}

/// Shared between a listener's `start` and `stop`.
///
/// Shutdown requests are remembered by the underlying [`Handle`], so a stop
/// that races ahead of the bind still ends the serve loop as soon as it begins.
#[derive(Debug, Clone)]
pub struct ListenerControl {
    handle: Handle,
    state: Arc<watch::Sender<ListenerState>>,
    grace: Duration,
}

impl ListenerControl {
    pub fn new(grace: Duration) -> Self {
        let (tx, _) = watch::channel(ListenerState::Idle);
        Self {
            handle: Handle::new(),
            state: Arc::new(tx),
            grace,
        }
    }

    /// Handle to attach to the `axum_server` instance.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn mark_serving(&self) {
        self.state.send_replace(ListenerState::Serving);
    }

    pub fn mark_closed(&self) {
        self.state.send_replace(ListenerState::Closed);
    }

    /// Request a graceful shutdown and wait for the serve loop to leave `Serving`.
    ///
    /// In-flight connections get the grace period before being closed. Safe to
    /// call any number of times, before or after `start`.
    pub async fn shutdown(&self) {
        self.handle.graceful_shutdown(Some(self.grace));

        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only ends on a state change.
        let _ = rx.wait_for(|state| *state != ListenerState::Serving).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_before_serving_returns_immediately() {
        let control = ListenerControl::new(Duration::from_secs(1));
        assert_eq!(control.state(), ListenerState::Idle);
        control.shutdown().await;
        control.shutdown().await;
        assert_eq!(control.state(), ListenerState::Idle);
    }

    #[tokio::test]
    async fn shutdown_waits_for_close() {
        let control = ListenerControl::new(Duration::from_secs(1));
        control.mark_serving();

        let closer = control.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            closer.mark_closed();
        });

        tokio::time::timeout(Duration::from_secs(2), control.shutdown())
            .await
            .expect("shutdown should complete once the listener closes");
        assert_eq!(control.state(), ListenerState::Closed);
        task.await.unwrap();
    }
}
