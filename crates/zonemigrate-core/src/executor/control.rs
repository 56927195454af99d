//! Cooperative pause / cancel signalling for the executor
//!
//! The executor checks the control state between operations only; an
//! in-flight provider call always runs to completion.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Requested run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Running,
    Paused,
    Cancelled,
}

/// Cloneable handle used to pause, resume or cancel a running execution
///
/// Cancellation is terminal: once cancelled, `resume` has no effect.
#[derive(Debug, Clone)]
pub struct ExecutionControl {
    tx: Arc<watch::Sender<ControlState>>,
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.transition(ControlState::Paused);
    }

    pub fn resume(&self) {
        self.transition(ControlState::Running);
    }

    pub fn cancel(&self) {
        self.transition(ControlState::Cancelled);
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ControlState::Paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ControlState::Cancelled
    }

    fn transition(&self, next: ControlState) {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Cancelled || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Wait until the run may proceed
    ///
    /// Returns immediately when running. While paused, blocks on the next
    /// state change without polling.
    ///
    /// # Returns
    ///
    /// `false` if the run was cancelled, `true` otherwise
    pub async fn wait_until_runnable(&self) -> bool {
        let mut rx = self.tx.subscribe();
        let runnable = match rx.wait_for(|state| *state != ControlState::Paused).await {
            Ok(state) => *state != ControlState::Cancelled,
            // The sender lives in `self`, so it cannot be dropped here
            Err(_) => false,
        };
        runnable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_running_proceeds_immediately() {
        let control = ExecutionControl::new();
        assert!(control.wait_until_runnable().await);
    }

    #[tokio::test]
    async fn test_pause_blocks_until_resume() {
        let control = ExecutionControl::new();
        control.pause();

        let waiter = control.clone();
        let handle = tokio::spawn(async move { waiter.wait_until_runnable().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        control.resume();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_releases_paused_waiter() {
        let control = ExecutionControl::new();
        control.pause();

        let waiter = control.clone();
        let handle = tokio::spawn(async move { waiter.wait_until_runnable().await });

        control.cancel();
        assert!(!handle.await.unwrap());
    }

    #[test]
    fn test_cancel_is_terminal() {
        let control = ExecutionControl::new();
        control.cancel();
        control.resume();
        assert!(control.is_cancelled());
    }
}
