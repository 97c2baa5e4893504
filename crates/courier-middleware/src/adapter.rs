//! Collaborator seams.
//!
//! The mission controller only ever talks to these three traits.  Each backend
//! ([`RosbridgeClient`][crate::rosbridge::RosbridgeClient] for a live robot,
//! the [`sim`][crate::sim] types for headless runs) implements them.

use std::time::Duration;

use async_trait::async_trait;
use courier_types::{CourierError, GoalState, JobReport, NavGoal, Pose3D};
use tokio::sync::oneshot;

/// Handle to a goal that has been accepted by a [`NavigationExecutor`].
///
/// The executor resolves the handle exactly once with the goal's terminal
/// state.  If the executor drops its end without resolving (connection lost,
/// backend shut down) the goal reads as [`GoalState::Lost`].
#[derive(Debug)]
pub struct GoalHandle {
    goal_id: String,
    result: oneshot::Receiver<GoalState>,
}

impl GoalHandle {
    pub fn new(goal_id: impl Into<String>, result: oneshot::Receiver<GoalState>) -> Self {
        Self {
            goal_id: goal_id.into(),
            result,
        }
    }

    /// A handle that is already resolved with `state`.
    pub fn resolved(goal_id: impl Into<String>, state: GoalState) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(state);
        Self::new(goal_id, rx)
    }

    pub fn goal_id(&self) -> &str {
        &self.goal_id
    }

    /// Wait for the terminal state.
    pub async fn wait(&mut self) -> GoalState {
        (&mut self.result).await.unwrap_or(GoalState::Lost)
    }
}

/// Accepts navigation goals and reports their terminal state.
///
/// # Contract
///
/// * `wait_for_server` – returns `true` once the executor can accept goals,
///   `false` if it is still unavailable after `timeout`.
/// * `send_goal` – submits a goal; the returned [`GoalHandle`] resolves when
///   the executor reaches a terminal state.
/// * `cancel_goal` – asks the executor to abandon a previously sent goal.
#[async_trait]
pub trait NavigationExecutor: Send + Sync {
    async fn wait_for_server(&self, timeout: Duration) -> bool;

    async fn send_goal(&self, goal: &NavGoal) -> Result<GoalHandle, CourierError>;

    async fn cancel_goal(&self, goal_id: &str) -> Result<(), CourierError>;
}

/// Supplies the robot's current pose.
#[async_trait]
pub trait PoseSource: Send + Sync {
    /// Wait up to `timeout` for a fresh pose sample.  `None` means no sample
    /// arrived in time.
    async fn sample_current_pose(&self, timeout: Duration) -> Option<Pose3D>;
}

/// Receives job reports and places markers in the visualization.
#[async_trait]
pub trait MarkerService: Send + Sync {
    async fn report_job(&self, report: &JobReport) -> Result<(), CourierError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A pre-resolved handle reports its state immediately.
    #[tokio::test]
    async fn resolved_handle_yields_its_state() {
        let mut handle = GoalHandle::resolved("g-1", GoalState::Aborted);
        assert_eq!(handle.goal_id(), "g-1");
        assert_eq!(handle.wait().await, GoalState::Aborted);
    }

    /// An executor that drops its sender has lost the goal.
    #[tokio::test]
    async fn dropped_sender_reads_as_lost() {
        let (tx, rx) = oneshot::channel::<GoalState>();
        let mut handle = GoalHandle::new("g-2", rx);
        drop(tx);
        assert_eq!(handle.wait().await, GoalState::Lost);
    }
}
