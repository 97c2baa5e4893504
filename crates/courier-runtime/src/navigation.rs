//! Drives a single navigation goal to completion.
//!
//! [`NavigationDriver`] wraps a [`NavigationExecutor`] and turns its terminal
//! states into a binary [`NavigationOutcome`].  Only
//! [`GoalState::Succeeded`][courier_types::GoalState::Succeeded] counts as
//! success; every other terminal state, a send failure, a lost connection and
//! a result timeout are all [`NavigationOutcome::Failed`].

use std::sync::Arc;
use std::time::Duration;

use courier_middleware::NavigationExecutor;
use courier_types::{NavGoal, NavigationOutcome};
use tracing::{debug, info, instrument, warn};

/// Where the driver is in its per-goal lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    GoalSent,
    Finished(NavigationOutcome),
}

pub struct NavigationDriver {
    executor: Arc<dyn NavigationExecutor>,
    state: DriverState,
}

impl NavigationDriver {
    pub fn new(executor: Arc<dyn NavigationExecutor>) -> Self {
        Self {
            executor,
            state: DriverState::Idle,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Block until the executor accepts goals, polling every `poll_interval`.
    ///
    /// There is no upper bound: without an executor the mission cannot start.
    pub async fn wait_until_ready(&self, poll_interval: Duration) {
        let mut attempts: u64 = 0;
        while !self.executor.wait_for_server(poll_interval).await {
            attempts += 1;
            info!(attempts, "waiting for the move_base action server to come up");
        }
        info!("move_base action server is available");
    }

    /// Send `goal` and wait for its terminal state.
    ///
    /// With `timeout` set, a goal that has not finished in time is cancelled
    /// and reported as failed.  With `None` the wait is unbounded.
    #[instrument(
        skip(self, goal),
        fields(frame = %goal.frame_id, x = goal.pose.position.x, y = goal.pose.position.y)
    )]
    pub async fn execute_goal(
        &mut self,
        goal: &NavGoal,
        timeout: Option<Duration>,
    ) -> NavigationOutcome {
        self.state = DriverState::Idle;

        let mut handle = match self.executor.send_goal(goal).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "failed to send navigation goal");
                return self.finish(NavigationOutcome::Failed);
            }
        };
        self.state = DriverState::GoalSent;
        debug!(goal_id = handle.goal_id(), "navigation goal sent");

        let terminal = match timeout {
            None => handle.wait().await,
            Some(limit) => match tokio::time::timeout(limit, handle.wait()).await {
                Ok(state) => state,
                Err(_) => {
                    warn!(
                        goal_id = handle.goal_id(),
                        timeout_ms = limit.as_millis() as u64,
                        "goal did not finish in time; cancelling"
                    );
                    if let Err(e) = self.executor.cancel_goal(handle.goal_id()).await {
                        warn!(error = %e, "goal cancel failed");
                    }
                    return self.finish(NavigationOutcome::Failed);
                }
            },
        };

        let outcome = NavigationOutcome::from(terminal);
        if outcome == NavigationOutcome::Failed {
            info!(goal_id = handle.goal_id(), state = ?terminal, "goal ended without success");
        }
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: NavigationOutcome) -> NavigationOutcome {
        self.state = DriverState::Finished(outcome);
        outcome
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
