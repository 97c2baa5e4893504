//! In-process backend used for headless runs and tests.
//!
//! [`SimRobot`] holds the simulated robot's pose.  [`SimNavigator`] "drives"
//! it to each goal after a configurable travel time, [`SimOdometry`] publishes
//! its pose on an [`OdometryFeed`], and [`SimMarkerService`] records every job
//! report it receives.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_types::{CourierError, GoalState, JobReport, NavGoal, Pose3D, WaypointName};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::adapter::{GoalHandle, MarkerService, NavigationExecutor};
use crate::feed::OdometryFeed;
use crate::lock;

// ────────────────────────────────────────────────────────────────────────────
// SimRobot
// ────────────────────────────────────────────────────────────────────────────

/// Shared pose of the simulated robot. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct SimRobot {
    pose: Arc<Mutex<Pose3D>>,
}

impl SimRobot {
    pub fn at(pose: Pose3D) -> Self {
        Self {
            pose: Arc::new(Mutex::new(pose)),
        }
    }

    pub fn pose(&self) -> Pose3D {
        *lock(&self.pose)
    }

    pub fn teleport(&self, pose: Pose3D) {
        *lock(&self.pose) = pose;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimNavigator
// ────────────────────────────────────────────────────────────────────────────

type InFlight = Arc<Mutex<HashMap<String, oneshot::Sender<GoalState>>>>;

/// Scripted navigation executor.
///
/// Each sent goal takes the next state from the script (default
/// [`GoalState::Succeeded`] once the script is exhausted) and resolves after
/// `travel_time`.  A succeeded goal moves the [`SimRobot`] to the goal pose.
#[derive(Debug)]
pub struct SimNavigator {
    robot: SimRobot,
    script: Mutex<VecDeque<GoalState>>,
    travel_time: Duration,
    unready_polls: AtomicU32,
    next_id: AtomicU64,
    in_flight: InFlight,
    sent: Mutex<Vec<NavGoal>>,
    cancelled: Mutex<Vec<String>>,
}

impl SimNavigator {
    pub fn new(robot: SimRobot) -> Self {
        Self {
            robot,
            script: Mutex::new(VecDeque::new()),
            travel_time: Duration::ZERO,
            unready_polls: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            sent: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Terminal states handed out to successive goals, in order.
    pub fn with_outcomes(self, states: impl IntoIterator<Item = GoalState>) -> Self {
        lock(&self.script).extend(states);
        self
    }

    pub fn with_travel_time(mut self, travel_time: Duration) -> Self {
        self.travel_time = travel_time;
        self
    }

    /// Report "not ready" for the first `polls` calls to `wait_for_server`.
    pub fn with_unready_polls(self, polls: u32) -> Self {
        self.unready_polls.store(polls, Ordering::SeqCst);
        self
    }

    /// Every goal received so far, in order.
    pub fn sent_goals(&self) -> Vec<NavGoal> {
        lock(&self.sent).clone()
    }

    /// Ids of every goal a cancel was requested for.
    pub fn cancelled(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }
}

#[async_trait]
impl NavigationExecutor for SimNavigator {
    async fn wait_for_server(&self, timeout: Duration) -> bool {
        let still_starting = self
            .unready_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if still_starting {
            tokio::time::sleep(timeout).await;
            return false;
        }
        true
    }

    async fn send_goal(&self, goal: &NavGoal) -> Result<GoalHandle, CourierError> {
        let state = lock(&self.script).pop_front().unwrap_or(GoalState::Succeeded);
        let goal_id = format!("sim-goal-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.sent).push(goal.clone());

        let (tx, rx) = oneshot::channel();
        lock(&self.in_flight).insert(goal_id.clone(), tx);

        let in_flight = Arc::clone(&self.in_flight);
        let robot = self.robot.clone();
        let target = goal.pose;
        let travel_time = self.travel_time;
        let id = goal_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(travel_time).await;
            let Some(tx) = lock(&in_flight).remove(&id) else {
                return;
            };
            if state == GoalState::Succeeded {
                robot.teleport(target);
            }
            debug!(goal_id = %id, state = ?state, "sim goal finished");
            let _ = tx.send(state);
        });

        Ok(GoalHandle::new(goal_id, rx))
    }

    async fn cancel_goal(&self, goal_id: &str) -> Result<(), CourierError> {
        lock(&self.cancelled).push(goal_id.to_string());
        if let Some(tx) = lock(&self.in_flight).remove(goal_id) {
            let _ = tx.send(GoalState::Preempted);
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimOdometry
// ────────────────────────────────────────────────────────────────────────────

/// Background task publishing the [`SimRobot`] pose at a fixed period.
/// The task stops when this value is dropped.
#[derive(Debug)]
pub struct SimOdometry {
    task: JoinHandle<()>,
}

impl SimOdometry {
    pub fn spawn(robot: SimRobot, feed: OdometryFeed, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                feed.publish(robot.pose());
            }
        });
        Self { task }
    }
}

impl Drop for SimOdometry {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimMarkerService
// ────────────────────────────────────────────────────────────────────────────

/// Records job reports; can be told to reject reports for given waypoints.
#[derive(Debug, Default)]
pub struct SimMarkerService {
    attempts: Mutex<Vec<JobReport>>,
    failing: HashSet<String>,
}

impl SimMarkerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every report whose job tag is `name`.
    pub fn failing_on(mut self, name: WaypointName) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Every report received, accepted or not, in arrival order.
    pub fn attempts(&self) -> Vec<JobReport> {
        lock(&self.attempts).clone()
    }

    /// Reports that were accepted.
    pub fn delivered(&self) -> Vec<JobReport> {
        lock(&self.attempts)
            .iter()
            .filter(|r| !self.failing.contains(&r.job))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MarkerService for SimMarkerService {
    async fn report_job(&self, report: &JobReport) -> Result<(), CourierError> {
        lock(&self.attempts).push(report.clone());
        if self.failing.contains(&report.job) {
            return Err(CourierError::ServiceCall {
                service: "sim/job_request".to_string(),
                details: format!("marker for {} rejected", report.job),
            });
        }
        let p = report.pose.position;
        info!(job = %report.job, x = p.x, y = p.y, z = p.z, "sim marker placed");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
