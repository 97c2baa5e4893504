//! The pickup / drop-off mission.
//!
//! [`MissionController::run`] executes the fixed sequence:
//!
//! 1. Wait for the navigation executor.
//! 2. Report a `Startup` marker at the pickup zone.
//! 3. Drive to the pickup zone; on arrival report a `Pickup` marker at the
//!    container pose derived from live odometry.
//! 4. Wait for the load delay.
//! 5. Drive to the drop-off zone; on arrival report a `DropOff` marker.
//!
//! Failures never abort the mission: a failed leg skips its report, a
//! rejected report is logged, and the sequence carries on.

use std::sync::Arc;
use std::time::Duration;

use courier_middleware::{MarkerService, NavigationExecutor, PoseSource};
use courier_perception::{derive_container_pose, quaternion_to_rpy};
use courier_types::{JobReport, NavigationOutcome, Waypoint, WaypointName};
use tracing::{error, info, instrument, warn};

use crate::goal::{GoalBuilder, GoalSpec};
use crate::navigation::NavigationDriver;

/// Distance from the robot's base frame back to the container, in metres.
pub const CONTAINER_OFFSET_M: f64 = 0.25;

// ────────────────────────────────────────────────────────────────────────────
// Plan
// ────────────────────────────────────────────────────────────────────────────

/// Coordinates and timings for one mission.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionPlan {
    /// Where the `Startup` marker is placed.
    pub startup_marker: GoalSpec,
    pub pickup: GoalSpec,
    pub dropoff: GoalSpec,
    /// Pause at the pickup zone while the robot is loaded.
    pub load_delay: Duration,
    pub container_offset: f64,
    pub odometry_timeout: Duration,
    /// Interval between executor readiness polls.
    pub readiness_poll: Duration,
    /// Upper bound on a single navigation leg.  `None` waits forever.
    pub result_timeout: Option<Duration>,
}

impl Default for MissionPlan {
    fn default() -> Self {
        Self {
            startup_marker: GoalSpec::planar(9.0, -2.0, 0.2, 1.15707),
            pickup: GoalSpec::planar(9.0, -2.0, 0.0, 1.15707),
            dropoff: GoalSpec::planar(-0.3, -0.5, 0.0, -1.15707),
            load_delay: Duration::from_secs(5),
            container_offset: CONTAINER_OFFSET_M,
            odometry_timeout: Duration::from_secs(5),
            readiness_poll: Duration::from_secs(5),
            result_timeout: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Summary
// ────────────────────────────────────────────────────────────────────────────

/// What happened to the job report of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Delivered,
    /// The marker service returned an error.
    Rejected,
    /// Navigation succeeded but no odometry sample arrived in time.
    SkippedNoOdometry,
    /// Navigation failed, so no report was due.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub waypoint: WaypointName,
    /// `None` for steps that involve no driving (the startup marker).
    pub navigation: Option<NavigationOutcome>,
    pub report: ReportStatus,
}

/// Per-step record of a finished mission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionSummary {
    pub steps: Vec<StepRecord>,
}

impl MissionSummary {
    pub fn step(&self, waypoint: WaypointName) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.waypoint == waypoint)
    }

    pub fn reports_delivered(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.report == ReportStatus::Delivered)
            .count()
    }

    pub fn waypoints_reached(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.navigation == Some(NavigationOutcome::Succeeded))
            .count()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

pub struct MissionController {
    driver: NavigationDriver,
    poses: Arc<dyn PoseSource>,
    markers: Arc<dyn MarkerService>,
    goals: GoalBuilder,
    plan: MissionPlan,
}

impl MissionController {
    pub fn new(
        executor: Arc<dyn NavigationExecutor>,
        poses: Arc<dyn PoseSource>,
        markers: Arc<dyn MarkerService>,
        plan: MissionPlan,
    ) -> Self {
        Self {
            driver: NavigationDriver::new(executor),
            poses,
            markers,
            goals: GoalBuilder::default(),
            plan,
        }
    }

    pub fn plan(&self) -> &MissionPlan {
        &self.plan
    }

    /// Run the whole mission once.  Always returns a summary; individual step
    /// failures are recorded, not propagated.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> MissionSummary {
        let mut summary = MissionSummary::default();

        self.driver.wait_until_ready(self.plan.readiness_poll).await;

        let startup = self
            .goals
            .build_waypoint(WaypointName::Startup, self.plan.startup_marker);
        let report = self
            .report(JobReport::new(WaypointName::Startup, startup.goal.pose))
            .await;
        summary.steps.push(StepRecord {
            waypoint: WaypointName::Startup,
            navigation: None,
            report,
        });

        let pickup = self
            .goals
            .build_waypoint(WaypointName::Pickup, self.plan.pickup);
        summary.steps.push(self.travel_to(&pickup).await);

        info!(delay_ms = self.plan.load_delay.as_millis() as u64, "loading at pickup zone");
        tokio::time::sleep(self.plan.load_delay).await;

        let dropoff = self
            .goals
            .build_waypoint(WaypointName::DropOff, self.plan.dropoff);
        summary.steps.push(self.travel_to(&dropoff).await);

        info!(
            reached = summary.waypoints_reached(),
            delivered = summary.reports_delivered(),
            "mission finished"
        );
        summary
    }

    /// Drive to `waypoint` and, on arrival, report the container pose.
    #[instrument(skip(self, waypoint), fields(waypoint = %waypoint.name))]
    pub async fn travel_to(&mut self, waypoint: &Waypoint) -> StepRecord {
        let target = waypoint.goal.pose;
        info!(
            x = target.position.x,
            y = target.position.y,
            yaw = quaternion_to_rpy(target.orientation).yaw,
            "moving to {} zone",
            waypoint.name
        );

        let outcome = self
            .driver
            .execute_goal(&waypoint.goal, self.plan.result_timeout)
            .await;

        let report = match outcome {
            NavigationOutcome::Failed => {
                warn!("failed to reach {} zone; moving on", waypoint.name);
                ReportStatus::NotAttempted
            }
            NavigationOutcome::Succeeded => {
                info!("arrived at {} zone", waypoint.name);
                match self.poses.sample_current_pose(self.plan.odometry_timeout).await {
                    Some(robot) => {
                        let container = derive_container_pose(&robot, self.plan.container_offset);
                        self.report(JobReport::new(waypoint.name, container)).await
                    }
                    None => {
                        warn!(
                            timeout_ms = self.plan.odometry_timeout.as_millis() as u64,
                            "no odometry after arrival; skipping {} report",
                            waypoint.name
                        );
                        ReportStatus::SkippedNoOdometry
                    }
                }
            }
        };

        StepRecord {
            waypoint: waypoint.name,
            navigation: Some(outcome),
            report,
        }
    }

    async fn report(&self, report: JobReport) -> ReportStatus {
        let p = report.pose.position;
        match self.markers.report_job(&report).await {
            Ok(()) => {
                info!(job = %report.job, x = p.x, y = p.y, z = p.z, "job report delivered");
                ReportStatus::Delivered
            }
            Err(e) => {
                error!(job = %report.job, error = %e, "job report failed; continuing");
                ReportStatus::Rejected
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_middleware::{OdometryFeed, SimMarkerService, SimNavigator, SimOdometry, SimRobot};
    use courier_perception::{OdometrySampler, rpy_to_quaternion};
    use courier_types::{GoalState, Point3, Pose3D};

    /// Pose source with a fixed answer.
    struct FixedPose(Option<Pose3D>);

    #[async_trait]
    impl PoseSource for FixedPose {
        async fn sample_current_pose(&self, _timeout: Duration) -> Option<Pose3D> {
            self.0
        }
    }

    fn fast_plan() -> MissionPlan {
        MissionPlan {
            load_delay: Duration::from_millis(1),
            odometry_timeout: Duration::from_millis(500),
            readiness_poll: Duration::from_millis(1),
            result_timeout: Some(Duration::from_secs(5)),
            ..MissionPlan::default()
        }
    }

    fn robot_at(x: f64, y: f64) -> Option<Pose3D> {
        Some(Pose3D::new(Point3::new(x, y, 0.0), rpy_to_quaternion(0.0, 0.0, 0.0)))
    }

    fn controller(
        nav: Arc<SimNavigator>,
        poses: Arc<dyn PoseSource>,
        markers: Arc<SimMarkerService>,
    ) -> MissionController {
        MissionController::new(nav, poses, markers, fast_plan())
    }

    fn jobs(markers: &SimMarkerService) -> Vec<String> {
        markers.attempts().into_iter().map(|r| r.job).collect()
    }

    /// Every leg succeeds: three reports, in mission order.
    #[tokio::test]
    async fn happy_path_reports_three_markers_in_order() {
        let nav = Arc::new(SimNavigator::new(SimRobot::default()));
        let markers = Arc::new(SimMarkerService::new());
        let mut mission = controller(nav.clone(), Arc::new(FixedPose(robot_at(1.0, 2.0))), markers.clone());

        let summary = mission.run().await;

        assert_eq!(jobs(&markers), ["Startup", "Pickup", "DropOff"]);
        assert!(markers.attempts().iter().all(|r| r.pose.orientation.is_unit()));
        assert_eq!(summary.reports_delivered(), 3);
        assert_eq!(summary.waypoints_reached(), 2);
        assert_eq!(nav.sent_goals().len(), 2);
    }

    /// The startup marker goes to the configured pose without an offset.
    #[tokio::test]
    async fn startup_marker_uses_configured_pose() {
        let markers = Arc::new(SimMarkerService::new());
        let mut mission = controller(
            Arc::new(SimNavigator::new(SimRobot::default())),
            Arc::new(FixedPose(robot_at(0.0, 0.0))),
            markers.clone(),
        );
        mission.run().await;

        let startup = &markers.attempts()[0];
        assert_eq!(startup.pose.position, Point3::new(9.0, -2.0, 0.2));
        let yaw = quaternion_to_rpy(startup.pose.orientation).yaw;
        assert!((yaw - 1.15707).abs() < 1e-9);
    }

    /// Arrival reports use the container pose derived from live odometry.
    #[tokio::test]
    async fn arrival_report_uses_container_pose() {
        let markers = Arc::new(SimMarkerService::new());
        let mut mission = controller(
            Arc::new(SimNavigator::new(SimRobot::default())),
            Arc::new(FixedPose(robot_at(1.0, 2.0))),
            markers.clone(),
        );
        let pickup = mission
            .goals
            .build_waypoint(WaypointName::Pickup, mission.plan().pickup);

        let step = mission.travel_to(&pickup).await;

        assert_eq!(step.report, ReportStatus::Delivered);
        let report = &markers.attempts()[0];
        assert!((report.pose.position.x - 0.75).abs() < 1e-9);
        assert!((report.pose.position.y - 2.0).abs() < 1e-9);
        assert!((report.pose.position.z - 0.1).abs() < 1e-9);
    }

    /// A failed leg skips its own report but not the next leg.
    #[tokio::test]
    async fn failed_leg_skips_its_report() {
        for state in [GoalState::Aborted, GoalState::Rejected, GoalState::Preempted] {
            let nav = Arc::new(SimNavigator::new(SimRobot::default()).with_outcomes([state]));
            let markers = Arc::new(SimMarkerService::new());
            let mut mission = controller(nav, Arc::new(FixedPose(robot_at(0.0, 0.0))), markers.clone());

            let summary = mission.run().await;

            assert_eq!(jobs(&markers), ["Startup", "DropOff"], "pickup ended {state:?}");
            let pickup = summary.step(WaypointName::Pickup).unwrap();
            assert_eq!(pickup.navigation, Some(NavigationOutcome::Failed));
            assert_eq!(pickup.report, ReportStatus::NotAttempted);
        }
    }

    /// Marker failures are logged and the mission carries on.
    #[tokio::test]
    async fn rejected_reports_do_not_stop_the_mission() {
        let markers = Arc::new(
            SimMarkerService::new()
                .failing_on(WaypointName::Startup)
                .failing_on(WaypointName::Pickup),
        );
        let mut mission = controller(
            Arc::new(SimNavigator::new(SimRobot::default())),
            Arc::new(FixedPose(robot_at(0.0, 0.0))),
            markers.clone(),
        );

        let summary = mission.run().await;

        assert_eq!(jobs(&markers), ["Startup", "Pickup", "DropOff"]);
        assert_eq!(summary.step(WaypointName::Startup).unwrap().report, ReportStatus::Rejected);
        assert_eq!(summary.step(WaypointName::Pickup).unwrap().report, ReportStatus::Rejected);
        assert_eq!(summary.step(WaypointName::DropOff).unwrap().report, ReportStatus::Delivered);
    }

    /// Without odometry the report is skipped rather than sent with a bogus pose.
    #[tokio::test]
    async fn missing_odometry_skips_report() {
        let markers = Arc::new(SimMarkerService::new());
        let mut mission = controller(
            Arc::new(SimNavigator::new(SimRobot::default())),
            Arc::new(FixedPose(None)),
            markers.clone(),
        );

        let summary = mission.run().await;

        assert_eq!(jobs(&markers), ["Startup"]);
        assert_eq!(
            summary.step(WaypointName::DropOff).unwrap().report,
            ReportStatus::SkippedNoOdometry
        );
        assert_eq!(summary.waypoints_reached(), 2);
    }

    /// The mission waits for an executor that comes up late.
    #[tokio::test]
    async fn mission_waits_for_late_executor() {
        let nav = Arc::new(SimNavigator::new(SimRobot::default()).with_unready_polls(3));
        let markers = Arc::new(SimMarkerService::new());
        let mut mission = controller(nav.clone(), Arc::new(FixedPose(robot_at(0.0, 0.0))), markers.clone());

        mission.run().await;
        assert_eq!(nav.sent_goals().len(), 2);
    }

    /// End to end on the sim backend with live odometry.
    #[tokio::test]
    async fn live_sim_stack_reports_container_behind_robot() {
        let robot = SimRobot::default();
        let feed = OdometryFeed::default();
        let _odom = SimOdometry::spawn(robot.clone(), feed.clone(), Duration::from_millis(5));
        let nav = Arc::new(SimNavigator::new(robot).with_travel_time(Duration::from_millis(10)));
        let markers = Arc::new(SimMarkerService::new());
        let mut mission = controller(nav, Arc::new(OdometrySampler::new(feed)), markers.clone());

        mission.run().await;

        let reports = markers.attempts();
        assert_eq!(reports.len(), 3);
        let pickup = &reports[1];
        let yaw: f64 = 1.15707;
        assert!((pickup.pose.position.x - (9.0 - 0.25 * yaw.cos())).abs() < 1e-6);
        assert!((pickup.pose.position.y - (-2.0 - 0.25 * yaw.sin())).abs() < 1e-6);
        assert!((pickup.pose.position.z - 0.1).abs() < 1e-9);
        let dropoff = &reports[2];
        assert!((dropoff.pose.position.x - (-0.3 - 0.25 * (-yaw).cos())).abs() < 1e-6);
    }
}
