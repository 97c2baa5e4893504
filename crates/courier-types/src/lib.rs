use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used when checking that a quaternion is unit-norm.
pub const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// A 3-D position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// An orientation quaternion in ROS field order (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// Create a quaternion. The caller is responsible for supplying a unit
    /// quaternion where one is required.
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Return this quaternion scaled to unit length.
    ///
    /// A zero quaternion has no direction; it normalises to the identity.
    pub fn normalized(self) -> Self {
        let n = self.norm();
        if n <= f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.x / n, self.y / n, self.z / n, self.w / n)
    }

    /// `true` when the norm is within [`UNIT_NORM_TOLERANCE`] of 1.
    pub fn is_unit(&self) -> bool {
        (self.norm() - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Position plus orientation. Immutable once built; copied by value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose3D {
    pub position: Point3,
    pub orientation: Quaternion,
}

impl Pose3D {
    pub fn new(position: Point3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

/// A stamped navigation target, as handed to the navigation executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavGoal {
    /// Reference frame the pose is expressed in (e.g. `"map"`).
    pub frame_id: String,
    /// Wall-clock time the goal was built.
    pub stamp: DateTime<Utc>,
    pub pose: Pose3D,
}

/// The named stops of a delivery mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaypointName {
    Startup,
    Pickup,
    DropOff,
}

impl fmt::Display for WaypointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaypointName::Startup => write!(f, "Startup"),
            WaypointName::Pickup => write!(f, "Pickup"),
            WaypointName::DropOff => write!(f, "DropOff"),
        }
    }
}

/// A named navigation goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: WaypointName,
    pub goal: NavGoal,
}

impl Waypoint {
    pub fn new(name: WaypointName, goal: NavGoal) -> Self {
        Self { name, goal }
    }
}

/// Payload sent to the marker-placement service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: String,
    pub pose: Pose3D,
}

impl JobReport {
    pub fn new(name: WaypointName, pose: Pose3D) -> Self {
        Self {
            job: name.to_string(),
            pose,
        }
    }
}

/// Terminal execution state reported by the navigation executor.
///
/// Mirrors the terminal subset of actionlib's `GoalStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalState {
    Succeeded,
    Aborted,
    Rejected,
    Preempted,
    Recalled,
    Lost,
}

impl GoalState {
    /// Decode an actionlib `GoalStatus.status` code.
    ///
    /// Returns `None` for the non-terminal codes (PENDING, ACTIVE,
    /// PREEMPTING, RECALLING) and for unknown values.
    pub fn from_status_code(code: u64) -> Option<Self> {
        match code {
            2 => Some(GoalState::Preempted),
            3 => Some(GoalState::Succeeded),
            4 => Some(GoalState::Aborted),
            5 => Some(GoalState::Rejected),
            8 => Some(GoalState::Recalled),
            9 => Some(GoalState::Lost),
            _ => None,
        }
    }
}

/// Outcome of one goal-execution attempt. Every terminal state other than
/// [`GoalState::Succeeded`] collapses into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationOutcome {
    Succeeded,
    Failed,
}

impl From<GoalState> for NavigationOutcome {
    fn from(state: GoalState) -> Self {
        match state {
            GoalState::Succeeded => NavigationOutcome::Succeeded,
            _ => NavigationOutcome::Failed,
        }
    }
}

/// Error type shared by every courier crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CourierError {
    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Protocol Error: {0}")]
    Protocol(String),

    #[error("Service call to {service} failed: {details}")]
    ServiceCall { service: String, details: String },

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}
