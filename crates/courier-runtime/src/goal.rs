//! Navigation goal construction.

use chrono::Utc;
use courier_perception::rpy_to_quaternion;
use courier_types::{NavGoal, Point3, Pose3D, Waypoint, WaypointName};

/// Frame every mission goal is expressed in.
pub const DEFAULT_FRAME_ID: &str = "map";

/// Position plus roll/pitch/yaw of a mission stop, before stamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalSpec {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl GoalSpec {
    /// A goal with zero roll and pitch.
    pub const fn planar(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll: 0.0,
            pitch: 0.0,
            yaw,
        }
    }
}

/// Builds stamped [`NavGoal`]s in a fixed reference frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalBuilder {
    frame_id: String,
}

impl GoalBuilder {
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
        }
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    /// Build a goal stamped with the current time.  The orientation is the
    /// normalised quaternion for `(roll, pitch, yaw)`.
    pub fn build_goal(&self, x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> NavGoal {
        NavGoal {
            frame_id: self.frame_id.clone(),
            stamp: Utc::now(),
            pose: Pose3D::new(Point3::new(x, y, z), rpy_to_quaternion(roll, pitch, yaw)),
        }
    }

    pub fn build_waypoint(&self, name: WaypointName, spec: GoalSpec) -> Waypoint {
        let goal = self.build_goal(spec.x, spec.y, spec.z, spec.roll, spec.pitch, spec.yaw);
        Waypoint::new(name, goal)
    }
}

impl Default for GoalBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_perception::quaternion_to_rpy;

    /// Goals are stamped now, in `map`, with the requested yaw.
    #[test]
    fn goal_is_in_map_frame_with_unit_orientation() {
        let before = Utc::now();
        let goal = GoalBuilder::default().build_goal(9.0, -2.0, 0.0, 0.0, 0.0, 1.15707);

        assert_eq!(goal.frame_id, "map");
        assert!(goal.stamp >= before);
        assert_eq!(goal.pose.position, Point3::new(9.0, -2.0, 0.0));
        assert!(goal.pose.orientation.is_unit());
        assert!((quaternion_to_rpy(goal.pose.orientation).yaw - 1.15707).abs() < 1e-9);
    }

    #[test]
    fn custom_frame_is_used() {
        let builder = GoalBuilder::new("odom");
        assert_eq!(builder.frame_id(), "odom");
        assert_eq!(builder.build_goal(0.0, 0.0, 0.0, 0.0, 0.0, 0.0).frame_id, "odom");
    }

    /// Waypoints keep their name alongside the built goal.
    #[test]
    fn waypoint_carries_name_and_position() {
        let wp = GoalBuilder::default()
            .build_waypoint(WaypointName::DropOff, GoalSpec::planar(-0.3, -0.5, 0.0, -1.15707));
        assert_eq!(wp.name, WaypointName::DropOff);
        assert_eq!(wp.goal.pose.position, Point3::new(-0.3, -0.5, 0.0));
    }
}
