//! Pose math.
//!
//! Angles use the ROS convention: fixed-axis roll (X), pitch (Y), yaw (Z),
//! applied in that order, in radians.
//!
//! # Example
//!
//! ```rust
//! use courier_perception::transform::{derive_container_pose, rpy_to_quaternion};
//! use courier_types::{Point3, Pose3D};
//!
//! // Robot at (1, 2) facing +x; its container sits 0.25 m behind it.
//! let robot = Pose3D::new(Point3::new(1.0, 2.0, 0.0), rpy_to_quaternion(0.0, 0.0, 0.0));
//! let container = derive_container_pose(&robot, 0.25);
//! assert!((container.position.x - 0.75).abs() < 1e-9);
//! assert!((container.position.z - 0.1).abs() < 1e-9);
//! ```

use courier_types::{Point3, Pose3D, Quaternion};

/// Height of the container above the robot's odometry frame, in metres.
pub const CONTAINER_Z_BIAS: f64 = 0.1;

/// Roll, pitch and yaw in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rpy {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Conversions
// ────────────────────────────────────────────────────────────────────────────

/// Decompose a unit quaternion into roll/pitch/yaw.
///
/// Pitch is taken from an `asin` whose argument is clamped to `[-1, 1]`, so
/// near-gimbal-lock inputs produce ±π/2 instead of NaN.
pub fn quaternion_to_rpy(q: Quaternion) -> Rpy {
    let sinr_cosp = 2.0 * (q.w * q.x + q.y * q.z);
    let cosr_cosp = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);
    let roll = sinr_cosp.atan2(cosr_cosp);

    let sinp = (2.0 * (q.w * q.y - q.z * q.x)).clamp(-1.0, 1.0);
    let pitch = sinp.asin();

    let siny_cosp = 2.0 * (q.w * q.z + q.x * q.y);
    let cosy_cosp = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
    let yaw = siny_cosp.atan2(cosy_cosp);

    Rpy { roll, pitch, yaw }
}

/// Build a normalised quaternion from roll/pitch/yaw.
pub fn rpy_to_quaternion(roll: f64, pitch: f64, yaw: f64) -> Quaternion {
    let (sr, cr) = (roll * 0.5).sin_cos();
    let (sp, cp) = (pitch * 0.5).sin_cos();
    let (sy, cy) = (yaw * 0.5).sin_cos();

    Quaternion::new(
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
        cr * cp * cy + sr * sp * sy,
    )
    .normalized()
}

// ────────────────────────────────────────────────────────────────────────────
// Container pose
// ────────────────────────────────────────────────────────────────────────────

/// Pose of the cargo container carried `offset` metres behind the robot.
///
/// The offset is applied against the robot's heading in the XY plane only;
/// roll and pitch are ignored.  The container is raised by
/// [`CONTAINER_Z_BIAS`] and keeps the robot's orientation unchanged.
pub fn derive_container_pose(robot: &Pose3D, offset: f64) -> Pose3D {
    let yaw = quaternion_to_rpy(robot.orientation).yaw;
    let p = robot.position;
    Pose3D::new(
        Point3::new(
            p.x - offset * yaw.cos(),
            p.y - offset * yaw.sin(),
            p.z + CONTAINER_Z_BIAS,
        ),
        robot.orientation,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-9;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    fn dot(a: Quaternion, b: Quaternion) -> f64 {
        a.x * b.x + a.y * b.y + a.z * b.z + a.w * b.w
    }

    #[test]
    fn zero_angles_give_identity() {
        assert_eq!(rpy_to_quaternion(0.0, 0.0, 0.0), Quaternion::identity());
    }

    /// A pure yaw rotates about Z only and decomposes back to the same yaw.
    #[test]
    fn pure_yaw_quaternion() {
        let q = rpy_to_quaternion(0.0, 0.0, FRAC_PI_2);
        assert!(approx(q.z, (FRAC_PI_2 / 2.0).sin()));
        assert!(approx(q.w, (FRAC_PI_2 / 2.0).cos()));
        assert!(approx(quaternion_to_rpy(q).yaw, FRAC_PI_2));
    }

    /// Every built quaternion is unit-norm.
    #[test]
    fn built_quaternions_are_unit() {
        for (r, p, y) in [(0.3, -0.2, 1.15707), (PI, 0.0, -PI), (-1.0, 1.2, 2.5)] {
            assert!(rpy_to_quaternion(r, p, y).is_unit());
        }
    }

    /// q and -q are the same rotation, so compare with |q·q'|.
    #[test]
    fn rpy_round_trip_recovers_rotation_up_to_sign() {
        let inputs = [
            Quaternion::new(0.1, -0.2, 0.3, 0.9).normalized(),
            Quaternion::new(0.0, 0.0, -0.7, 0.7).normalized(),
            Quaternion::new(-0.4, 0.1, 0.2, -0.8).normalized(),
        ];
        for q in inputs {
            let rpy = quaternion_to_rpy(q);
            let back = rpy_to_quaternion(rpy.roll, rpy.pitch, rpy.yaw);
            assert!((dot(q, back).abs() - 1.0).abs() < 1e-9, "{q:?} -> {back:?}");
        }
    }

    /// Slightly denormalised input at gimbal lock still yields a finite pitch.
    #[test]
    fn gimbal_lock_pitch_is_clamped() {
        // Slightly denormalised input that would push asin past 1.0.
        let q = Quaternion::new(0.0, 0.7072, 0.0, 0.7072);
        let rpy = quaternion_to_rpy(q);
        assert!(rpy.pitch.is_finite());
        assert!(approx(rpy.pitch, FRAC_PI_2));
    }

    /// Facing +x, the container sits behind the robot along -x.
    #[test]
    fn container_behind_robot_facing_x() {
        let robot = Pose3D::new(Point3::new(1.0, 2.0, 0.0), Quaternion::identity());
        let c = derive_container_pose(&robot, 0.25);
        assert!(approx(c.position.x, 0.75));
        assert!(approx(c.position.y, 2.0));
        assert!(approx(c.position.z, 0.1));
        assert_eq!(c.orientation, robot.orientation);
    }

    /// Facing +y, the container sits behind the robot along -y.
    #[test]
    fn container_behind_robot_facing_y() {
        let robot = Pose3D::new(Point3::new(0.0, 0.0, 0.0), rpy_to_quaternion(0.0, 0.0, FRAC_PI_2));
        let c = derive_container_pose(&robot, 0.25);
        assert!(c.position.x.abs() < 1e-12);
        assert!(approx(c.position.y, -0.25));
        assert!(approx(c.position.z, CONTAINER_Z_BIAS));
    }

    /// Only yaw steers the offset; tilt is carried over untouched.
    #[test]
    fn container_offset_ignores_roll_and_pitch() {
        let tilted = rpy_to_quaternion(0.4, -0.3, 0.0);
        let robot = Pose3D::new(Point3::new(5.0, 5.0, 1.0), tilted);
        let c = derive_container_pose(&robot, 0.5);
        assert!(approx(c.position.x, 4.5));
        assert!(approx(c.position.y, 5.0));
        assert!(approx(c.position.z, 1.1));
        assert_eq!(c.orientation, tilted);
    }
}
