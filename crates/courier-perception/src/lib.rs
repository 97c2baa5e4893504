//! `courier-perception` – where the robot is, and where its cargo is.
//!
//! # Modules
//!
//! - [`transform`] – pose math: quaternion ↔ roll/pitch/yaw conversion and
//!   derivation of the container pose from the robot pose.
//! - [`sampler`] – [`OdometrySampler`][sampler::OdometrySampler]: takes one
//!   fresh pose sample from the live odometry feed, with a timeout.

pub mod sampler;
pub mod transform;

pub use sampler::OdometrySampler;
pub use transform::{CONTAINER_Z_BIAS, Rpy, derive_container_pose, quaternion_to_rpy, rpy_to_quaternion};
