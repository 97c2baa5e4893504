//! `courier-runtime` – mission orchestration.
//!
//! # Modules
//!
//! - [`goal`] – [`GoalBuilder`][goal::GoalBuilder]: stamped navigation goals
//!   in the `map` frame from position plus roll/pitch/yaw.
//! - [`navigation`] – [`NavigationDriver`][navigation::NavigationDriver]:
//!   sends one goal to the executor and collapses its terminal state into
//!   success or failure.
//! - [`mission`] – [`MissionController`][mission::MissionController]: the
//!   startup / pickup / drop-off sequence with job reporting.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.

pub mod goal;
pub mod mission;
pub mod navigation;
pub mod telemetry;

pub use goal::{DEFAULT_FRAME_ID, GoalBuilder, GoalSpec};
pub use mission::{
    CONTAINER_OFFSET_M, MissionController, MissionPlan, MissionSummary, ReportStatus, StepRecord,
};
pub use navigation::{DriverState, NavigationDriver};
pub use telemetry::{TracerProviderGuard, init_tracing};
