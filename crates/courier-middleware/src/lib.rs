//! `courier-middleware` – the mission's view of the outside world.
//!
//! The mission never talks to ROS directly.  It drives three collaborator
//! traits, and this crate provides both a live and a simulated backend for
//! them.
//!
//! # Modules
//!
//! - [`adapter`] – [`NavigationExecutor`], [`PoseSource`] and
//!   [`MarkerService`]: the seams the mission controller is built against.
//! - [`feed`] – [`OdometryFeed`]: broadcast channel carrying live robot pose
//!   samples from a backend to any number of samplers.
//! - [`rosbridge`] – [`RosbridgeClient`]: rosbridge v2 JSON-over-WebSocket
//!   client that drives `move_base`, subscribes to `/odom` and calls the
//!   marker service.
//! - [`sim`] – in-process stand-ins for headless runs and tests.

pub mod adapter;
pub mod feed;
pub mod rosbridge;
pub mod sim;

pub use adapter::{GoalHandle, MarkerService, NavigationExecutor, PoseSource};
pub use feed::OdometryFeed;
pub use rosbridge::{RosbridgeClient, RosbridgeTopics};
pub use sim::{SimMarkerService, SimNavigator, SimOdometry, SimRobot};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
