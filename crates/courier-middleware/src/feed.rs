//! Live odometry feed.
//!
//! Backends publish every pose they receive on `/odom`; samplers subscribe on
//! demand.  Built on [`tokio::sync::broadcast`] so a slow sampler never blocks
//! the backend, and a subscriber only ever sees samples published after it
//! subscribed.

use courier_types::Pose3D;
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered samples before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 64;

/// Shared odometry feed. Clones share the same channel.
#[derive(Clone, Debug)]
pub struct OdometryFeed {
    sender: broadcast::Sender<Pose3D>,
}

impl OdometryFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a pose sample.
    ///
    /// Returns the number of subscribers that received it.  Publishing with no
    /// subscriber is normal: nobody is waiting for a sample right now.
    pub fn publish(&self, pose: Pose3D) -> usize {
        match self.sender.send(pose) {
            Ok(n) => n,
            Err(_) => {
                trace!("odometry sample dropped: no subscribers");
                0
            }
        }
    }

    /// Subscribe to samples published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Pose3D> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for OdometryFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
