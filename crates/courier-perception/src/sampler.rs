//! One-shot odometry sampling.
//!
//! [`OdometrySampler`] subscribes to the [`OdometryFeed`] at call time and
//! returns the first sample published after that point.  Samples published
//! before the call are never returned, so a stale pose from earlier in the
//! mission cannot be mistaken for the current one.

use std::time::Duration;

use async_trait::async_trait;
use courier_middleware::{OdometryFeed, PoseSource};
use courier_types::Pose3D;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Samples the robot's current pose from a live odometry feed.
#[derive(Debug, Clone)]
pub struct OdometrySampler {
    feed: OdometryFeed,
}

impl OdometrySampler {
    pub fn new(feed: OdometryFeed) -> Self {
        Self { feed }
    }

    /// Wait up to `timeout` for the next pose sample.
    ///
    /// Returns the newest sample queued when the first one arrives, or `None`
    /// if no sample arrives in time or the feed closes.
    pub async fn next_sample(&self, timeout: Duration) -> Option<Pose3D> {
        let mut rx = self.feed.subscribe();
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(mut pose) => {
                        // Prefer the newest of any samples already queued.
                        while let Ok(newer) = rx.try_recv() {
                            pose = newer;
                        }
                        return Some(pose);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "odometry sampler lagged; skipping ahead");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(sample) => sample,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "no odometry sample received");
                None
            }
        }
    }
}

#[async_trait]
impl PoseSource for OdometrySampler {
    async fn sample_current_pose(&self, timeout: Duration) -> Option<Pose3D> {
        self.next_sample(timeout).await
    }
}
