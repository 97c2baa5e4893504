//! `pick_objects` – drive the robot through one pickup / drop-off mission.
//!
//! Usage: `pick_objects [--sim]`
//!
//! Configuration is read from `$COURIER_CONFIG` or `~/.courier/config.toml`
//! (see [`config`]); `--sim` forces the in-process simulation backend.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use courier_middleware::{
    OdometryFeed, PoseSource, RosbridgeClient, SimMarkerService, SimNavigator, SimOdometry,
    SimRobot,
};
use courier_perception::OdometrySampler;
use courier_runtime::{MissionController, MissionPlan, MissionSummary, init_tracing};
use courier_types::CourierError;
use tracing::{error, info, warn};

use crate::config::{Backend, Config};

/// Odometry rate of the simulated robot.
const SIM_ODOM_PERIOD: Duration = Duration::from_millis(50);
/// Time the simulated robot needs for one leg.
const SIM_TRAVEL_TIME: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    // Tracing must be up before the runtime exists; see telemetry.rs.
    let _guard = init_tracing("courier");

    let mut cfg = match config::resolve() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    if std::env::args().skip(1).any(|arg| arg == "--sim") {
        cfg.backend = Backend::Sim;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_until_interrupted(cfg)) {
        Ok(Some(summary)) => {
            info!(
                reached = summary.waypoints_reached(),
                delivered = summary.reports_delivered(),
                "pick_objects done"
            );
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::from(130),
        Err(e) => {
            error!(error = %e, "pick_objects failed to start");
            ExitCode::FAILURE
        }
    }
}

/// Run the mission; `Ok(None)` when interrupted with Ctrl-C.
async fn run_until_interrupted(cfg: Config) -> Result<Option<MissionSummary>, CourierError> {
    tokio::select! {
        result = run(cfg) => result.map(Some),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; abandoning mission");
            Ok(None)
        }
    }
}

async fn run(cfg: Config) -> Result<MissionSummary, CourierError> {
    info!(backend = %cfg.backend, "starting pick_objects");
    let feed = OdometryFeed::default();
    let poses: Arc<dyn PoseSource> = Arc::new(OdometrySampler::new(feed.clone()));
    let plan = MissionPlan::default();

    match cfg.backend {
        Backend::Rosbridge => {
            let client =
                Arc::new(RosbridgeClient::connect(&cfg.rosbridge_url, cfg.rosbridge_topics(), feed).await?);
            let mut mission = MissionController::new(client.clone(), poses, client, plan);
            Ok(mission.run().await)
        }
        Backend::Sim => {
            let robot = SimRobot::default();
            let _odometry = SimOdometry::spawn(robot.clone(), feed, SIM_ODOM_PERIOD);
            let navigator = Arc::new(SimNavigator::new(robot).with_travel_time(SIM_TRAVEL_TIME));
            let markers = Arc::new(SimMarkerService::new());
            let mut mission = MissionController::new(navigator, poses, markers, plan);
            Ok(mission.run().await)
        }
    }
}
