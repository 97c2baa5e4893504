//! Bootstrap configuration – reads `~/.courier/config.toml`.
//!
//! Only process wiring lives here (which backend, where rosbridge is, topic
//! names).  Mission coordinates are part of the compiled-in plan.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use courier_middleware::RosbridgeTopics;
use courier_types::CourierError;
use serde::{Deserialize, Serialize};

/// Which implementation backs the mission's collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Live ROS graph via `rosbridge_server`.
    #[default]
    Rosbridge,
    /// In-process simulation.
    Sim,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Rosbridge => write!(f, "rosbridge"),
            Backend::Sim => write!(f, "sim"),
        }
    }
}

impl FromStr for Backend {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rosbridge" => Ok(Backend::Rosbridge),
            "sim" => Ok(Backend::Sim),
            other => Err(CourierError::Config(format!("unknown backend {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,

    /// WebSocket URL of `rosbridge_server`.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,

    /// Namespace of the `move_base` action server.
    #[serde(default = "default_move_base_ns")]
    pub move_base_ns: String,

    #[serde(default = "default_odom_topic")]
    pub odom_topic: String,

    /// Marker-placement service receiving job reports.
    #[serde(default = "default_job_service")]
    pub job_service: String,

    #[serde(default = "default_service_timeout_secs")]
    pub service_timeout_secs: u64,
}

fn default_rosbridge_url() -> String {
    "ws://localhost:9090".to_string()
}
fn default_move_base_ns() -> String {
    "/move_base".to_string()
}
fn default_odom_topic() -> String {
    "/odom".to_string()
}
fn default_job_service() -> String {
    "/job_request".to_string()
}
fn default_service_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            rosbridge_url: default_rosbridge_url(),
            move_base_ns: default_move_base_ns(),
            odom_topic: default_odom_topic(),
            job_service: default_job_service(),
            service_timeout_secs: default_service_timeout_secs(),
        }
    }
}

impl Config {
    pub fn rosbridge_topics(&self) -> RosbridgeTopics {
        RosbridgeTopics {
            move_base_ns: self.move_base_ns.clone(),
            odom_topic: self.odom_topic.clone(),
            job_service: self.job_service.clone(),
            service_timeout: Duration::from_secs(self.service_timeout_secs),
        }
    }
}

/// `$COURIER_CONFIG` if set, otherwise `~/.courier/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("COURIER_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".courier").join("config.toml")
}

/// Load the config file (defaults when it does not exist) and apply
/// environment overrides.
pub fn resolve() -> Result<Config, CourierError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does not
/// exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, CourierError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        CourierError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| {
        CourierError::Config(format!("failed to parse config at {}: {e}", path.display()))
    })?;
    Ok(Some(cfg))
}

/// Apply `COURIER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `COURIER_BACKEND` | `backend` |
/// | `COURIER_ROSBRIDGE_URL` | `rosbridge_url` |
/// | `COURIER_ODOM_TOPIC` | `odom_topic` |
pub fn apply_env_overrides(cfg: &mut Config) -> Result<(), CourierError> {
    if let Ok(v) = std::env::var("COURIER_BACKEND")
        && !v.is_empty()
    {
        cfg.backend = v.parse()?;
    }
    if let Ok(v) = std::env::var("COURIER_ROSBRIDGE_URL")
        && !v.is_empty()
    {
        cfg.rosbridge_url = v;
    }
    if let Ok(v) = std::env::var("COURIER_ODOM_TOPIC")
        && !v.is_empty()
    {
        cfg.odom_topic = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.backend, Backend::Rosbridge);
        assert_eq!(cfg.rosbridge_url, "ws://localhost:9090");
        assert_eq!(cfg.move_base_ns, "/move_base");
        assert_eq!(cfg.odom_topic, "/odom");
        assert_eq!(cfg.job_service, "/job_request");
        assert_eq!(cfg.service_timeout_secs, 10);
    }

    /// The default path lives in `~/.courier/`.
    #[test]
    fn config_path_is_under_home() {
        assert_eq!(
            config_path_for_home("/home/robot"),
            PathBuf::from("/home/robot/.courier/config.toml")
        );
    }

    /// A missing file is not an error; the caller falls back to defaults.
    #[test]
    fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_from(&dir.path().join("config.toml")).unwrap(), None);
    }

    /// Fields absent from the file keep their defaults.
    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "backend = \"sim\"\nservice_timeout_secs = 3\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.backend, Backend::Sim);
        assert_eq!(cfg.service_timeout_secs, 3);
        assert_eq!(cfg.odom_topic, "/odom");
        assert_eq!(cfg.rosbridge_topics().service_timeout, Duration::from_secs(3));
    }

    /// Invalid TOML is reported as a configuration error.
    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "backend = [not toml").unwrap();
        assert!(matches!(load_from(&path), Err(CourierError::Config(_))));
    }

    /// Unknown backend names fail to deserialize.
    #[test]
    fn unknown_backend_in_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "backend = \"carrier-pigeon\"\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn backend_parsing() {
        assert_eq!("SIM".parse::<Backend>().unwrap(), Backend::Sim);
        assert_eq!(" rosbridge ".parse::<Backend>().unwrap(), Backend::Rosbridge);
        assert!("warp".parse::<Backend>().is_err());
        assert_eq!(Backend::Sim.to_string(), "sim");
    }

    /// `COURIER_ROSBRIDGE_URL` replaces the configured URL.
    #[test]
    fn env_overrides_rosbridge_url() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("COURIER_ROSBRIDGE_URL", "ws://robot.local:9090") };
        let mut cfg = Config::default();
        let result = apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("COURIER_ROSBRIDGE_URL") };

        result.unwrap();
        assert_eq!(cfg.rosbridge_url, "ws://robot.local:9090");
    }

    /// An empty `COURIER_BACKEND` is ignored like the other overrides.
    #[test]
    fn empty_backend_override_is_ignored() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("COURIER_BACKEND", "") };
        let mut cfg = Config {
            backend: Backend::Sim,
            ..Config::default()
        };
        let result = apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("COURIER_BACKEND") };

        result.unwrap();
        assert_eq!(cfg.backend, Backend::Sim);
    }

    /// `COURIER_ODOM_TOPIC` replaces the odometry topic everywhere it is used.
    #[test]
    fn env_overrides_odom_topic() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("COURIER_ODOM_TOPIC", "/robot/odom") };
        let mut cfg = Config::default();
        let result = apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("COURIER_ODOM_TOPIC") };

        result.unwrap();
        assert_eq!(cfg.odom_topic, "/robot/odom");
        assert_eq!(cfg.rosbridge_topics().odom_topic, "/robot/odom");
    }
}
