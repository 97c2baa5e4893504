//! rosbridge v2 backend.
//!
//! Connects to a `rosbridge_server` over WebSocket and speaks its JSON
//! protocol:
//!
//! | Direction | Topic / service | Message type |
//! |---|---|---|
//! | out | `<ns>/goal` | `move_base_msgs/MoveBaseActionGoal` |
//! | out | `<ns>/cancel` | `actionlib_msgs/GoalID` |
//! | in | `<ns>/status` | `actionlib_msgs/GoalStatusArray` |
//! | in | `<ns>/result` | `move_base_msgs/MoveBaseActionResult` |
//! | in | `/odom` | `nav_msgs/Odometry` |
//! | call | `/job_request` | `{ job, pose }` |
//!
//! The action server counts as ready once a status message has been seen;
//! `move_base` publishes its status array continuously while it is up.
//!
//! All inbound frames go through a single dispatcher so that the protocol
//! handling can be exercised without a network connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_types::{CourierError, GoalState, JobReport, NavGoal, Pose3D};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapter::{GoalHandle, MarkerService, NavigationExecutor};
use crate::feed::OdometryFeed;
use crate::lock;

const GOAL_TYPE: &str = "move_base_msgs/MoveBaseActionGoal";
const CANCEL_TYPE: &str = "actionlib_msgs/GoalID";
const STATUS_TYPE: &str = "actionlib_msgs/GoalStatusArray";
const RESULT_TYPE: &str = "move_base_msgs/MoveBaseActionResult";
const ODOM_TYPE: &str = "nav_msgs/Odometry";

/// Names of the ROS endpoints the client talks to.
#[derive(Debug, Clone, PartialEq)]
pub struct RosbridgeTopics {
    /// Namespace of the `move_base` action server.
    pub move_base_ns: String,
    pub odom_topic: String,
    pub job_service: String,
    /// How long to wait for a service response.
    pub service_timeout: Duration,
}

impl RosbridgeTopics {
    fn goal_topic(&self) -> String {
        format!("{}/goal", self.move_base_ns)
    }

    fn cancel_topic(&self) -> String {
        format!("{}/cancel", self.move_base_ns)
    }

    fn status_topic(&self) -> String {
        format!("{}/status", self.move_base_ns)
    }

    fn result_topic(&self) -> String {
        format!("{}/result", self.move_base_ns)
    }
}

impl Default for RosbridgeTopics {
    fn default() -> Self {
        Self {
            move_base_ns: "/move_base".to_string(),
            odom_topic: "/odom".to_string(),
            job_service: "/job_request".to_string(),
            service_timeout: Duration::from_secs(10),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Frame builders
// ────────────────────────────────────────────────────────────────────────────

fn ros_time(stamp: DateTime<Utc>) -> Value {
    json!({ "secs": stamp.timestamp(), "nsecs": stamp.timestamp_subsec_nanos() })
}

fn pose_json(pose: &Pose3D) -> Value {
    let p = pose.position;
    let q = pose.orientation;
    json!({
        "position": { "x": p.x, "y": p.y, "z": p.z },
        "orientation": { "x": q.x, "y": q.y, "z": q.z, "w": q.w },
    })
}

/// Advertise and subscribe frames sent right after connecting.
fn handshake_frames(topics: &RosbridgeTopics) -> Vec<Value> {
    vec![
        json!({ "op": "advertise", "topic": topics.goal_topic(), "type": GOAL_TYPE }),
        json!({ "op": "advertise", "topic": topics.cancel_topic(), "type": CANCEL_TYPE }),
        json!({ "op": "subscribe", "topic": topics.status_topic(), "type": STATUS_TYPE }),
        json!({ "op": "subscribe", "topic": topics.result_topic(), "type": RESULT_TYPE }),
        json!({ "op": "subscribe", "topic": topics.odom_topic, "type": ODOM_TYPE }),
    ]
}

fn goal_frame(topic: &str, goal_id: &str, goal: &NavGoal, now: DateTime<Utc>) -> Value {
    json!({
        "op": "publish",
        "topic": topic,
        "msg": {
            "header": { "seq": 0, "stamp": ros_time(now), "frame_id": "" },
            "goal_id": { "stamp": ros_time(now), "id": goal_id },
            "goal": {
                "target_pose": {
                    "header": { "seq": 0, "stamp": ros_time(goal.stamp), "frame_id": goal.frame_id },
                    "pose": pose_json(&goal.pose),
                }
            }
        }
    })
}

fn cancel_frame(topic: &str, goal_id: &str) -> Value {
    json!({
        "op": "publish",
        "topic": topic,
        "msg": { "stamp": { "secs": 0, "nsecs": 0 }, "id": goal_id },
    })
}

fn service_call_frame(call_id: &str, service: &str, report: &JobReport) -> Value {
    json!({
        "op": "call_service",
        "id": call_id,
        "service": service,
        "args": { "job": report.job, "pose": pose_json(&report.pose) },
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound parsing
// ────────────────────────────────────────────────────────────────────────────

fn missing(field: &str, msg_type: &str) -> CourierError {
    CourierError::Protocol(format!("{msg_type} without {field}"))
}

/// Extract the pose from a `nav_msgs/Odometry` message.
fn parse_odometry(msg: &Value) -> Result<Pose3D, CourierError> {
    let pose = msg
        .get("pose")
        .and_then(|p| p.get("pose"))
        .ok_or_else(|| missing("pose.pose", ODOM_TYPE))?;
    serde_json::from_value(pose.clone())
        .map_err(|e| CourierError::Serialization(format!("{ODOM_TYPE} pose: {e}")))
}

/// Extract `(goal id, terminal state)` from a `MoveBaseActionResult`.
///
/// Non-terminal status codes yield `Ok(None)`.
fn parse_goal_result(msg: &Value) -> Result<Option<(String, GoalState)>, CourierError> {
    let status = msg.get("status").ok_or_else(|| missing("status", RESULT_TYPE))?;
    let id = status
        .get("goal_id")
        .and_then(|g| g.get("id"))
        .and_then(|i| i.as_str())
        .ok_or_else(|| missing("status.goal_id.id", RESULT_TYPE))?;
    let code = status
        .get("status")
        .and_then(|c| c.as_u64())
        .ok_or_else(|| missing("status.status", RESULT_TYPE))?;
    Ok(GoalState::from_status_code(code).map(|state| (id.to_string(), state)))
}

// ────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ────────────────────────────────────────────────────────────────────────────

type ServiceReply = Result<(), String>;

/// Routes inbound frames to the odometry feed, the readiness flag and the
/// waiters of pending goals and service calls.
#[derive(Debug)]
struct Dispatcher {
    odom_topic: String,
    status_topic: String,
    result_topic: String,
    feed: OdometryFeed,
    server_ready: watch::Sender<bool>,
    /// Set once the reader has stopped; no waiter registered after this point
    /// could ever be resolved.
    closed: AtomicBool,
    pending_goals: Mutex<HashMap<String, oneshot::Sender<GoalState>>>,
    pending_calls: Mutex<HashMap<String, oneshot::Sender<ServiceReply>>>,
}

impl Dispatcher {
    fn new(topics: &RosbridgeTopics, feed: OdometryFeed) -> Self {
        let (server_ready, _) = watch::channel(false);
        Self {
            odom_topic: topics.odom_topic.clone(),
            status_topic: topics.status_topic(),
            result_topic: topics.result_topic(),
            feed,
            server_ready,
            closed: AtomicBool::new(false),
            pending_goals: Mutex::new(HashMap::new()),
            pending_calls: Mutex::new(HashMap::new()),
        }
    }

    fn handle_text(&self, text: &str) {
        let Ok(json) = serde_json::from_str::<Value>(text) else {
            warn!("ignoring non-JSON rosbridge frame");
            return;
        };

        match json.get("op").and_then(|o| o.as_str()) {
            Some("publish") => self.handle_publish(&json),
            Some("service_response") => self.handle_service_response(&json),
            Some("status") => {
                let level = json.get("level").and_then(|l| l.as_str()).unwrap_or("");
                let msg = json.get("msg").and_then(|m| m.as_str()).unwrap_or("");
                warn!(rosbridge_level = level, msg, "rosbridge status");
            }
            other => debug!(op = ?other, "ignoring rosbridge frame"),
        }
    }

    fn handle_publish(&self, json: &Value) {
        let topic = json.get("topic").and_then(|t| t.as_str()).unwrap_or("");
        let Some(msg) = json.get("msg") else {
            return;
        };

        if topic == self.odom_topic {
            match parse_odometry(msg) {
                Ok(pose) => {
                    self.feed.publish(pose);
                }
                Err(e) => warn!(topic, error = %e, "dropping odometry message"),
            }
        } else if topic == self.status_topic {
            self.server_ready.send_if_modified(|ready| !std::mem::replace(ready, true));
        } else if topic == self.result_topic {
            let (goal_id, state) = match parse_goal_result(msg) {
                Ok(Some(result)) => result,
                Ok(None) => return,
                Err(e) => {
                    warn!(topic, error = %e, "dropping goal result");
                    return;
                }
            };
            match lock(&self.pending_goals).remove(&goal_id) {
                Some(tx) => {
                    let _ = tx.send(state);
                }
                None => debug!(goal_id = %goal_id, "result for a goal this client is not waiting on"),
            }
        }
    }

    fn handle_service_response(&self, json: &Value) {
        let Some(id) = json.get("id").and_then(|i| i.as_str()) else {
            return;
        };
        let Some(tx) = lock(&self.pending_calls).remove(id) else {
            debug!(call_id = id, "response for an unknown service call");
            return;
        };
        let reply = if json.get("result").and_then(|r| r.as_bool()).unwrap_or(false) {
            Ok(())
        } else {
            Err(json.get("values").map(Value::to_string).unwrap_or_default())
        };
        let _ = tx.send(reply);
    }

    fn ready(&self) -> watch::Receiver<bool> {
        self.server_ready.subscribe()
    }

    fn connection_lost() -> CourierError {
        CourierError::Transport("rosbridge connection is closed".to_string())
    }

    /// Register a waiter for `goal_id`, unless the connection is gone.
    fn register_goal(&self, goal_id: &str, tx: oneshot::Sender<GoalState>) -> Result<(), CourierError> {
        let mut pending = lock(&self.pending_goals);
        if self.closed.load(Ordering::SeqCst) {
            return Err(Self::connection_lost());
        }
        pending.insert(goal_id.to_string(), tx);
        Ok(())
    }

    fn register_call(&self, call_id: &str, tx: oneshot::Sender<ServiceReply>) -> Result<(), CourierError> {
        let mut pending = lock(&self.pending_calls);
        if self.closed.load(Ordering::SeqCst) {
            return Err(Self::connection_lost());
        }
        pending.insert(call_id.to_string(), tx);
        Ok(())
    }

    /// Mark the connection closed and drop every waiter; their receivers
    /// observe a closed channel.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.server_ready.send_replace(false);
        lock(&self.pending_goals).clear();
        lock(&self.pending_calls).clear();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Live backend implementing [`NavigationExecutor`] and [`MarkerService`],
/// and feeding `/odom` samples into an [`OdometryFeed`].
#[derive(Debug)]
pub struct RosbridgeClient {
    topics: RosbridgeTopics,
    outbound: mpsc::UnboundedSender<String>,
    dispatcher: Arc<Dispatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl RosbridgeClient {
    /// Connect to `url`, advertise the action topics and subscribe to status,
    /// result and odometry.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::Transport`] if the WebSocket handshake fails.
    pub async fn connect(
        url: &str,
        topics: RosbridgeTopics,
        feed: OdometryFeed,
    ) -> Result<Self, CourierError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| CourierError::Transport(format!("rosbridge connect to {url}: {e}")))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (outbound, mut out_rx) = mpsc::unbounded_channel::<String>();
        let dispatcher = Arc::new(Dispatcher::new(&topics, feed));

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    error!(error = %e, "rosbridge write failed");
                    break;
                }
            }
        });

        let reader_dispatcher = Arc::clone(&dispatcher);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => reader_dispatcher.handle_text(text.as_str()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "rosbridge read failed");
                        break;
                    }
                }
            }
            warn!("rosbridge connection closed");
            reader_dispatcher.close();
        });

        let client = Self {
            topics,
            outbound,
            dispatcher,
            tasks: vec![writer, reader],
        };
        for frame in handshake_frames(&client.topics) {
            client.send_frame(&frame)?;
        }
        info!(url, move_base = %client.topics.move_base_ns, "connected to rosbridge");
        Ok(client)
    }

    fn send_frame(&self, frame: &Value) -> Result<(), CourierError> {
        if self.dispatcher.closed.load(Ordering::SeqCst) {
            return Err(Dispatcher::connection_lost());
        }
        self.outbound
            .send(frame.to_string())
            .map_err(|_| CourierError::Transport("rosbridge writer has stopped".to_string()))
    }
}

impl Drop for RosbridgeClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl NavigationExecutor for RosbridgeClient {
    async fn wait_for_server(&self, timeout: Duration) -> bool {
        let mut ready = self.dispatcher.ready();
        let waited = tokio::time::timeout(timeout, ready.wait_for(|r| *r)).await;
        matches!(waited, Ok(Ok(_)))
    }

    async fn send_goal(&self, goal: &NavGoal) -> Result<GoalHandle, CourierError> {
        let goal_id = format!("courier-{}", Uuid::new_v4());
        let (tx, rx) = oneshot::channel();
        self.dispatcher.register_goal(&goal_id, tx)?;

        let frame = goal_frame(&self.topics.goal_topic(), &goal_id, goal, Utc::now());
        if let Err(e) = self.send_frame(&frame) {
            lock(&self.dispatcher.pending_goals).remove(&goal_id);
            return Err(e);
        }
        debug!(goal_id = %goal_id, "goal published");
        Ok(GoalHandle::new(goal_id, rx))
    }

    async fn cancel_goal(&self, goal_id: &str) -> Result<(), CourierError> {
        self.send_frame(&cancel_frame(&self.topics.cancel_topic(), goal_id))
    }
}

#[async_trait]
impl MarkerService for RosbridgeClient {
    async fn report_job(&self, report: &JobReport) -> Result<(), CourierError> {
        let service = &self.topics.job_service;
        let call_id = format!("call_service:{service}:{}", Uuid::new_v4());
        let (tx, rx) = oneshot::channel();
        self.dispatcher.register_call(&call_id, tx)?;

        if let Err(e) = self.send_frame(&service_call_frame(&call_id, service, report)) {
            lock(&self.dispatcher.pending_calls).remove(&call_id);
            return Err(e);
        }

        match tokio::time::timeout(self.topics.service_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(details))) => Err(CourierError::ServiceCall {
                service: service.clone(),
                details,
            }),
            Ok(Err(_)) => Err(CourierError::Transport(format!(
                "connection closed while calling {service}"
            ))),
            Err(_) => {
                lock(&self.dispatcher.pending_calls).remove(&call_id);
                Err(CourierError::Timeout(
                    self.topics.service_timeout.as_millis() as u64,
                ))
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
