//! Inbound message decoding and routing.
//!
//! Frames arrive as `{ "type": ..., "payload": ... }`. [`decode`] turns one
//! into an [`InboundMessage`]; [`Router::route`] applies it to the store.
//! Malformed frames never reach the store.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use fleetwatch_core::{ActivityEntry, AgentId, AgentUpdate, Notification, SystemMetrics, View};

use crate::error::{ClientError, Result};
use crate::store::StateStore;

/// A decoded realtime message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    AgentUpdate(AgentUpdate),
    SystemMetrics(SystemMetrics),
    Activity(ActivityEntry),
    TaskUpdate(Value),
    Notification(Notification),
    /// A well-formed frame with a type this client does not handle.
    Unknown(String),
}

impl InboundMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::AgentUpdate(_) => "agent_update",
            InboundMessage::SystemMetrics(_) => "system_metrics",
            InboundMessage::Activity(_) => "activity",
            InboundMessage::TaskUpdate(_) => "task_update",
            InboundMessage::Notification(_) => "notification",
            InboundMessage::Unknown(kind) => kind,
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

fn payload<T: serde::de::DeserializeOwned>(kind: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| ClientError::Decode(format!("invalid {kind} payload: {e}")))
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<InboundMessage> {
    let raw: RawFrame =
        serde_json::from_str(frame).map_err(|e| ClientError::Decode(e.to_string()))?;

    let message = match raw.kind.as_str() {
        "agent_update" => InboundMessage::AgentUpdate(payload(&raw.kind, raw.payload)?),
        "system_metrics" => InboundMessage::SystemMetrics(payload(&raw.kind, raw.payload)?),
        "activity" => InboundMessage::Activity(payload(&raw.kind, raw.payload)?),
        "notification" => InboundMessage::Notification(payload(&raw.kind, raw.payload)?),
        "task_update" => InboundMessage::TaskUpdate(raw.payload),
        _ => InboundMessage::Unknown(raw.kind),
    };
    Ok(message)
}

/// The effect of routing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    AgentUpdated(AgentId),
    MetricsReplaced,
    ActivityRecorded,
    /// Tasks view is active and should be reloaded.
    TasksReloadRequested,
    /// Task update arrived while another view was active.
    TaskUpdateIgnored,
    Notified,
    Ignored(String),
}

/// Applies inbound messages to the store.
pub struct Router {
    store: Arc<StateStore>,
    notifier: mpsc::UnboundedSender<Notification>,
}

impl Router {
    pub fn new(store: Arc<StateStore>, notifier: mpsc::UnboundedSender<Notification>) -> Self {
        Self { store, notifier }
    }

    /// Decode and route a raw frame. Decode faults are logged and dropped.
    pub async fn handle_frame(&self, frame: &str) -> Option<RouteOutcome> {
        match decode(frame) {
            Ok(message) => Some(self.route(message).await),
            Err(e) => {
                warn!(error = %e, len = frame.len(), "dropping malformed frame");
                None
            }
        }
    }

    pub async fn route(&self, message: InboundMessage) -> RouteOutcome {
        match message {
            InboundMessage::AgentUpdate(update) => {
                self.store.upsert_agent(&update).await;
                RouteOutcome::AgentUpdated(update.id)
            }
            InboundMessage::SystemMetrics(metrics) => {
                self.store.set_metrics(metrics).await;
                RouteOutcome::MetricsReplaced
            }
            InboundMessage::Activity(entry) => {
                self.store.record_activity(entry).await;
                RouteOutcome::ActivityRecorded
            }
            InboundMessage::TaskUpdate(task) => {
                debug!(task = %task, "task update");
                if self.store.active_view().await == View::Tasks {
                    RouteOutcome::TasksReloadRequested
                } else {
                    RouteOutcome::TaskUpdateIgnored
                }
            }
            InboundMessage::Notification(notification) => {
                if self.notifier.send(notification).is_err() {
                    debug!("notification sink closed");
                }
                RouteOutcome::Notified
            }
            InboundMessage::Unknown(kind) => {
                debug!(kind = %kind, "ignoring unknown message type");
                RouteOutcome::Ignored(kind)
            }
        }
    }
}
