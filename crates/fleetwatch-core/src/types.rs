//! Shared type definitions used across FLEETWATCH crates.
//!
//! These mirror the payload shapes the backend emits on the realtime channel
//! and returns from its HTTP endpoints. Field names follow the backend's
//! camelCase wire format; timestamps travel as epoch milliseconds.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FleetError;

/// Unique identifier for an agent.
pub type AgentId = String;

/// Timestamp type used throughout FLEETWATCH.
pub type Timestamp = DateTime<Utc>;

/// Get the current UTC timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Agent run status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Agent process is running
    Running,
    /// Agent was stopped by an operator or finished
    Stopped,
    /// Agent reported an error
    Error,
    /// Status string not recognized by this client
    #[default]
    #[serde(other)]
    Unknown,
}

impl AgentStatus {
    /// Returns the status indicator for display.
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Running => "●",
            Self::Stopped => "○",
            Self::Error => "✖",
            Self::Unknown => "?",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Per-agent resource metrics. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// CPU usage in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    /// Resident memory in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<f64>,
    /// Number of tasks handled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<u64>,
}

impl AgentMetrics {
    /// Overwrite only the fields present in `update`.
    pub fn merge(&mut self, update: &AgentMetrics) {
        if update.cpu.is_some() {
            self.cpu = update.cpu;
        }
        if update.memory.is_some() {
            self.memory = update.memory;
        }
        if update.tasks.is_some() {
            self.tasks = update.tasks;
        }
    }

    /// CPU percent, 0 when never reported.
    pub fn cpu_or_zero(&self) -> f64 {
        self.cpu.unwrap_or(0.0)
    }

    /// Memory in MB, 0 when never reported.
    pub fn memory_or_zero(&self) -> f64 {
        self.memory.unwrap_or(0.0)
    }

    /// Task count, 0 when never reported.
    pub fn tasks_or_zero(&self) -> u64 {
        self.tasks.unwrap_or(0)
    }
}

/// An `agent_update` payload, also the element shape of `GET /api/agents/status`.
///
/// `status` is always present; the other fields are partial updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub id: AgentId,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_active: Option<Timestamp>,
}

impl AgentUpdate {
    /// Create a status-only update.
    pub fn new(id: impl Into<AgentId>, status: AgentStatus) -> Self {
        Self {
            id: id.into(),
            status,
            metrics: None,
            last_active: None,
        }
    }

    /// Attach metrics to the update.
    pub fn with_metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach a last-active timestamp.
    pub fn with_last_active(mut self, at: Timestamp) -> Self {
        self.last_active = Some(at);
        self
    }
}

/// The client-side record for one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub status: AgentStatus,
    pub metrics: AgentMetrics,
    pub last_active: Option<Timestamp>,
}

impl AgentRecord {
    /// Build a record from the first update seen for an agent.
    pub fn from_update(update: &AgentUpdate) -> Self {
        let mut record = Self {
            id: update.id.clone(),
            status: update.status,
            metrics: AgentMetrics::default(),
            last_active: None,
        };
        record.apply(update);
        record
    }

    /// Merge an update: present fields overwrite, absent fields are kept.
    pub fn apply(&mut self, update: &AgentUpdate) {
        self.status = update.status;
        if let Some(metrics) = &update.metrics {
            self.metrics.merge(metrics);
        }
        if update.last_active.is_some() {
            self.last_active = update.last_active;
        }
    }
}

/// One entry of the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub source: String,
}

impl ActivityEntry {
    /// Create an entry stamped with the current time.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            title: title.into(),
            description: String::new(),
            timestamp: now(),
            source: String::new(),
        }
    }
}

/// Latest system-wide metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub disk: f64,
    /// Backend uptime in whole seconds
    #[serde(default, deserialize_with = "whole_number")]
    pub uptime: u64,
    #[serde(default, deserialize_with = "whole_number")]
    pub active_agents: u64,
    #[serde(default, deserialize_with = "whole_number")]
    pub total_tasks: u64,
    #[serde(default, deserialize_with = "whole_number")]
    pub knowledge_items: u64,
}

impl SystemMetrics {
    /// Uptime formatted as `1d 2h 3m`.
    pub fn uptime_display(&self) -> String {
        let days = self.uptime / 86_400;
        let hours = (self.uptime % 86_400) / 3_600;
        let minutes = (self.uptime % 3_600) / 60;
        if days > 0 {
            format!("{days}d {hours}h {minutes}m")
        } else if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        }
    }
}

/// Dashboard views. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Overview,
    Agents,
    Tasks,
    Knowledge,
    Activity,
}

impl View {
    /// All views in display order.
    pub const ALL: [View; 5] = [
        View::Overview,
        View::Agents,
        View::Tasks,
        View::Knowledge,
        View::Activity,
    ];

    /// Backend path serving this view's data.
    pub fn endpoint(&self) -> &'static str {
        match self {
            View::Overview => "/api/dashboard/overview",
            View::Agents => "/api/agents",
            View::Tasks => "/api/tasks",
            View::Knowledge => "/api/knowledge",
            View::Activity => "/api/activity",
        }
    }

    /// Display title.
    pub fn title(&self) -> &'static str {
        match self {
            View::Overview => "Overview",
            View::Agents => "Agents",
            View::Tasks => "Tasks",
            View::Knowledge => "Knowledge",
            View::Activity => "Activity",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

impl FromStr for View {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overview" => Ok(View::Overview),
            "agents" => Ok(View::Agents),
            "tasks" => Ok(View::Tasks),
            "knowledge" => Ok(View::Knowledge),
            "activity" => Ok(View::Activity),
            other => Err(FleetError::UnknownView {
                name: other.to_string(),
            }),
        }
    }
}

/// Severity of an operator-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
    Warning,
    #[default]
    #[serde(other)]
    Info,
}

/// A transient message for the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(rename = "type", default)]
    pub level: NotificationLevel,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }
}

/// One hit returned by `GET /api/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub query: String,
}

/// Backends emit ids as either strings or integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Counters may arrive as floats (`process.uptime()` reports `3600.52`).
/// The fraction is dropped.
fn whole_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 {
        return Err(serde::de::Error::custom(format!(
            "expected a non-negative count, got {value}"
        )));
    }
    Ok(value.trunc() as u64)
}
