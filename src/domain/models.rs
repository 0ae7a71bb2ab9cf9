use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    Stop,
    Error,
    StatusUpdate,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Error => "error",
            Self::StatusUpdate => "status_update",
        }
    }

    /// Collapses the stored type into the three values pollers understand.
    pub fn wire_command(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Error | Self::StatusUpdate => "status",
        }
    }

    pub fn from_report_status(status: &str) -> Self {
        if status == "stopped" {
            Self::Stop
        } else {
            Self::StatusUpdate
        }
    }
}

impl FromStr for EventType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "error" => Ok(Self::Error),
            "status_update" => Ok(Self::StatusUpdate),
            other => Err(UnknownVariant::new("event type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "error" => Ok(Self::Error),
            other => Err(UnknownVariant::new("session status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Start,
    Stop,
    Status,
    Reset,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "status" => Ok(Self::Status),
            "reset" => Ok(Self::Reset),
            other => Err(UnknownVariant::new("command", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "debug" => Ok(Self::Debug),
            other => Err(UnknownVariant::new("log level", other)),
        }
    }
}

/// Measurements attached to a charging event. Only `status` is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_minute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingEvent {
    pub event_id: String,
    pub charger_id: String,
    pub station_name: String,
    pub event_type: EventType,
    pub timestamp: String,
    pub data: EventData,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChargingEvent {
    pub event_id: String,
    pub charger_id: String,
    pub station_name: String,
    pub event_type: EventType,
    pub data: EventData,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSession {
    pub session_id: String,
    pub charger_id: String,
    pub station_name: String,
    pub user_id: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: SessionStatus,
    pub duration: Option<i64>,
    pub total_energy: Option<f64>,
    pub total_cost: Option<f64>,
    pub cost_per_unit: Option<f64>,
    pub cost_per_minute: Option<f64>,
    pub payment_method: Option<String>,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChargingSession {
    pub session_id: String,
    pub charger_id: String,
    pub station_name: String,
    pub user_id: Option<String>,
    pub status: SessionStatus,
    pub payment_method: Option<String>,
}

/// Partial session write; `None` leaves the stored column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub end_time: Option<String>,
    pub duration: Option<i64>,
    pub total_energy: Option<f64>,
    pub total_cost: Option<f64>,
    pub cost_per_unit: Option<f64>,
    pub cost_per_minute: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_minute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub command_id: String,
    pub charger_id: String,
    pub station_name: String,
    pub command: CommandKind,
    pub timestamp: String,
    pub executed: bool,
    pub response: Option<CommandResponse>,
    pub executed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCommand {
    pub command_id: String,
    pub charger_id: String,
    pub station_name: String,
    pub command: CommandKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemLog {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
    pub source: String,
    pub data: Option<Value>,
}

/// Status report as posted by a charging unit; required fields are checked
/// by telemetry ingest rather than by deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    pub charger_id: Option<String>,
    pub station_name: Option<String>,
    pub status: Option<String>,
    /// Seconds; units may report fractional values.
    pub duration: Option<f64>,
    pub cost_per_unit: Option<f64>,
    pub cost_per_minute: Option<f64>,
    pub total_cost: Option<f64>,
    pub command_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    pub charger_id: String,
    pub station_name: String,
    pub status: String,
    pub duration: Option<i64>,
    pub cost_per_unit: Option<f64>,
    pub cost_per_minute: Option<f64>,
    pub total_cost: Option<f64>,
    pub timestamp: i64,
}
