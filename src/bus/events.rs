//! Event payloads
//!
//! Every event on the bus carries a JSON object. The shapes below are what
//! downstream dashboards read, so field names and ordering are fixed.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::simulator::{MachineRecord, SimulatorSnapshot};
use crate::topic::MachineMetric;

/// Connection state of the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload published on the `connection` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub status: ConnectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionEvent {
    pub fn new(status: ConnectionState) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ConnectionState::Error,
            error: Some(message.into()),
        }
    }
}

/// Payload published on the `simulator:stats` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorStatsEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_machines: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_messages_sent: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<Value>,
}

impl From<&SimulatorSnapshot> for SimulatorStatsEvent {
    fn from(snapshot: &SimulatorSnapshot) -> Self {
        Self {
            enabled: snapshot.enabled.clone(),
            interval_ms: snapshot.interval_ms.clone(),
            number_of_machines: snapshot.number_of_machines.clone(),
            total_messages_sent: snapshot.total_messages_sent.clone(),
            last_update: snapshot.last_update.clone(),
        }
    }
}

/// Serialize a typed payload for emission
pub fn to_payload<T: Serialize>(event: &T) -> Value {
    serde_json::to_value(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize event payload");
        Value::Null
    })
}

/// Capture time attached to machine events: ISO-8601, UTC, milliseconds
pub fn capture_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the payload for one metric of one machine.
///
/// Returns `None` when the record has no such field. A field present with
/// `null` still produces a payload.
pub fn metric_payload(
    metric: MachineMetric,
    machine_id: &str,
    record: &MachineRecord<'_>,
) -> Option<Value> {
    let value = record.get(metric.field())?;

    let mut payload = Map::new();
    payload.insert("machineId".to_string(), Value::from(machine_id));
    payload.insert(metric.field().to_string(), value.clone());
    if let Some(unit) = metric.unit() {
        payload.insert("unit".to_string(), Value::from(unit));
    }
    if metric == MachineMetric::Usage {
        if let Some(last_usage) = record.get("lastUsage") {
            payload.insert("lastUsage".to_string(), last_usage.clone());
        }
    }
    payload.insert("timestamp".to_string(), Value::from(capture_timestamp()));

    Some(Value::Object(payload))
}

/// Build the consolidated `update` payload: machine id, then every record
/// field (a record field named `machineId` wins), then a fresh timestamp.
/// A record field named `timestamp` keeps its position but takes the fresh
/// value.
pub fn update_payload(machine_id: &str, record: &MachineRecord<'_>) -> Value {
    let mut payload = Map::new();
    payload.insert("machineId".to_string(), Value::from(machine_id));
    for (key, value) in record.fields() {
        payload.insert(key.clone(), value.clone());
    }
    payload.insert("timestamp".to_string(), Value::from(capture_timestamp()));

    Value::Object(payload)
}
