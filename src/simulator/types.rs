//! Simulator payloads
//!
//! Shapes returned by `GET /api/simulator/stats`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One polled snapshot of the simulator: aggregate counters plus the
/// per-machine state keyed by machine key (e.g. `Machine_7`).
///
/// Counters are passed through as whatever JSON the simulator sent, so an
/// unexpected counter type never blocks the machine events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorSnapshot {
    pub enabled: Option<Value>,
    pub interval_ms: Option<Value>,
    pub number_of_machines: Option<Value>,
    pub total_messages_sent: Option<Value>,
    pub last_update: Option<Value>,
    /// Machine records are kept as raw JSON so that a missing field and a
    /// field explicitly set to `null` stay distinguishable.
    pub machines: Option<Map<String, Value>>,
}

impl SimulatorSnapshot {
    /// Iterate machines in payload order. Yields nothing when the snapshot
    /// has no `machines` object.
    pub fn machines(&self) -> impl Iterator<Item = (&str, MachineRecord<'_>)> {
        self.machines
            .iter()
            .flat_map(|m| m.iter())
            .map(|(key, value)| (key.as_str(), MachineRecord::new(value)))
    }

    /// Number of machines present in the snapshot
    pub fn machine_count(&self) -> usize {
        self.machines.as_ref().map(|m| m.len()).unwrap_or(0)
    }
}

/// Borrowed view of one machine's state.
///
/// A record that is not a JSON object behaves as an empty record.
#[derive(Debug, Clone, Copy)]
pub struct MachineRecord<'a> {
    fields: Option<&'a Map<String, Value>>,
}

impl<'a> MachineRecord<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self {
            fields: value.as_object(),
        }
    }

    /// Value of a field. `Some(Value::Null)` for a field present as null.
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.fields.and_then(|f| f.get(field))
    }

    /// All fields in payload order
    pub fn fields(&self) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.fields.into_iter().flat_map(|f| f.iter())
    }
}

/// Derive a machine id from a snapshot key by stripping `prefix`.
///
/// Keys without the prefix are returned unchanged.
pub fn machine_id<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix).unwrap_or(key)
}
