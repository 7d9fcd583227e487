//! Topics
//!
//! Topic naming for the bus.
//!
//! ## Layout
//!
//! - `{root}/{machineId}/{metric}` - one metric of one machine
//!   (e.g. `coffeeMachine/7/temperature`)
//! - `{root}/{machineId}/update` - full machine record
//! - `simulator:stats` - aggregate simulator counters
//! - `connection` - bus connection state changes
//!
//! Subscriptions may use `+` in place of any one segment
//! (e.g. `coffeeMachine/+/temperature`).

mod pattern;

pub use pattern::{TopicPattern, SEPARATOR, WILDCARD};

/// Default topic root for machine topics
pub const DEFAULT_ROOT: &str = "coffeeMachine";

/// Connection state change notifications
pub const CONNECTION: &str = "connection";

/// Aggregate simulator counters, one event per stats poll
pub const SIMULATOR_STATS: &str = "simulator:stats";

/// Suffix of the consolidated per-machine update topic
pub const UPDATE: &str = "update";

/// Topic for one metric of one machine
pub fn machine_topic(root: &str, machine_id: &str, segment: &str) -> String {
    format!("{}/{}/{}", root, machine_id, segment)
}

/// Topic for the consolidated record of one machine
pub fn update_topic(root: &str, machine_id: &str) -> String {
    machine_topic(root, machine_id, UPDATE)
}

/// Wildcard pattern covering one topic segment across every machine
pub fn all_machines(root: &str, segment: &str) -> String {
    machine_topic(root, WILDCARD, segment)
}

/// Metrics published per machine, in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineMetric {
    Temperature,
    WaterLevel,
    MilkLevel,
    BeansLevel,
    Status,
    Usage,
}

impl MachineMetric {
    /// Every metric, in the order the dispatcher emits them
    pub const ALL: [MachineMetric; 6] = [
        MachineMetric::Temperature,
        MachineMetric::WaterLevel,
        MachineMetric::MilkLevel,
        MachineMetric::BeansLevel,
        MachineMetric::Status,
        MachineMetric::Usage,
    ];

    /// Field in the machine record that carries this metric
    pub fn field(&self) -> &'static str {
        match self {
            MachineMetric::Temperature => "temperature",
            MachineMetric::WaterLevel => "waterLevel",
            MachineMetric::MilkLevel => "milkLevel",
            MachineMetric::BeansLevel => "beansLevel",
            MachineMetric::Status => "status",
            MachineMetric::Usage => "usageCount",
        }
    }

    /// Last topic segment for this metric
    pub fn segment(&self) -> &'static str {
        match self {
            MachineMetric::Usage => "usage",
            other => other.field(),
        }
    }

    /// Unit attached to the event payload, if the metric has one
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            MachineMetric::Temperature => Some("Celsius"),
            MachineMetric::WaterLevel | MachineMetric::MilkLevel | MachineMetric::BeansLevel => {
                Some("percent")
            }
            MachineMetric::Status | MachineMetric::Usage => None,
        }
    }

    /// Topic for this metric on one machine
    pub fn topic(&self, root: &str, machine_id: &str) -> String {
        machine_topic(root, machine_id, self.segment())
    }

    /// Wildcard pattern for this metric on every machine
    pub fn wildcard(&self, root: &str) -> String {
        all_machines(root, self.segment())
    }
}
