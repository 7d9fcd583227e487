//! Snapshot Dispatcher
//!
//! Turns one simulator snapshot into topic events:
//!
//! 1. `simulator:stats` with the aggregate counters (stats poll only)
//! 2. per machine, one event per metric present in its record
//! 3. per machine, one consolidated `update` event

use super::events::{metric_payload, to_payload, update_payload, SimulatorStatsEvent};
use super::registry::SubscriptionRegistry;
use crate::config::BusConfig;
use crate::simulator::{machine_id, MachineRecord, SimulatorSnapshot};
use crate::topic::{self, MachineMetric};

/// Decomposes snapshots into events on a registry
#[derive(Debug, Clone)]
pub struct Dispatcher {
    topic_root: String,
    key_prefix: String,
}

impl Dispatcher {
    pub fn new(topic_root: impl Into<String>, key_prefix: impl Into<String>) -> Self {
        Self {
            topic_root: topic_root.into(),
            key_prefix: key_prefix.into(),
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(&config.topic_root, &config.machine_key_prefix)
    }

    pub fn topic_root(&self) -> &str {
        &self.topic_root
    }

    /// Emit the stats event followed by every machine's events.
    ///
    /// A snapshot without a `machines` object emits nothing. `is_live` is
    /// checked before each step; once it returns false the rest of the
    /// snapshot is dropped. Returns the number of events emitted.
    pub fn dispatch_snapshot(
        &self,
        registry: &SubscriptionRegistry,
        snapshot: &SimulatorSnapshot,
        is_live: &dyn Fn() -> bool,
    ) -> usize {
        if snapshot.machines.is_none() || !is_live() {
            return 0;
        }

        let stats = SimulatorStatsEvent::from(snapshot);
        registry.emit(topic::SIMULATOR_STATS, &to_payload(&stats));

        1 + self.dispatch_machines(registry, snapshot, is_live)
    }

    /// Emit every machine's events, without the stats event.
    pub fn dispatch_machines(
        &self,
        registry: &SubscriptionRegistry,
        snapshot: &SimulatorSnapshot,
        is_live: &dyn Fn() -> bool,
    ) -> usize {
        let mut emitted = 0;

        for (key, record) in snapshot.machines() {
            if !is_live() {
                tracing::debug!(machine = %key, "Bus no longer live, dropping rest of snapshot");
                break;
            }
            let id = machine_id(key, &self.key_prefix);
            emitted += self.dispatch_machine(registry, id, &record);
        }

        emitted
    }

    /// Emit the metric events and the `update` event for one machine.
    pub fn dispatch_machine(
        &self,
        registry: &SubscriptionRegistry,
        machine_id: &str,
        record: &MachineRecord<'_>,
    ) -> usize {
        let mut emitted = 0;

        for metric in MachineMetric::ALL {
            if let Some(payload) = metric_payload(metric, machine_id, record) {
                registry.emit(&metric.topic(&self.topic_root, machine_id), &payload);
                emitted += 1;
            }
        }

        let update = update_payload(machine_id, record);
        registry.emit(&topic::update_topic(&self.topic_root, machine_id), &update);

        emitted + 1
    }
}
