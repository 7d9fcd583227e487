//! # Brewbus
//!
//! Topic bus for coffee-machine fleet telemetry. Polls the simulator's
//! stats endpoint and republishes every machine metric as a topic event
//! that dashboards subscribe to, MQTT style.
//!
//! ## Features
//!
//! - **Topic subscriptions**: exact topics or `+` single-level wildcards
//! - **Two pollers**: aggregate stats and per-machine detail, each on its own interval
//! - **Connection events**: `connecting`, `connected`, `disconnected`, `error`
//! - **Isolation**: a failing handler never affects its siblings
//!
//! ## Modules
//!
//! - [`bus`]: the topic bus, its registry and dispatcher
//! - [`topic`]: topic layout and pattern matching
//! - [`simulator`]: REST client for the simulator
//! - [`config`]: file and environment configuration
//!
//! ## Topics
//!
//! | topic | payload |
//! |---|---|
//! | `coffeeMachine/{id}/temperature` | `{machineId, temperature, unit, timestamp}` |
//! | `coffeeMachine/{id}/waterLevel` | `{machineId, waterLevel, unit, timestamp}` |
//! | `coffeeMachine/{id}/milkLevel` | `{machineId, milkLevel, unit, timestamp}` |
//! | `coffeeMachine/{id}/beansLevel` | `{machineId, beansLevel, unit, timestamp}` |
//! | `coffeeMachine/{id}/status` | `{machineId, status, timestamp}` |
//! | `coffeeMachine/{id}/usage` | `{machineId, usageCount, lastUsage, timestamp}` |
//! | `coffeeMachine/{id}/update` | `{machineId, ...record, timestamp}` |
//! | `simulator:stats` | `{enabled, intervalMs, numberOfMachines, totalMessagesSent, lastUpdate}` |
//! | `connection` | `{status, error?}` |

pub mod bus;
pub mod config;
pub mod logging;
pub mod simulator;
pub mod topic;

pub use bus::{
    BusError, ConnectionEvent, ConnectionState, ConnectionStatus, Dispatcher, Handler, PollKind,
    SimulatorStatsEvent, SubscriptionRegistry, TopicBus,
};

pub use config::{BusConfig, Config, ConfigError, LoggingConfig, SimulatorConfig};

pub use simulator::{
    MachineRecord, SimulatorApi, SimulatorClient, SimulatorError, SimulatorSnapshot,
};

pub use topic::{MachineMetric, TopicPattern};
