//! Simulator Integration
//!
//! The coffee-machine simulator exposes its state over REST:
//!
//! - `GET /api/simulator/stats` - counters plus per-machine state
//! - `POST /api/simulator/trigger` - generate one round of data now
//! - `POST /api/simulator/reset` - reset every machine
//! - `GET /api/simulator/health` - liveness of the simulator
//!
//! [`SimulatorApi`] is the seam the bus polls through; [`SimulatorClient`]
//! is the reqwest implementation.

mod client;
mod types;

pub use client::{SimulatorClient, SimulatorError};
pub use types::{machine_id, MachineRecord, SimulatorSnapshot};

use async_trait::async_trait;
use serde_json::Value;

/// Operations the bus needs from the simulator
#[async_trait]
pub trait SimulatorApi: Send + Sync {
    /// Fetch the current stats snapshot
    async fn fetch_stats(&self) -> Result<SimulatorSnapshot, SimulatorError>;

    /// Ask the simulator to generate data immediately
    async fn trigger(&self) -> Result<Value, SimulatorError>;

    /// Reset all machine states
    async fn reset(&self) -> Result<Value, SimulatorError>;

    /// Simulator health report
    async fn health(&self) -> Result<Value, SimulatorError>;
}
