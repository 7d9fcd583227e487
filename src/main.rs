//! Brewbus CLI
//!
//! Command-line front end for the topic bus:
//! - Watch live topic events
//! - Inspect simulator stats and health
//! - Trigger or reset the simulator

use anyhow::Context;
use brewbus::config::{generate_default_config, Config};
use brewbus::topic::{self, MachineMetric};
use brewbus::{Handler, SimulatorStatsEvent, TopicBus};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "brewbus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Topic bus for coffee-machine fleet telemetry")]
#[command(long_about = "Brewbus polls the coffee-machine simulator and republishes every machine metric as a topic event.\nSubscribe with exact topics or '+' wildcards, e.g. coffeeMachine/+/temperature.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Simulator base URL (overrides config)
    #[arg(long, global = true)]
    pub simulator_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream topic events as JSON lines ({pattern, data})
    Watch {
        /// Topic patterns to subscribe to (default: every machine metric,
        /// machine updates, simulator stats and connection events)
        patterns: Vec<String>,

        /// Poll once, print the events and exit
        #[arg(long)]
        once: bool,
    },
    /// Print the current simulator stats
    Stats,
    /// Print the simulator health report
    Health,
    /// Ask the simulator to generate data now
    Trigger,
    /// Reset every simulated machine
    Reset,
    /// Print a default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig = cli.command {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.simulator_url {
        config.simulator.base_url = url.clone();
    }

    brewbus::logging::init(&config.logging);
    tracing::debug!(simulator = %config.simulator.base_url, "Brewbus v{}", env!("CARGO_PKG_VERSION"));

    let bus = Arc::new(TopicBus::from_config(&config)?);

    match cli.command {
        Commands::Watch { patterns, once } => watch(&bus, patterns, once).await?,
        Commands::Stats => {
            let snapshot = bus
                .fetch_snapshot()
                .await
                .context("Cannot reach the simulator")?;
            print_json(&serde_json::to_value(SimulatorStatsEvent::from(&snapshot))?)?;

            if snapshot.machines.is_none() {
                println!("Simulator returned no machines.");
            }
        }
        Commands::Health => print_json(&bus.health().await?)?,
        Commands::Trigger => print_json(&bus.trigger_data_generation().await?)?,
        Commands::Reset => print_json(&bus.reset_machine_states().await?)?,
        Commands::InitConfig => {}
    }

    Ok(())
}

/// Patterns watched when none are given
fn default_patterns(root: &str) -> Vec<String> {
    let mut patterns: Vec<String> = MachineMetric::ALL
        .iter()
        .map(|m| m.wildcard(root))
        .collect();
    patterns.push(topic::all_machines(root, topic::UPDATE));
    patterns.push(topic::SIMULATOR_STATS.to_string());
    patterns.push(topic::CONNECTION.to_string());
    patterns
}

async fn watch(bus: &Arc<TopicBus>, patterns: Vec<String>, once: bool) -> anyhow::Result<()> {
    let patterns = if patterns.is_empty() {
        default_patterns(bus.topic_root())
    } else {
        patterns
    };

    for pattern in &patterns {
        let tag = pattern.clone();
        bus.subscribe(
            pattern,
            Handler::new(move |data| {
                let line = serde_json::json!({ "pattern": tag, "data": data });
                println!("{}", serde_json::to_string(&line)?);
                Ok(())
            }),
        );
    }

    if once {
        bus.poll_now().await.context("Cannot reach the simulator")?;
        bus.shutdown();
        return Ok(());
    }

    tracing::info!(patterns = ?patterns, "Watching topics, press Ctrl-C to stop");
    bus.connect();
    tokio::signal::ctrl_c().await?;
    bus.shutdown();

    Ok(())
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
