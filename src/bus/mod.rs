//! Topic Bus
//!
//! Publish/subscribe façade over periodic HTTP polling of the simulator.
//!
//! ## Architecture
//!
//! - **Registry**: pattern → ordered handlers, with `+` wildcards
//! - **Dispatcher**: snapshot → per-machine, per-metric events
//! - **Pollers**: two independent interval tasks (stats, machines)
//! - **Connection state**: published on the `connection` topic
//!
//! ## Lifecycle
//!
//! The application owns one bus and shares it by `Arc`. `connect()` starts
//! the pollers, `disconnect()` stops them, `shutdown()` also drops every
//! subscription. Subscriptions survive reconnects.
//!
//! ```rust,no_run
//! use brewbus::{Config, Handler, TopicBus};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = Arc::new(TopicBus::from_config(&Config::default())?);
//!
//!     bus.subscribe(
//!         "coffeeMachine/+/temperature",
//!         Handler::new(|data| {
//!             println!("temperature: {}", data["temperature"]);
//!             Ok(())
//!         }),
//!     );
//!
//!     bus.connect();
//!     tokio::signal::ctrl_c().await?;
//!     bus.shutdown();
//!     Ok(())
//! }
//! ```

mod dispatch;
mod events;
mod registry;

pub use dispatch::Dispatcher;
pub use events::{
    capture_timestamp, ConnectionEvent, ConnectionState, SimulatorStatsEvent,
};
pub use registry::{Handler, SubscriptionRegistry};

use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{BusConfig, Config};
use crate::simulator::{SimulatorApi, SimulatorClient, SimulatorError, SimulatorSnapshot};
use crate::topic;
use events::to_payload;

/// Which of the two pollers a cycle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    /// Stats event plus machine events
    Stats,
    /// Machine events only
    Machines,
}

impl PollKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollKind::Stats => "stats",
            PollKind::Machines => "machines",
        }
    }
}

/// Snapshot of the bus connection, as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub status: ConnectionState,
    /// Always 0: the bus never reconnects on its own
    pub reconnect_attempts: u32,
}

/// Errors raised while setting up the bus
#[derive(Debug, Error)]
pub enum BusError {
    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}

/// Mutable connection state, guarded as one unit so the state, the
/// session epoch and the poller handles never disagree
struct Session {
    state: ConnectionState,
    /// Bumped on every connect and disconnect; pollers remember the epoch
    /// they were started in and stand down once it moves on
    epoch: u64,
    stats_task: Option<JoinHandle<()>>,
    machine_task: Option<JoinHandle<()>>,
}

impl Session {
    fn abort_pollers(&mut self) {
        for task in [self.stats_task.take(), self.machine_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }

    fn active_pollers(&self) -> usize {
        [&self.stats_task, &self.machine_task]
            .into_iter()
            .flatten()
            .filter(|t| !t.is_finished())
            .count()
    }
}

/// Topic-addressed publish/subscribe bus fed by simulator polling
pub struct TopicBus {
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    api: Arc<dyn SimulatorApi>,
    config: BusConfig,
    session: Mutex<Session>,
    /// Serializes snapshot fan-out so two ticks never interleave handlers
    dispatch_lock: Mutex<()>,
}

impl TopicBus {
    /// Create a bus that polls through `api`
    pub fn new(config: BusConfig, api: Arc<dyn SimulatorApi>) -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            dispatcher: Dispatcher::from_config(&config),
            api,
            config,
            session: Mutex::new(Session {
                state: ConnectionState::Disconnected,
                epoch: 0,
                stats_task: None,
                machine_task: None,
            }),
            dispatch_lock: Mutex::new(()),
        }
    }

    /// Create a bus backed by the HTTP simulator client
    pub fn from_config(config: &Config) -> Result<Self, SimulatorError> {
        let client = SimulatorClient::new(&config.simulator)?;
        Ok(Self::new(config.bus.clone(), Arc::new(client)))
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Topic root used for machine topics
    pub fn topic_root(&self) -> &str {
        self.dispatcher.topic_root()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================
    // Subscriptions
    // ============================================

    /// Register `handler` for `pattern` (`+` matches one segment)
    pub fn subscribe(&self, pattern: &str, handler: Handler) {
        self.registry.subscribe(pattern, handler);
    }

    /// Remove one registration of `handler` under `pattern`
    pub fn unsubscribe(&self, pattern: &str, handler: &Handler) -> bool {
        self.registry.unsubscribe(pattern, handler)
    }

    /// Deliver `data` to every handler matching `topic`
    pub fn emit(&self, topic: &str, data: &Value) -> usize {
        self.registry.emit(topic, data)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    // ============================================
    // Connection lifecycle
    // ============================================

    /// Start polling.
    ///
    /// Moves through `connecting` to `connected` without waiting for the
    /// first poll, or to `error` if the pollers cannot be started. Calling
    /// it again replaces the running pollers.
    pub fn connect(self: &Arc<Self>) {
        self.transition(ConnectionEvent::new(ConnectionState::Connecting));

        match self.start_polling() {
            Ok(()) => {
                tracing::info!(
                    stats_interval_ms = self.config.stats_interval_ms,
                    machine_interval_ms = self.config.machine_interval_ms,
                    "Topic bus connected via HTTP polling"
                );
                self.publish_state(ConnectionEvent::new(ConnectionState::Connected));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect topic bus");
                self.transition(ConnectionEvent::error(e.to_string()));
            }
        }
    }

    /// Stop polling and report `disconnected`. Safe to call at any time.
    ///
    /// A poll response that arrives afterwards is discarded.
    pub fn disconnect(&self) {
        {
            let mut session = self.session();
            session.abort_pollers();
            session.epoch += 1;
        }
        tracing::info!("Topic bus disconnected");
        self.transition(ConnectionEvent::new(ConnectionState::Disconnected));
    }

    /// Disconnect and drop every subscription
    pub fn shutdown(&self) {
        self.disconnect();
        self.registry.clear();
        tracing::debug!("Topic bus shut down");
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        let state = self.session().state;
        ConnectionStatus {
            is_connected: state == ConnectionState::Connected,
            status: state,
            reconnect_attempts: 0,
        }
    }

    /// Number of poller tasks currently alive (0 to 2)
    pub fn active_pollers(&self) -> usize {
        self.session().active_pollers()
    }

    /// Record a new state and publish it
    fn transition(&self, event: ConnectionEvent) {
        self.session().state = event.status;
        self.publish_state(event);
    }

    /// Publish on the `connection` topic; the lock is not held while
    /// handlers run
    fn publish_state(&self, event: ConnectionEvent) {
        self.registry.emit(topic::CONNECTION, &to_payload(&event));
    }

    fn start_polling(self: &Arc<Self>) -> Result<(), BusError> {
        let mut session = self.session();
        session.abort_pollers();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BusError::NoRuntime(e.to_string()))?;

        session.epoch += 1;
        let epoch = session.epoch;

        session.stats_task = Some(runtime.spawn(run_poller(
            Arc::downgrade(self),
            PollKind::Stats,
            epoch,
            self.config.stats_interval(),
        )));
        session.machine_task = Some(runtime.spawn(run_poller(
            Arc::downgrade(self),
            PollKind::Machines,
            epoch,
            self.config.machine_interval(),
        )));
        session.state = ConnectionState::Connected;

        Ok(())
    }

    // ============================================
    // Polling
    // ============================================

    /// True while the bus is connected in session `epoch`
    fn is_live(&self, epoch: u64) -> bool {
        let session = self.session();
        session.epoch == epoch && session.state == ConnectionState::Connected
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.session().epoch == epoch
    }

    /// One scheduled poll: fetch, then dispatch if the session is still live.
    /// Failures are logged and the tick is skipped.
    async fn poll_cycle(&self, kind: PollKind, epoch: u64) {
        match self.api.fetch_stats().await {
            Ok(snapshot) => {
                let emitted = self.dispatch(kind, &snapshot, &|| self.is_live(epoch));
                tracing::debug!(
                    poll = kind.as_str(),
                    machines = snapshot.machine_count(),
                    events = emitted,
                    "Poll dispatched"
                );
            }
            Err(e) => {
                tracing::warn!(poll = kind.as_str(), error = %e, "Poll failed, skipping tick");
            }
        }
    }

    fn dispatch(
        &self,
        kind: PollKind,
        snapshot: &SimulatorSnapshot,
        is_live: &dyn Fn() -> bool,
    ) -> usize {
        let _guard = self
            .dispatch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match kind {
            PollKind::Stats => self
                .dispatcher
                .dispatch_snapshot(&self.registry, snapshot, is_live),
            PollKind::Machines => self
                .dispatcher
                .dispatch_machines(&self.registry, snapshot, is_live),
        }
    }

    /// Fetch the current snapshot without dispatching it
    pub async fn fetch_snapshot(&self) -> Result<SimulatorSnapshot, SimulatorError> {
        self.api.fetch_stats().await
    }

    /// Run one stats poll immediately and dispatch it whatever the
    /// connection state. Unlike scheduled polls, a failure is returned.
    /// Returns the number of events emitted.
    pub async fn poll_now(&self) -> Result<usize, SimulatorError> {
        let snapshot = self.api.fetch_stats().await?;
        Ok(self.dispatch(PollKind::Stats, &snapshot, &|| true))
    }

    // ============================================
    // Simulator control
    // ============================================

    /// Ask the simulator to generate a round of data now
    pub async fn trigger_data_generation(&self) -> Result<Value, SimulatorError> {
        self.api.trigger().await
    }

    /// Reset every simulated machine
    pub async fn reset_machine_states(&self) -> Result<Value, SimulatorError> {
        self.api.reset().await
    }

    /// Simulator health report
    pub async fn health(&self) -> Result<Value, SimulatorError> {
        self.api.health().await
    }
}

impl Drop for TopicBus {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        session.abort_pollers();
    }
}

/// Poller task body. The first tick fires one full period after start.
async fn run_poller(bus: Weak<TopicBus>, kind: PollKind, epoch: u64, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(bus) = bus.upgrade() else {
            break;
        };
        if !bus.is_current(epoch) {
            break;
        }
        bus.poll_cycle(kind, epoch).await;
    }

    tracing::debug!(poll = kind.as_str(), "Poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory simulator: serves a fixed snapshot (or a status error)
    struct FakeSimulator {
        snapshot: Mutex<Result<SimulatorSnapshot, u16>>,
        fetches: AtomicUsize,
        latency: Duration,
    }

    impl FakeSimulator {
        fn serving(json: Value) -> Arc<Self> {
            Self::with_latency(json, Duration::ZERO)
        }

        fn with_latency(json: Value, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(Ok(serde_json::from_value(json).unwrap())),
                fetches: AtomicUsize::new(0),
                latency,
            })
        }

        fn fail_with(&self, status: u16) {
            *self.snapshot.lock().unwrap() = Err(status);
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SimulatorApi for FakeSimulator {
        async fn fetch_stats(&self) -> Result<SimulatorSnapshot, SimulatorError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.snapshot
                .lock()
                .unwrap()
                .clone()
                .map_err(|status| SimulatorError::Status(status).context("fetch simulator stats"))
        }

        async fn trigger(&self) -> Result<Value, SimulatorError> {
            Ok(json!({"triggered": true}))
        }

        async fn reset(&self) -> Result<Value, SimulatorError> {
            Err(SimulatorError::Status(503))
        }

        async fn health(&self) -> Result<Value, SimulatorError> {
            Ok(json!({"status": "UP"}))
        }
    }

    type Log = Arc<Mutex<Vec<(String, Value)>>>;

    fn bus_with(api: Arc<FakeSimulator>) -> Arc<TopicBus> {
        Arc::new(TopicBus::new(BusConfig::default(), api))
    }

    /// Subscribe a recorder on `pattern`; entries are tagged with the
    /// pattern they came through
    fn record(bus: &TopicBus, pattern: &str, log: &Log) -> Handler {
        let log = Arc::clone(log);
        let tag = pattern.to_string();
        let handler = Handler::new(move |data| {
            log.lock().unwrap().push((tag.clone(), data.clone()));
            Ok(())
        });
        bus.subscribe(pattern, handler.clone());
        handler
    }

    fn statuses(log: &Log) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic::CONNECTION)
            .map(|(_, d)| d["status"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn machine_7() -> Value {
        json!({
            "enabled": true,
            "intervalMs": 30000,
            "numberOfMachines": 1,
            "totalMessagesSent": 10,
            "lastUpdate": "2024-03-01T10:00:00Z",
            "machines": {"Machine_7": {"temperature": 91, "waterLevel": 15, "status": "ON"}}
        })
    }

    /// Let the paused clock run past `ms` and give spawned tasks a turn
    async fn advance_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_disconnect_without_connect() {
        let bus = bus_with(FakeSimulator::serving(machine_7()));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, topic::CONNECTION, &log);

        bus.disconnect();

        let status = bus.connection_status();
        assert_eq!(status.status, ConnectionState::Disconnected);
        assert!(!status.is_connected);
        assert_eq!(statuses(&log), vec!["disconnected"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_transitions() {
        let bus = bus_with(FakeSimulator::serving(machine_7()));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, topic::CONNECTION, &log);

        bus.connect();
        assert!(bus.connection_status().is_connected);
        assert_eq!(bus.active_pollers(), 2);

        bus.disconnect();
        assert_eq!(bus.connection_status().status, ConnectionState::Disconnected);
        assert_eq!(
            statuses(&log),
            vec!["connecting", "connected", "disconnected"]
        );

        tokio::task::yield_now().await;
        assert_eq!(bus.active_pollers(), 0);
    }

    #[test]
    fn test_connect_without_runtime_reports_error() {
        let bus = bus_with(FakeSimulator::serving(machine_7()));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, topic::CONNECTION, &log);

        bus.connect();

        let status = bus.connection_status();
        assert_eq!(status.status, ConnectionState::Error);
        assert!(!status.is_connected);
        assert_eq!(statuses(&log), vec!["connecting", "error"]);

        let log = log.lock().unwrap();
        assert!(log[1].1["error"]
            .as_str()
            .unwrap()
            .starts_with("No async runtime available"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_waits_one_interval() {
        let api = FakeSimulator::serving(machine_7());
        let bus = bus_with(Arc::clone(&api));

        bus.connect();
        advance_ms(29_000).await;
        assert_eq!(api.fetches(), 0);

        advance_ms(1_500).await;
        // one fetch per poller
        assert_eq!(api.fetches(), 2);

        bus.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_fan_out_to_subscribers() {
        let api = FakeSimulator::serving(machine_7());
        let bus = bus_with(Arc::clone(&api));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, topic::SIMULATOR_STATS, &log);
        record(&bus, "coffeeMachine/+/update", &log);
        record(&bus, "coffeeMachine/7/temperature", &log);

        bus.connect();
        advance_ms(30_500).await;

        let log = log.lock().unwrap();
        let count = |tag: &str| log.iter().filter(|(t, _)| t == tag).count();
        // stats only from the stats poller, machine events from both
        assert_eq!(count(topic::SIMULATOR_STATS), 1);
        assert_eq!(count("coffeeMachine/+/update"), 2);
        assert_eq!(count("coffeeMachine/7/temperature"), 2);

        let stats = &log.iter().find(|(t, _)| t == topic::SIMULATOR_STATS).unwrap().1;
        assert_eq!(stats["totalMessagesSent"], 10);
        drop(log);

        bus.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_is_skipped_and_retried() {
        let api = FakeSimulator::serving(machine_7());
        api.fail_with(500);
        let bus = bus_with(Arc::clone(&api));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, "coffeeMachine/+/+", &log);

        bus.connect();
        advance_ms(30_500).await;
        assert_eq!(api.fetches(), 2);
        assert!(log.lock().unwrap().is_empty());
        // failures never touch the connection state
        assert!(bus.connection_status().is_connected);

        *api.snapshot.lock().unwrap() = Ok(serde_json::from_value(machine_7()).unwrap());
        advance_ms(30_000).await;
        assert_eq!(api.fetches(), 4);
        assert!(!log.lock().unwrap().is_empty());

        bus.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_connect_does_not_leak_pollers() {
        let api = FakeSimulator::serving(machine_7());
        let bus = bus_with(Arc::clone(&api));

        bus.connect();
        bus.connect();
        tokio::task::yield_now().await;
        assert_eq!(bus.active_pollers(), 2);

        advance_ms(30_500).await;
        assert_eq!(api.fetches(), 2);

        advance_ms(30_000).await;
        assert_eq!(api.fetches(), 4);

        bus.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_events_after_disconnect() {
        let api = FakeSimulator::with_latency(machine_7(), Duration::from_secs(5));
        let bus = bus_with(Arc::clone(&api));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, "coffeeMachine/+/+", &log);

        bus.connect();
        // ticks fire at 30s, responses are still in flight
        advance_ms(31_000).await;
        assert_eq!(api.fetches(), 2);

        bus.disconnect();
        advance_ms(60_000).await;

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(api.fetches(), 2);
    }

    #[test]
    fn test_stale_epoch_is_not_dispatched() {
        let bus = bus_with(FakeSimulator::serving(machine_7()));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, "coffeeMachine/+/+", &log);

        let snapshot: SimulatorSnapshot = serde_json::from_value(machine_7()).unwrap();
        // never connected: epoch 0 is current but the state is disconnected
        let emitted = bus.dispatch(PollKind::Machines, &snapshot, &|| bus.is_live(0));

        assert_eq!(emitted, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_survive_reconnect() {
        let api = FakeSimulator::serving(machine_7());
        let bus = bus_with(Arc::clone(&api));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, "coffeeMachine/7/status", &log);

        bus.connect();
        bus.disconnect();
        bus.connect();
        advance_ms(30_500).await;

        assert_eq!(log.lock().unwrap().len(), 2);
        bus.disconnect();
    }

    #[tokio::test]
    async fn test_poll_now_dispatches_and_propagates_errors() {
        let api = FakeSimulator::serving(machine_7());
        let bus = bus_with(Arc::clone(&api));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, "coffeeMachine/7/+", &log);

        // stats + temperature + waterLevel + status + update
        assert_eq!(bus.poll_now().await.unwrap(), 5);
        assert_eq!(log.lock().unwrap().len(), 4);

        api.fail_with(502);
        let err = bus.poll_now().await.unwrap_err();
        assert_eq!(err.status(), Some(502));
    }

    #[tokio::test]
    async fn test_unsubscribed_handler_gets_nothing() {
        let bus = bus_with(FakeSimulator::serving(machine_7()));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let handler = record(&bus, "coffeeMachine/+/temperature", &log);

        assert!(bus.unsubscribe("coffeeMachine/+/temperature", &handler));
        bus.poll_now().await.unwrap();

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_control_calls() {
        let bus = bus_with(FakeSimulator::serving(machine_7()));

        assert_eq!(
            bus.trigger_data_generation().await.unwrap(),
            json!({"triggered": true})
        );
        assert_eq!(bus.health().await.unwrap()["status"], "UP");
        assert!(matches!(
            bus.reset_machine_states().await,
            Err(SimulatorError::Status(503))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_clears_subscriptions() {
        let bus = bus_with(FakeSimulator::serving(machine_7()));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, topic::CONNECTION, &log);

        bus.connect();
        bus.shutdown();

        assert_eq!(bus.registry().pattern_count(), 0);
        assert_eq!(bus.active_pollers(), 0);
        // the disconnect notice still reached the subscriber before the clear
        assert_eq!(statuses(&log).last().map(String::as_str), Some("disconnected"));
    }

    #[tokio::test]
    async fn test_fractional_counters_do_not_block_machine_events() {
        let api = FakeSimulator::serving(json!({
            "enabled": true,
            "intervalMs": 30000.0,
            "numberOfMachines": 1,
            "totalMessagesSent": 10,
            "lastUpdate": "2024-03-01T10:00:00Z",
            "machines": {"Machine_7": {"temperature": 91, "status": "ON"}}
        }));
        let bus = bus_with(api);
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, topic::SIMULATOR_STATS, &log);
        record(&bus, "coffeeMachine/7/+", &log);

        // stats + temperature + status + update
        assert_eq!(bus.poll_now().await.unwrap(), 4);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].1["intervalMs"], json!(30000.0));
        assert_eq!(log[1].1["temperature"], 91);
    }

    #[tokio::test]
    async fn test_fetch_snapshot_does_not_dispatch() {
        let bus = bus_with(FakeSimulator::serving(json!({
            "enabled": false,
            "totalMessagesSent": 42
        })));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, topic::SIMULATOR_STATS, &log);

        let snapshot = bus.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.total_messages_sent, Some(json!(42)));
        assert!(snapshot.machines.is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_fan_outs_never_interleave() {
        let api = FakeSimulator::serving(json!({
            "machines": {
                "Machine_1": {"temperature": 90},
                "Machine_2": {"temperature": 92}
            }
        }));
        let config = BusConfig {
            stats_interval_ms: 10,
            machine_interval_ms: 10,
            ..BusConfig::default()
        };
        let bus = Arc::new(TopicBus::new(config, api));

        let calls: Arc<Mutex<Vec<(String, &'static str)>>> = Arc::new(Mutex::new(Vec::new()));
        let busy = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        for (pattern, tag) in [
            ("coffeeMachine/+/temperature", "temperature"),
            ("coffeeMachine/+/update", "update"),
        ] {
            let calls = Arc::clone(&calls);
            let busy = Arc::clone(&busy);
            let overlaps = Arc::clone(&overlaps);
            bus.subscribe(
                pattern,
                Handler::new(move |data| {
                    if busy.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    let id = data["machineId"].as_str().unwrap_or_default().to_string();
                    calls.lock().unwrap().push((id, tag));
                    std::thread::sleep(Duration::from_millis(2));
                    busy.store(false, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        bus.connect();
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.disconnect();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);

        let expected = [
            ("1".to_string(), "temperature"),
            ("1".to_string(), "update"),
            ("2".to_string(), "temperature"),
            ("2".to_string(), "update"),
        ];
        let calls = calls.lock().unwrap();
        assert!(calls.len() >= 2 * expected.len());

        // every fan-out is one contiguous run; only the last may be cut
        // short by the disconnect
        let mut runs = calls.chunks(expected.len());
        let last = runs.next_back().unwrap();
        for run in runs {
            assert_eq!(run, &expected[..]);
        }
        assert_eq!(last, &expected[..last.len()]);
    }

    #[test]
    fn test_connection_status_serialize() {
        let status = ConnectionStatus {
            is_connected: true,
            status: ConnectionState::Connected,
            reconnect_attempts: 0,
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({"isConnected": true, "status": "connected", "reconnectAttempts": 0})
        );
    }
}
