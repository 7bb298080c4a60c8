//! Orchestrator: drives events through agents, the store and the ocean.
//!
//! For each event with a numeric `timestamp` (others are counted and skipped):
//!
//! 1. every agent processes it concurrently on the worker pool;
//! 2. non-empty results are submitted to the store;
//! 3. when the event produced at least `batch_trigger` packets, a
//!    correlation wave runs over them and the fields touched by the wave
//!    are scanned for emergence.
//!
//! [`Orchestrator::run`] adds three periodic tasks on top of the intake loop:
//! the per-agent correlation cycle, the metrics report and the full
//! emergence sweep. A panicking agent or correlation unit is contained and
//! counted. Only store contention stops the run.

pub mod state;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

pub use state::{OrchestratorState, StopHandle};

use crate::analyzers::{build_roster, AnalyzerAgent};
use crate::config::OceanConfig;
use crate::emergence::{EmergenceDetector, EmergenceEvent, EmergenceReporter};
use crate::errors::{OceanError, Result};
use crate::event::{Event, EventSource, SourceItem};
use crate::metrics::{MetricsReport, SessionStats};
use crate::ocean::CorrelationEngine;
use crate::packet::{Domain, Packet, PacketId};
use crate::pool::{join_all, WorkerPool};
use crate::store::PacketStore;

/// Packets an agent must have in its recent window before it is asked to correlate.
const MIN_CORRELATION_EVIDENCE: usize = 3;

type SharedAgent = Arc<tokio::sync::Mutex<Box<dyn AnalyzerAgent>>>;

/// One roster entry. Id and domain are cached so they can be read without
/// waiting on the agent's lock.
struct AgentSlot {
    id: String,
    domain: Domain,
    agent: SharedAgent,
}

pub struct Orchestrator {
    config: OceanConfig,
    agents: Vec<AgentSlot>,
    store: Arc<PacketStore>,
    engine: CorrelationEngine,
    detector: EmergenceDetector,
    reporter: Arc<dyn EmergenceReporter>,
    pool: WorkerPool,
    state: StopHandle,
    stats: Mutex<SessionStats>,
    /// Evidence each agent was last asked to correlate over.
    last_evidence: Mutex<HashMap<String, Vec<PacketId>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.agent_ids())
            .field("state", &self.state())
            .field("packets", &self.store.len())
            .finish()
    }
}

impl Orchestrator {
    /// Build the configured roster and a fresh store.
    pub fn new(config: OceanConfig, reporter: Arc<dyn EmergenceReporter>) -> Result<Self> {
        config.validate()?;
        let agents = build_roster(&config)?;
        Self::with_agents(config, agents, reporter)
    }

    /// Use an explicit set of agents instead of the configured roster.
    pub fn with_agents(
        config: OceanConfig,
        agents: Vec<Box<dyn AnalyzerAgent>>,
        reporter: Arc<dyn EmergenceReporter>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.max_workers);
        let (tx, _) = tokio::sync::watch::channel(OrchestratorState::Running);
        let agents = agents
            .into_iter()
            .map(|agent| AgentSlot {
                id: agent.id().to_string(),
                domain: agent.domain(),
                agent: Arc::new(tokio::sync::Mutex::new(agent)),
            })
            .collect::<Vec<_>>();
        log::info!(
            "Orchestrator ready with {} agents, {} workers",
            agents.len(),
            pool.size()
        );

        Ok(Self {
            store: Arc::new(PacketStore::from_config(&config)),
            engine: CorrelationEngine::new(config.correlation_threshold, pool.clone()),
            detector: EmergenceDetector::from_config(&config),
            reporter,
            pool,
            state: StopHandle::new(Arc::new(tx)),
            stats: Mutex::new(SessionStats::default()),
            last_evidence: Mutex::new(HashMap::new()),
            agents,
            config,
        })
    }

    pub fn config(&self) -> &OceanConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PacketStore> {
        &self.store
    }

    pub fn agent_ids(&self) -> Vec<&str> {
        self.agents.iter().map(|slot| slot.id.as_str()).collect()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.state.clone()
    }

    /// Stop accepting events. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        self.state.stop()
    }

    /// Session counters so far.
    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.lock().clone();
        stats.correlation_failures = self.engine.unit_failures();
        stats
    }

    /// Session counters plus a store snapshot.
    pub fn metrics(&self) -> MetricsReport {
        MetricsReport::new(self.stats(), self.store.metrics())
    }

    // -----------------------------------------------------------------------
    // Event path
    // -----------------------------------------------------------------------

    /// Process one event and return every packet it produced, primary
    /// packets first, then correlation packets.
    pub async fn handle_event(&self, event: Event) -> Result<Vec<Packet>> {
        if self.state.is_stopped() {
            return Err(OceanError::Stopped);
        }
        let result = self.dispatch(event).await;
        self.stop_on_fatal(result)
    }

    async fn dispatch(&self, event: Event) -> Result<Vec<Packet>> {
        if event.timestamp().is_none() {
            log::debug!("Skipping event without a numeric timestamp");
            self.stats.lock().malformed_events += 1;
            return Ok(Vec::new());
        }
        let event = Arc::new(event);
        let handles: Vec<_> = self
            .agents
            .iter()
            .map(|slot| {
                let agent = Arc::clone(&slot.agent);
                let event = Arc::clone(&event);
                self.pool
                    .spawn(async move { agent.lock().await.process(&event).await })
            })
            .collect();
        let results = join_all(handles).await;

        let mut primary = Vec::new();
        let mut failures = 0u64;
        let mut rejected = 0u64;
        for (slot, joined) in self.agents.iter().zip(results) {
            match joined {
                Ok(Some(packet)) => match self.store.submit_async(packet).await {
                    Ok(stored) => primary.push(stored),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(_) => rejected += 1,
                },
                Ok(None) => {}
                Err(e) => {
                    failures += 1;
                    let err = OceanError::AgentFailure {
                        agent_id: slot.id.clone(),
                        message: e.to_string(),
                    };
                    log::error!("{}", err);
                }
            }
        }

        {
            let mut stats = self.stats.lock();
            stats.events_processed += 1;
            stats.packets_generated += primary.len() as u64;
            stats.agent_failures += failures;
            stats.rejected_packets += rejected;
        }

        if primary.len() < self.config.batch_trigger {
            return Ok(primary);
        }

        let correlated = self.engine.wave(&primary, &self.store).await?;
        {
            let mut stats = self.stats.lock();
            stats.waves_created += 1;
            stats.correlation_packets += correlated.len() as u64;
        }
        let mut produced = primary;
        produced.extend(correlated);

        let touched: HashSet<String> = produced
            .iter()
            .filter_map(|p| self.store.field_of(&p.id))
            .collect();
        let emergent = self
            .detector
            .scan_fields(&self.store, &touched, self.reporter.as_ref());
        if !emergent.is_empty() {
            self.stats.lock().emergence_events += emergent.len() as u64;
        }

        Ok(produced)
    }

    fn stop_on_fatal<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                log::error!("Fatal store error, stopping: {}", e);
                self.stop();
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Periodic work
    // -----------------------------------------------------------------------

    /// Ask each agent to correlate over its own newest packets.
    ///
    /// An agent is skipped when it has fewer than three packets in the
    /// recent window, or when its evidence is unchanged since it was last
    /// asked.
    pub async fn correlation_cycle(&self) -> Result<Vec<Packet>> {
        let mut pending = Vec::new();
        for slot in &self.agents {
            let own: Vec<Packet> = self
                .store
                .recent(slot.domain, self.config.recent_window)
                .into_iter()
                .filter(|p| p.source_agent == slot.id)
                .collect();
            if own.len() < MIN_CORRELATION_EVIDENCE {
                continue;
            }
            let start = own.len().saturating_sub(self.config.correlate_limit);
            let evidence = own[start..].to_vec();
            let ids: Vec<PacketId> = evidence.iter().map(|p| p.id.clone()).collect();
            {
                let mut last = self.last_evidence.lock();
                if last.get(&slot.id) == Some(&ids) {
                    continue;
                }
                last.insert(slot.id.clone(), ids);
            }

            let agent = Arc::clone(&slot.agent);
            let handle = self
                .pool
                .spawn(async move { agent.lock().await.correlate(&evidence).await });
            pending.push((slot.id.clone(), handle));
        }

        let (ids, handles): (Vec<String>, Vec<JoinHandle<Option<Packet>>>) =
            pending.into_iter().unzip();
        let mut derived = Vec::new();
        for (agent_id, joined) in ids.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Some(packet)) => match self.store.submit_async(packet).await {
                    Ok(stored) => {
                        log::info!("{} derived {} packet {}", agent_id, stored.domain, stored.id);
                        derived.push(stored);
                    }
                    Err(e) if e.is_fatal() => return self.stop_on_fatal(Err(e)),
                    Err(_) => self.stats.lock().rejected_packets += 1,
                },
                Ok(None) => {}
                Err(e) => {
                    self.stats.lock().agent_failures += 1;
                    let err = OceanError::AgentFailure {
                        agent_id,
                        message: e.to_string(),
                    };
                    log::error!("{}", err);
                }
            }
        }
        self.stats.lock().diagnostic_packets += derived.len() as u64;
        Ok(derived)
    }

    /// Full emergence sweep over every field.
    pub fn emergence_sweep(&self) -> Vec<EmergenceEvent> {
        let events = self.detector.scan(&self.store, self.reporter.as_ref());
        if !events.is_empty() {
            self.stats.lock().emergence_events += events.len() as u64;
        }
        events
    }

    fn log_metrics(&self) {
        match serde_json::to_string(&self.metrics()) {
            Ok(json) => log::info!("Ocean metrics: {}", json),
            Err(e) => log::warn!("Could not serialize metrics: {}", e),
        }
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// Consume `source` until it ends, the orchestrator is stopped, or a
    /// fatal store error occurs. Periodic tasks run alongside intake and
    /// are joined before returning.
    pub async fn run<S: EventSource>(self: &Arc<Self>, mut source: S) -> Result<SessionStats> {
        if self.state.is_stopped() {
            return Err(OceanError::Stopped);
        }
        log::info!("Orchestrator running");

        let periodic = vec![
            self.spawn_periodic("correlation", self.config.correlation_cycle(), |this| async move {
                this.correlation_cycle().await.map(|_| ())
            }),
            self.spawn_periodic("metrics", self.config.metrics_interval(), |this| async move {
                this.log_metrics();
                Ok(())
            }),
            self.spawn_periodic("emergence", self.config.emergence_interval(), |this| async move {
                this.emergence_sweep();
                Ok(())
            }),
        ];

        let mut stopped = self.state.subscribe();
        let outcome = loop {
            if self.state.is_stopped() {
                break Ok(());
            }
            let item = tokio::select! {
                item = source.next_event() => item,
                _ = stopped.changed() => break Ok(()),
            };
            match item {
                SourceItem::Event(event) => match self.handle_event(event).await {
                    Ok(_) => {}
                    Err(OceanError::Stopped) => break Ok(()),
                    Err(e) if e.is_fatal() => break Err(e),
                    Err(e) => log::warn!("Event dropped: {}", e),
                },
                SourceItem::Idle => tokio::select! {
                    _ = tokio::time::sleep(self.config.idle_backoff()) => {}
                    _ = stopped.changed() => break Ok(()),
                },
                SourceItem::End => {
                    log::info!("Event source exhausted");
                    break Ok(());
                }
            }
        };

        self.stop();
        let mut outcome = outcome;
        for joined in join_all(periodic).await {
            match joined {
                Ok(Err(e)) if outcome.is_ok() => outcome = Err(e),
                Ok(_) => {}
                Err(e) => log::error!("Periodic task failed: {}", e),
            }
        }
        self.log_metrics();

        outcome.map(|()| self.stats())
    }

    fn spawn_periodic<F, Fut>(
        self: &Arc<Self>,
        name: &'static str,
        period: Duration,
        tick: F,
    ) -> JoinHandle<Result<()>>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let this = Arc::clone(self);
        let mut stopped = self.state.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                if this.state.is_stopped() {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = tick(Arc::clone(&this)).await {
                            log::error!("{} cycle failed: {}", name, e);
                            if e.is_fatal() {
                                this.stop();
                                return Err(e);
                            }
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            log::debug!("{} task finished", name);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::majority_evidence;
    use crate::emergence::CollectingReporter;
    use crate::event::{ChannelSource, VecSource};
    use crate::packet::payload;
    use async_trait::async_trait;
    use serde_json::json;

    /// Emits a tagged packet for every event that carries `key`.
    #[derive(Debug)]
    struct KeyedAgent {
        id: &'static str,
        domain: Domain,
        key: &'static str,
        confidence: f64,
    }

    impl KeyedAgent {
        fn boxed(
            id: &'static str,
            domain: Domain,
            key: &'static str,
            confidence: f64,
        ) -> Box<dyn AnalyzerAgent> {
            Box::new(Self {
                id,
                domain,
                key,
                confidence,
            })
        }
    }

    #[async_trait]
    impl AnalyzerAgent for KeyedAgent {
        fn id(&self) -> &str {
            self.id
        }

        fn domain(&self) -> Domain {
            self.domain
        }

        async fn process(&mut self, event: &Event) -> Option<Packet> {
            event.get(self.key)?;
            Some(Packet::new(self.id, self.domain, self.confidence, payload(json!({"tag": "seen"}))))
        }

        async fn correlate(&mut self, own_recent: &[Packet]) -> Option<Packet> {
            let evidence = majority_evidence(own_recent, "tag", "seen", 3)?;
            Some(Packet::derived(
                self.id,
                Domain::Diagnostic,
                0.9,
                payload(json!({"diagnosis": "repeated"})),
                evidence,
            ))
        }
    }

    #[derive(Debug)]
    struct PanickingAgent;

    #[async_trait]
    impl AnalyzerAgent for PanickingAgent {
        fn id(&self) -> &str {
            "panicking"
        }

        fn domain(&self) -> Domain {
            Domain::Anomaly
        }

        async fn process(&mut self, _event: &Event) -> Option<Packet> {
            panic!("analyzer bug")
        }
    }

    fn orchestrator(agents: Vec<Box<dyn AnalyzerAgent>>) -> Orchestrator {
        let reporter = Arc::new(CollectingReporter::new());
        Orchestrator::with_agents(OceanConfig::default(), agents, reporter).unwrap()
    }

    fn event(value: serde_json::Value) -> Event {
        Event::from(value)
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_counts_non_abstaining_agents() {
        let orch = orchestrator(vec![
            KeyedAgent::boxed("a", Domain::Hardware, "x", 0.5),
            KeyedAgent::boxed("b", Domain::Performance, "x", 0.5),
            KeyedAgent::boxed("c", Domain::Security, "y", 0.5),
            KeyedAgent::boxed("d", Domain::Behavior, "x", 0.5),
            KeyedAgent::boxed("e", Domain::Predictive, "z", 0.5),
        ]);
        let produced = orch.handle_event(event(json!({"timestamp": 1, "x": 1}))).await.unwrap();
        // three packets reach the batch trigger, but 0.5 * 0.5 never correlates
        assert_eq!(produced.len(), 3);
        assert_eq!(orch.store().len(), 3);

        let stats = orch.stats();
        assert_eq!(stats.events_processed, 1);
        assert_eq!(stats.packets_generated, 3);
        assert_eq!(stats.waves_created, 1);
        assert_eq!(stats.correlation_packets, 0);
    }

    #[tokio::test]
    async fn test_wave_runs_over_same_event_packets() {
        let orch = orchestrator(vec![
            KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9),
            KeyedAgent::boxed("b", Domain::Performance, "x", 0.9),
            KeyedAgent::boxed("c", Domain::Security, "x", 0.9),
        ]);
        let produced = orch.handle_event(event(json!({"timestamp": 1, "x": true}))).await.unwrap();
        let correlations: Vec<&Packet> = produced
            .iter()
            .filter(|p| p.domain == Domain::Correlation)
            .collect();
        assert_eq!(produced.len(), 6);
        assert_eq!(correlations.len(), 3);
        for packet in correlations {
            assert_eq!(packet.parent_ids.len(), 2);
            assert!((packet.confidence - 0.81).abs() < 1e-9);
        }
        assert_eq!(orch.store().metrics().graph_density, 12.0 / 36.0);
    }

    #[tokio::test]
    async fn test_small_batch_skips_wave() {
        let orch = orchestrator(vec![
            KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9),
            KeyedAgent::boxed("b", Domain::Performance, "x", 0.9),
        ]);
        let produced = orch.handle_event(event(json!({"timestamp": 1, "x": 1}))).await.unwrap();
        assert_eq!(produced.len(), 2);
        assert_eq!(orch.stats().waves_created, 0);
    }

    #[tokio::test]
    async fn test_panicking_agent_is_isolated() {
        let orch = orchestrator(vec![
            KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9),
            Box::new(PanickingAgent),
            KeyedAgent::boxed("b", Domain::Performance, "x", 0.9),
        ]);
        let produced = orch.handle_event(event(json!({"timestamp": 1, "x": 1}))).await.unwrap();
        assert_eq!(produced.len(), 2);
        assert_eq!(orch.stats().agent_failures, 1);

        // the poisoned agent keeps failing but never blocks the others
        orch.handle_event(event(json!({"timestamp": 1, "x": 2}))).await.unwrap();
        assert_eq!(orch.stats().agent_failures, 2);
        assert_eq!(orch.store().len(), 4);
        assert_eq!(orch.state(), OrchestratorState::Running);
    }

    #[tokio::test]
    async fn test_stopped_orchestrator_rejects_events() {
        let orch = orchestrator(vec![KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9)]);
        assert!(orch.stop());
        assert!(!orch.stop());
        let err = orch.handle_event(event(json!({"timestamp": 1, "x": 1}))).await.unwrap_err();
        assert!(matches!(err, OceanError::Stopped));
        assert!(orch.store().is_empty());
    }

    #[tokio::test]
    async fn test_correlation_cycle_derives_once_per_evidence_set() {
        let orch = orchestrator(vec![KeyedAgent::boxed("a", Domain::Hardware, "x", 0.6)]);
        for i in 0..2 {
            orch.handle_event(event(json!({"timestamp": 1, "x": i}))).await.unwrap();
        }
        assert!(orch.correlation_cycle().await.unwrap().is_empty());

        orch.handle_event(event(json!({"timestamp": 1, "x": 3}))).await.unwrap();
        let derived = orch.correlation_cycle().await.unwrap();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].domain, Domain::Diagnostic);
        assert_eq!(derived[0].parent_ids.len(), 3);
        for parent in &derived[0].parent_ids {
            assert!(orch.store().get(parent).unwrap().child_ids.contains(&derived[0].id));
        }

        assert!(orch.correlation_cycle().await.unwrap().is_empty());
        assert_eq!(orch.stats().diagnostic_packets, 1);
    }

    #[tokio::test]
    async fn test_correlation_cycle_hands_newest_packets() {
        let orch = orchestrator(vec![KeyedAgent::boxed("a", Domain::Hardware, "x", 0.6)]);
        for i in 0..8 {
            orch.handle_event(event(json!({"timestamp": 1, "x": i}))).await.unwrap();
        }
        let derived = orch.correlation_cycle().await.unwrap();
        let newest: HashSet<PacketId> = orch
            .store()
            .recent(Domain::Hardware, 5)
            .into_iter()
            .map(|p| p.id)
            .collect();
        let parents: HashSet<PacketId> = derived[0].parent_ids.iter().cloned().collect();
        assert_eq!(parents, newest);
    }

    #[tokio::test]
    async fn test_no_emergence_scan_without_wave() {
        let reporter = Arc::new(CollectingReporter::new());
        let orch = Orchestrator::with_agents(
            OceanConfig::default(),
            vec![KeyedAgent::boxed("a", Domain::Security, "x", 0.95)],
            reporter.clone(),
        )
        .unwrap();
        for i in 0..10 {
            orch.handle_event(event(json!({"timestamp": i, "x": i}))).await.unwrap();
        }
        assert_eq!(orch.stats().waves_created, 0);
        assert!(reporter.is_empty());
        assert_eq!(orch.stats().emergence_events, 0);

        // the periodic sweep still sees the emergent field
        let swept = orch.emergence_sweep();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].domain, Domain::Security);
        assert_eq!(orch.metrics().ocean.emergence_event_count, 1);
    }

    #[tokio::test]
    async fn test_emergence_scanned_after_each_wave() {
        let reporter = Arc::new(CollectingReporter::new());
        let orch = Orchestrator::with_agents(
            OceanConfig::default(),
            vec![
                KeyedAgent::boxed("a", Domain::Hardware, "x", 0.95),
                KeyedAgent::boxed("b", Domain::Performance, "x", 0.95),
                KeyedAgent::boxed("c", Domain::Security, "x", 0.95),
            ],
            reporter.clone(),
        )
        .unwrap();
        let primary = [Domain::Hardware, Domain::Performance, Domain::Security];

        for i in 0..5 {
            orch.handle_event(event(json!({"timestamp": i, "x": i}))).await.unwrap();
        }
        assert!(reporter.events().iter().all(|e| !primary.contains(&e.domain)));

        // the sixth member of each primary field arrives with a wave
        orch.handle_event(event(json!({"timestamp": 5, "x": 5}))).await.unwrap();
        let reported: HashSet<Domain> = reporter.events().iter().map(|e| e.domain).collect();
        for domain in primary {
            assert!(reported.contains(&domain), "{} not reported", domain);
        }

        let stats = orch.stats();
        assert_eq!(stats.waves_created, 6);
        assert_eq!(stats.emergence_events, reporter.len() as u64);
        assert_eq!(orch.metrics().ocean.emergence_event_count, reporter.len() as u64);
    }

    #[tokio::test]
    async fn test_events_without_timestamp_are_skipped() {
        let orch = orchestrator(vec![
            KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9),
            KeyedAgent::boxed("b", Domain::Performance, "x", 0.9),
            KeyedAgent::boxed("c", Domain::Security, "x", 0.9),
        ]);
        let produced = orch.handle_event(event(json!({"x": 1}))).await.unwrap();
        assert!(produced.is_empty());
        let produced = orch.handle_event(event(json!({"timestamp": "soon", "x": 1}))).await.unwrap();
        assert!(produced.is_empty());
        orch.handle_event(Event::from_line("kernel: x")).await.unwrap();

        assert!(orch.store().is_empty());
        let stats = orch.stats();
        assert_eq!(stats.malformed_events, 3);
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.waves_created, 0);
    }

    #[tokio::test]
    async fn test_default_roster_ignores_timestampless_readings() {
        let orch = Orchestrator::new(OceanConfig::default(), Arc::new(CollectingReporter::new())).unwrap();
        for temp in [30, 35, 40] {
            orch.handle_event(event(json!({"cpu_temp": temp}))).await.unwrap();
        }
        assert!(orch.store().is_empty());
        assert_eq!(orch.stats().malformed_events, 3);
    }

    #[tokio::test]
    async fn test_store_contention_stops_run() {
        let mut config = OceanConfig::default();
        config.store_lock_timeout_ms = 1;
        config.store_lock_retries = 2;
        let orch = Arc::new(
            Orchestrator::with_agents(
                config,
                vec![KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9)],
                Arc::new(CollectingReporter::new()),
            )
            .unwrap(),
        );

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let store = Arc::clone(orch.store());
        let holder = std::thread::spawn(move || {
            let _held = store.hold_write_lock();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let events = (0..3).map(|i| event(json!({"timestamp": i, "x": i})));
        let err = orch.run(VecSource::new(events)).await.unwrap_err();
        holder.join().unwrap();

        assert!(matches!(err, OceanError::StoreContention { attempts: 2 }));
        assert_eq!(orch.state(), OrchestratorState::Stopped);
        assert!(orch.store().is_empty());
        assert!(matches!(
            orch.handle_event(event(json!({"timestamp": 9, "x": 9}))).await,
            Err(OceanError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_stop_interrupts_idle_backoff() {
        let mut config = OceanConfig::default();
        config.idle_backoff_ms = 60_000;
        let orch = Arc::new(
            Orchestrator::with_agents(
                config,
                vec![KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9)],
                Arc::new(CollectingReporter::new()),
            )
            .unwrap(),
        );
        let (tx, source) = ChannelSource::channel(1);

        let handle = orch.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.stop();
        });
        let stats = tokio::time::timeout(Duration::from_secs(5), orch.run(source))
            .await
            .expect("run did not observe stop during idle backoff")
            .unwrap();
        assert_eq!(stats.events_processed, 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_drains_vec_source() {
        let orch = Arc::new(orchestrator(vec![KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9)]));
        let events = (0..10).map(|i| event(json!({"timestamp": i, "x": i})));
        let stats = orch.run(VecSource::new(events)).await.unwrap();
        assert_eq!(stats.events_processed, 10);
        assert_eq!(stats.packets_generated, 10);
        assert_eq!(orch.state(), OrchestratorState::Stopped);
        assert!(matches!(
            orch.run(VecSource::new(Vec::new())).await,
            Err(OceanError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_run_returns_on_stop_handle() {
        let orch = Arc::new(orchestrator(vec![KeyedAgent::boxed("a", Domain::Hardware, "x", 0.9)]));
        let (tx, source) = ChannelSource::channel(8);
        tx.send(event(json!({"timestamp": 1, "x": 1}))).await.unwrap();

        let handle = orch.stop_handle();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            handle.stop();
        });
        let stats = orch.run(source).await.unwrap();
        stopper.await.unwrap();
        assert_eq!(stats.events_processed, 1);
        drop(tx);
    }

    #[tokio::test]
    async fn test_default_roster_end_to_end() {
        let orch = Orchestrator::new(OceanConfig::default(), Arc::new(CollectingReporter::new())).unwrap();
        assert_eq!(orch.agent_ids().len(), 4);

        let mut temp = 30.0;
        for i in 0..15 {
            let value = match i % 3 {
                0 => {
                    let v = json!({"timestamp": i, "cpu_temp": temp});
                    temp += 5.0;
                    v
                }
                1 => json!({"timestamp": i, "response_time": 120 + i}),
                _ => json!({"timestamp": i, "user": "alice", "access_type": "read"}),
            };
            orch.handle_event(event(value)).await.unwrap();
        }

        let predictions = orch.store().recent(Domain::Predictive, 50);
        assert!(!predictions.is_empty());
        for packet in &predictions {
            assert_eq!(packet.payload_str("prediction"), Some("thermal_threshold_breach"));
            assert!(packet.payload["time_to_threshold"].as_f64().unwrap().is_finite());
        }
        assert_eq!(orch.stats().events_processed, 15);

        let derived = orch.correlation_cycle().await.unwrap();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].payload_str("meta_prediction"), Some("imminent_thermal_event"));
    }
}
