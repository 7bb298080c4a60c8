//! Emergence detection over the field index.
//!
//! A field is emergent when it is both coherent and populous and its members
//! share payload keys. Detected events go to an [`EmergenceReporter`].

use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::OceanConfig;
use crate::packet::Domain;
use crate::store::PacketStore;

/// One emergent field, as observed during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergenceEvent {
    pub field_id: String,
    pub domain: Domain,
    pub coherence: f64,
    /// Shared payload key -> number of members carrying it.
    pub patterns: BTreeMap<String, usize>,
    pub packet_count: usize,
}

// ---------------------------------------------------------------------------
// Reporters
// ---------------------------------------------------------------------------

/// Sink for emergence events.
pub trait EmergenceReporter: Send + Sync {
    fn report(&self, event: &EmergenceEvent);
}

/// Logs each event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl EmergenceReporter for LogReporter {
    fn report(&self, event: &EmergenceEvent) {
        let keys: Vec<&str> = event.patterns.keys().map(String::as_str).collect();
        log::info!(
            "Emergence in field {} (coherence {:.3}, {} packets): {}",
            event.field_id,
            event.coherence,
            event.packet_count,
            keys.join(", ")
        );
    }
}

/// Forwards events over a tokio channel. Full or closed channels drop the event.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<EmergenceEvent>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<EmergenceEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EmergenceEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl EmergenceReporter for ChannelReporter {
    fn report(&self, event: &EmergenceEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            log::warn!("Emergence event for {} not delivered: {}", event.field_id, e);
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<EmergenceEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EmergenceEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EmergenceReporter for CollectingReporter {
    fn report(&self, event: &EmergenceEvent) {
        self.events.lock().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct EmergenceDetector {
    coherence_threshold: f64,
    min_packets: usize,
}

impl Default for EmergenceDetector {
    fn default() -> Self {
        Self::new(0.8, 5)
    }
}

impl EmergenceDetector {
    pub fn new(coherence_threshold: f64, min_packets: usize) -> Self {
        Self {
            coherence_threshold,
            min_packets,
        }
    }

    pub fn from_config(config: &OceanConfig) -> Self {
        Self::new(config.emergence_coherence, config.emergence_min_packets)
    }

    /// Fields with coherence above the threshold, more than `min_packets`
    /// members and at least one shared pattern, in field creation order.
    pub fn detect(&self, store: &PacketStore) -> Vec<EmergenceEvent> {
        store
            .fields()
            .into_iter()
            .filter(|f| {
                f.coherence > self.coherence_threshold
                    && f.packet_count > self.min_packets
                    && !f.emergent_patterns.is_empty()
            })
            .map(|f| EmergenceEvent {
                field_id: f.id,
                domain: f.domain,
                coherence: f.coherence,
                patterns: f.emergent_patterns,
                packet_count: f.packet_count,
            })
            .collect()
    }

    /// Detect, report each event and bump the store's emergence counter.
    pub fn scan(&self, store: &PacketStore, reporter: &dyn EmergenceReporter) -> Vec<EmergenceEvent> {
        let events = self.detect(store);
        Self::publish(store, reporter, events)
    }

    /// [`scan`](Self::scan) restricted to the given field ids.
    pub fn scan_fields(
        &self,
        store: &PacketStore,
        field_ids: &HashSet<String>,
        reporter: &dyn EmergenceReporter,
    ) -> Vec<EmergenceEvent> {
        if field_ids.is_empty() {
            return Vec::new();
        }
        let events = self
            .detect(store)
            .into_iter()
            .filter(|e| field_ids.contains(&e.field_id))
            .collect();
        Self::publish(store, reporter, events)
    }

    fn publish(
        store: &PacketStore,
        reporter: &dyn EmergenceReporter,
        events: Vec<EmergenceEvent>,
    ) -> Vec<EmergenceEvent> {
        for event in &events {
            reporter.report(event);
        }
        if !events.is_empty() {
            store.record_emergence(events.len() as u64);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{payload, Packet};
    use serde_json::json;

    fn fill(store: &PacketStore, domain: Domain, n: usize, confidence: f64) {
        for _ in 0..n {
            store
                .submit(
                    Packet::new("t", domain, confidence, payload(json!({"anomaly_type": "x"})))
                        .with_timestamp(1_000.0),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_coherent_populous_field_is_emergent() {
        let store = PacketStore::default();
        fill(&store, Domain::Hardware, 6, 0.9);
        let reporter = CollectingReporter::new();
        let events = EmergenceDetector::default().scan(&store, &reporter);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field_id, "hardware_3");
        assert_eq!(events[0].patterns.get("anomaly_type"), Some(&6));
        assert_eq!(reporter.len(), 1);
        assert_eq!(store.metrics().emergence_event_count, 1);
    }

    #[test]
    fn test_small_or_incoherent_fields_are_ignored() {
        let store = PacketStore::default();
        fill(&store, Domain::Hardware, 5, 0.9);
        fill(&store, Domain::Security, 8, 0.5);
        let reporter = CollectingReporter::new();
        assert!(EmergenceDetector::default().scan(&store, &reporter).is_empty());
        assert!(reporter.is_empty());
        assert_eq!(store.metrics().emergence_event_count, 0);
    }

    #[test]
    fn test_every_scan_reports_again() {
        let store = PacketStore::default();
        fill(&store, Domain::Hardware, 6, 0.95);
        let detector = EmergenceDetector::default();
        detector.scan(&store, &LogReporter);
        detector.scan(&store, &LogReporter);
        assert_eq!(store.metrics().emergence_event_count, 2);
    }

    #[test]
    fn test_scan_fields_only_reports_touched_fields() {
        let store = PacketStore::default();
        fill(&store, Domain::Hardware, 6, 0.9);
        fill(&store, Domain::Security, 6, 0.9);
        let reporter = CollectingReporter::new();
        let touched: HashSet<String> = ["security_3".to_string()].into_iter().collect();
        let events = EmergenceDetector::default().scan_fields(&store, &touched, &reporter);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].domain, Domain::Security);
        assert_eq!(store.metrics().emergence_event_count, 1);
    }

    #[tokio::test]
    async fn test_channel_reporter_delivers() {
        let store = PacketStore::default();
        fill(&store, Domain::Performance, 7, 0.9);
        let (reporter, mut rx) = ChannelReporter::channel(4);
        EmergenceDetector::default().scan(&store, &reporter);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.domain, Domain::Performance);
        assert_eq!(event.packet_count, 7);
    }
}
