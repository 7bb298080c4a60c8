//! Metric snapshots exposed by the store and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate view of the store at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OceanMetrics {
    pub packet_count: usize,
    pub field_count: usize,
    /// Mean coherence over all fields.
    pub average_coherence: f64,
    /// Mean lineage degree over packets that have lineage edges.
    pub average_lineage_degree: f64,
    /// Lineage adjacency entries divided by `packet_count²`.
    pub graph_density: f64,
    pub emergence_event_count: u64,
}

/// Counters for one orchestrator session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub events_processed: u64,
    /// Events skipped at intake for lacking a numeric `timestamp`.
    pub malformed_events: u64,
    pub packets_generated: u64,
    pub waves_created: u64,
    pub correlation_packets: u64,
    pub diagnostic_packets: u64,
    pub emergence_events: u64,
    pub agent_failures: u64,
    pub correlation_failures: u64,
    pub rejected_packets: u64,
}

/// Periodic report combining session counters and store metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub session: SessionStats,
    pub ocean: OceanMetrics,
    pub timestamp: DateTime<Utc>,
}

impl MetricsReport {
    pub fn new(session: SessionStats, ocean: OceanMetrics) -> Self {
        Self {
            session,
            ocean,
            timestamp: Utc::now(),
        }
    }
}
