//! Analyzer agents.
//!
//! An agent maps one [`Event`] to at most one [`Packet`], using only its own
//! bounded history for baselines. It can also look back over its own recent
//! packets and, when a clear majority agree, derive a single higher-level
//! diagnostic packet whose parents are exactly that evidence.
//!
//! # Payload vocabulary
//!
//! | agent | key | values |
//! |---|---|---|
//! | `hardware_monitor` | `anomaly_type` | `high_cpu_temp`, `high_memory_usage` |
//! | `performance_analyzer` | `metric` | `response_time_spike` |
//! | `security_auditor` | `alert_type` | `unusual_access_pattern` |
//! | `predictive_model` | `prediction` | `thermal_threshold_breach` |
//! | any (correlate) | `diagnosis` / `meta_prediction` | see each agent |

use std::fmt;

use async_trait::async_trait;

use crate::config::OceanConfig;
use crate::errors::{OceanError, Result};
use crate::event::Event;
use crate::packet::{Domain, Packet, PacketId};

pub mod hardware;
pub mod history;
pub mod performance;
pub mod predictive;
pub mod security;

pub use hardware::HardwareMonitorAgent;
pub use history::RollingWindow;
pub use performance::PerformanceAnalysisAgent;
pub use predictive::PredictiveModelAgent;
pub use security::SecurityAuditAgent;

/// Ids of the agents [`build_roster`] knows how to construct.
pub const KNOWN_AGENTS: [&str; 4] = [
    HardwareMonitorAgent::ID,
    PerformanceAnalysisAgent::ID,
    SecurityAuditAgent::ID,
    PredictiveModelAgent::ID,
];

/// Share of an agent's recent packets that must agree before it derives a diagnosis.
pub const MAJORITY_RATIO: f64 = 0.7;

// ---------------------------------------------------------------------------
// AnalyzerAgent trait
// ---------------------------------------------------------------------------

/// A specialised analyzer producing intelligence packets from events.
#[async_trait]
pub trait AnalyzerAgent: Send + fmt::Debug {
    /// Stable agent id, also used as the packets' `source_agent`.
    fn id(&self) -> &str;

    /// Domain of the packets `process` emits.
    fn domain(&self) -> Domain;

    /// Inspect one event. Abstains (returns `None`) on anything it cannot read.
    async fn process(&mut self, event: &Event) -> Option<Packet>;

    /// Derive a higher-level packet from this agent's own recent packets.
    async fn correlate(&mut self, _own_recent: &[Packet]) -> Option<Packet> {
        None
    }
}

/// Construct the agents named in the configuration roster.
pub fn build_roster(config: &OceanConfig) -> Result<Vec<Box<dyn AnalyzerAgent>>> {
    config
        .agents
        .iter()
        .map(|id| -> Result<Box<dyn AnalyzerAgent>> {
            match id.as_str() {
                HardwareMonitorAgent::ID => Ok(Box::new(HardwareMonitorAgent::new())),
                PerformanceAnalysisAgent::ID => Ok(Box::new(PerformanceAnalysisAgent::new())),
                SecurityAuditAgent::ID => Ok(Box::new(SecurityAuditAgent::new())),
                PredictiveModelAgent::ID => Ok(Box::new(PredictiveModelAgent::new(
                    config.predictive_warmup,
                ))),
                other => Err(OceanError::Config(format!("unknown agent '{}'", other))),
            }
        })
        .collect()
}

/// Ids of `packets` when at least `min_len` are present and a
/// [`MAJORITY_RATIO`] share carry `key == value`.
pub fn majority_evidence(
    packets: &[Packet],
    key: &str,
    value: &str,
    min_len: usize,
) -> Option<Vec<PacketId>> {
    if packets.len() < min_len.max(1) {
        return None;
    }
    let matching = packets
        .iter()
        .filter(|p| p.payload_str(key) == Some(value))
        .count();
    if (matching as f64) < packets.len() as f64 * MAJORITY_RATIO {
        return None;
    }
    Some(packets.iter().map(|p| p.id.clone()).collect())
}
