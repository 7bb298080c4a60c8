//! Performance analyzer: response-time spikes above the rolling p95.

use async_trait::async_trait;
use serde_json::json;

use super::history::RollingWindow;
use super::{majority_evidence, AnalyzerAgent};
use crate::event::Event;
use crate::packet::{payload, Domain, Packet};

const HISTORY: usize = 100;
const WARMUP: usize = 20;
const SPIKE_PERCENTILE: f64 = 95.0;

#[derive(Debug)]
pub struct PerformanceAnalysisAgent {
    response_times: RollingWindow,
}

impl Default for PerformanceAnalysisAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceAnalysisAgent {
    pub const ID: &'static str = "performance_analyzer";

    pub fn new() -> Self {
        Self {
            response_times: RollingWindow::new(HISTORY),
        }
    }
}

#[async_trait]
impl AnalyzerAgent for PerformanceAnalysisAgent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn domain(&self) -> Domain {
        Domain::Performance
    }

    async fn process(&mut self, event: &Event) -> Option<Packet> {
        let response_time = event.f64("response_time")?;
        self.response_times.push(response_time);
        if self.response_times.len() <= WARMUP {
            return None;
        }

        let average = self.response_times.mean()?;
        let p95 = self.response_times.percentile(SPIKE_PERCENTILE)?;
        if response_time <= p95 {
            return None;
        }

        Some(Packet::new(
            Self::ID,
            Domain::Performance,
            0.85,
            payload(json!({
                "metric": "response_time_spike",
                "current": response_time,
                "average": average,
                "p95": p95,
                "impact": "user_experience_degradation",
            })),
        ))
    }

    async fn correlate(&mut self, own_recent: &[Packet]) -> Option<Packet> {
        let evidence = majority_evidence(own_recent, "metric", "response_time_spike", 3)?;
        Some(Packet::derived(
            Self::ID,
            Domain::Diagnostic,
            0.9,
            payload(json!({
                "diagnosis": "sustained_latency_degradation",
                "recommendation": "profile_hot_paths",
                "evidence_packets": evidence,
                "urgency": "medium",
            })),
            evidence,
        ))
    }
}
