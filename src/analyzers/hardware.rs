//! Hardware monitor: CPU temperature and memory pressure anomalies.

use async_trait::async_trait;
use serde_json::json;

use super::history::RollingWindow;
use super::{majority_evidence, AnalyzerAgent};
use crate::event::Event;
use crate::packet::{payload, Domain, Packet};

const HISTORY: usize = 100;
/// Samples required before anomalies are reported.
const WARMUP: usize = 10;
const SIGMA: f64 = 2.0;
const CPU_SEVERE_TEMP: f64 = 85.0;
const MEMORY_SEVERE_PERCENT: f64 = 90.0;

/// Flags readings that leave the rolling mean ± 2σ band.
///
/// Reads `cpu_temp` and `memory.used_percent`.
#[derive(Debug)]
pub struct HardwareMonitorAgent {
    cpu: RollingWindow,
    memory: RollingWindow,
}

impl Default for HardwareMonitorAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareMonitorAgent {
    pub const ID: &'static str = "hardware_monitor";

    pub fn new() -> Self {
        Self {
            cpu: RollingWindow::new(HISTORY),
            memory: RollingWindow::new(HISTORY),
        }
    }

    /// `(mean, upper band)` once the window is warm.
    fn band(window: &RollingWindow) -> Option<(f64, f64)> {
        if window.len() <= WARMUP {
            return None;
        }
        let mean = window.mean()?;
        Some((mean, mean + SIGMA * window.std_dev()?))
    }

    fn cpu_anomaly(&self, temp: f64) -> Option<Packet> {
        let (mean, upper) = Self::band(&self.cpu)?;
        if temp <= upper {
            return None;
        }
        let severity = if temp > CPU_SEVERE_TEMP { "high" } else { "medium" };
        Some(Packet::new(
            Self::ID,
            Domain::Hardware,
            0.9,
            payload(json!({
                "anomaly_type": "high_cpu_temp",
                "current_temp": temp,
                "average_temp": mean,
                "deviation": temp - mean,
                "severity": severity,
            })),
        ))
    }

    fn memory_anomaly(&self, used: f64) -> Option<Packet> {
        let (mean, upper) = Self::band(&self.memory)?;
        if used <= upper {
            return None;
        }
        let severity = if used > MEMORY_SEVERE_PERCENT { "high" } else { "medium" };
        Some(Packet::new(
            Self::ID,
            Domain::Hardware,
            0.8,
            payload(json!({
                "anomaly_type": "high_memory_usage",
                "current_percent": used,
                "average_percent": mean,
                "deviation": used - mean,
                "severity": severity,
            })),
        ))
    }
}

#[async_trait]
impl AnalyzerAgent for HardwareMonitorAgent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn domain(&self) -> Domain {
        Domain::Hardware
    }

    async fn process(&mut self, event: &Event) -> Option<Packet> {
        let cpu = event.f64("cpu_temp");
        let memory = event.f64_at(&["memory", "used_percent"]);
        if let Some(temp) = cpu {
            self.cpu.push(temp);
        }
        if let Some(used) = memory {
            self.memory.push(used);
        }

        cpu.and_then(|t| self.cpu_anomaly(t))
            .or_else(|| memory.and_then(|m| self.memory_anomaly(m)))
    }

    async fn correlate(&mut self, own_recent: &[Packet]) -> Option<Packet> {
        let evidence = majority_evidence(own_recent, "anomaly_type", "high_cpu_temp", 3)?;
        Some(Packet::derived(
            Self::ID,
            Domain::Diagnostic,
            0.95,
            payload(json!({
                "diagnosis": "sustained_thermal_pressure",
                "recommendation": "check_cooling_system",
                "evidence_packets": evidence,
                "urgency": "high",
            })),
            evidence,
        ))
    }
}
