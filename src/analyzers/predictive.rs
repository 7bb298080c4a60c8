//! Predictive model: linear CPU temperature trends.
//!
//! Fits a least-squares line over the newest readings and, when the slope is
//! steep enough, extrapolates how long until the thermal threshold is hit.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::history::RollingWindow;
use super::{majority_evidence, AnalyzerAgent};
use crate::event::Event;
use crate::packet::{payload, Domain, Packet};

const HISTORY: usize = 1_000;
const TREND_WINDOW: usize = 20;
/// Degrees per reading above which a rising trend is reported.
const SLOPE_THRESHOLD: f64 = 0.5;
const THERMAL_THRESHOLD: f64 = 85.0;
/// Readings ahead used for `predicted_temp`.
const HORIZON: f64 = 10.0;
const CONFIDENCE: f64 = 0.7;

/// Readings until `threshold` is reached at `slope` per reading.
///
/// Infinite for flat or falling trends, zero once already past.
pub fn time_to_threshold(current: f64, slope: f64, threshold: f64) -> f64 {
    if slope <= 0.0 {
        return f64::INFINITY;
    }
    ((threshold - current) / slope).max(0.0)
}

/// JSON has no infinity; encode it as the string `"inf"`.
fn finite_or_inf(value: f64) -> Value {
    if value.is_finite() {
        json!(value)
    } else {
        json!("inf")
    }
}

#[derive(Debug)]
pub struct PredictiveModelAgent {
    temps: RollingWindow,
    warmup: usize,
}

impl Default for PredictiveModelAgent {
    fn default() -> Self {
        Self::new(3)
    }
}

impl PredictiveModelAgent {
    pub const ID: &'static str = "predictive_model";

    /// `warmup` is the number of readings needed before a trend is fitted (min 2).
    pub fn new(warmup: usize) -> Self {
        Self {
            temps: RollingWindow::new(HISTORY),
            warmup: warmup.max(2),
        }
    }
}

#[async_trait]
impl AnalyzerAgent for PredictiveModelAgent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn domain(&self) -> Domain {
        Domain::Predictive
    }

    async fn process(&mut self, event: &Event) -> Option<Packet> {
        let temp = event.f64("cpu_temp")?;
        self.temps.push(temp);
        if self.temps.len() < self.warmup {
            return None;
        }

        let trend = self.temps.slope(TREND_WINDOW)?;
        if trend <= SLOPE_THRESHOLD {
            return None;
        }

        Some(Packet::new(
            Self::ID,
            Domain::Predictive,
            CONFIDENCE,
            payload(json!({
                "prediction": "thermal_threshold_breach",
                "current_temp": temp,
                "predicted_temp": temp + trend * HORIZON,
                "time_to_threshold": finite_or_inf(time_to_threshold(temp, trend, THERMAL_THRESHOLD)),
                "trend_rate": trend,
            })),
        ))
    }

    async fn correlate(&mut self, own_recent: &[Packet]) -> Option<Packet> {
        let evidence = majority_evidence(own_recent, "prediction", "thermal_threshold_breach", 2)?;
        Some(Packet::derived(
            Self::ID,
            Domain::Diagnostic,
            0.9,
            payload(json!({
                "meta_prediction": "imminent_thermal_event",
                "supporting_predictions": evidence.len(),
                "recommended_action": "immediate_cooling_intervention",
                "evidence": evidence,
            })),
            evidence,
        ))
    }
}
