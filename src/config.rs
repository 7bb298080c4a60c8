//! Ocean configuration.
//!
//! Every option has a serde default so partial YAML/JSON files are valid.
//! Cycle periods can additionally be overridden from the environment
//! (`OCEAN_CORRELATION_CYCLE_SECS`, `OCEAN_METRICS_INTERVAL_SECS`,
//! `OCEAN_EMERGENCE_INTERVAL_SECS`, `OCEAN_MAX_WORKERS`).

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analyzers::KNOWN_AGENTS;
use crate::errors::{OceanError, Result};

/// Configuration for the ocean and its orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OceanConfig {
    /// Active agent roster, by agent id.
    #[serde(default = "default_agents")]
    pub agents: Vec<String>,
    /// Width of a field's time bucket in seconds.
    #[serde(default = "default_bucket_width")]
    pub bucket_width_secs: f64,
    /// Minimum same-event batch size that triggers a correlation wave.
    #[serde(default = "default_batch_trigger")]
    pub batch_trigger: usize,
    /// Confidence product a cross-domain pair must exceed.
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,
    /// Coherence a field must exceed to be considered emergent.
    #[serde(default = "default_emergence_coherence")]
    pub emergence_coherence: f64,
    /// Packet count a field must exceed to be considered emergent.
    #[serde(default = "default_emergence_min_packets")]
    pub emergence_min_packets: usize,
    /// Size of the bounded worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_correlation_cycle")]
    pub correlation_cycle_secs: u64,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
    #[serde(default = "default_emergence_interval")]
    pub emergence_interval_secs: u64,
    /// Sleep between polls of an idle source.
    #[serde(default = "default_idle_backoff")]
    pub idle_backoff_ms: u64,
    /// How many recent packets per domain the correlation cycle looks at.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    /// How many of an agent's newest packets are handed to `correlate`.
    #[serde(default = "default_correlate_limit")]
    pub correlate_limit: usize,
    /// Per-attempt timeout when acquiring the store lock.
    #[serde(default = "default_lock_timeout")]
    pub store_lock_timeout_ms: u64,
    /// Attempts before store contention becomes fatal.
    #[serde(default = "default_lock_retries")]
    pub store_lock_retries: u32,
    /// Readings the predictive agent needs before fitting a trend.
    #[serde(default = "default_predictive_warmup")]
    pub predictive_warmup: usize,
}

fn default_agents() -> Vec<String> {
    KNOWN_AGENTS.iter().map(|s| s.to_string()).collect()
}
fn default_bucket_width() -> f64 { 300.0 }
fn default_batch_trigger() -> usize { 3 }
fn default_correlation_threshold() -> f64 { 0.7 }
fn default_emergence_coherence() -> f64 { 0.8 }
fn default_emergence_min_packets() -> usize { 5 }
fn default_max_workers() -> usize { 10 }
fn default_correlation_cycle() -> u64 { 5 }
fn default_metrics_interval() -> u64 { 10 }
fn default_emergence_interval() -> u64 { 15 }
fn default_idle_backoff() -> u64 { 100 }
fn default_recent_window() -> usize { 50 }
fn default_correlate_limit() -> usize { 5 }
fn default_lock_timeout() -> u64 { 50 }
fn default_lock_retries() -> u32 { 5 }
fn default_predictive_warmup() -> usize { 3 }

impl Default for OceanConfig {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            bucket_width_secs: default_bucket_width(),
            batch_trigger: default_batch_trigger(),
            correlation_threshold: default_correlation_threshold(),
            emergence_coherence: default_emergence_coherence(),
            emergence_min_packets: default_emergence_min_packets(),
            max_workers: default_max_workers(),
            correlation_cycle_secs: default_correlation_cycle(),
            metrics_interval_secs: default_metrics_interval(),
            emergence_interval_secs: default_emergence_interval(),
            idle_backoff_ms: default_idle_backoff(),
            recent_window: default_recent_window(),
            correlate_limit: default_correlate_limit(),
            store_lock_timeout_ms: default_lock_timeout(),
            store_lock_retries: default_lock_retries(),
            predictive_warmup: default_predictive_warmup(),
        }
    }
}

impl OceanConfig {
    /// Parse a YAML document (JSON is valid YAML and parses too).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: OceanConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`, `.yml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OceanConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        config.validate()?;
        log::info!("Loaded ocean config from {}", path.display());
        Ok(config)
    }

    /// Apply `OCEAN_*` environment overrides. Unparseable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        override_from_env("OCEAN_CORRELATION_CYCLE_SECS", &mut self.correlation_cycle_secs);
        override_from_env("OCEAN_METRICS_INTERVAL_SECS", &mut self.metrics_interval_secs);
        override_from_env("OCEAN_EMERGENCE_INTERVAL_SECS", &mut self.emergence_interval_secs);
        override_from_env("OCEAN_MAX_WORKERS", &mut self.max_workers);
        self
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.bucket_width_secs.is_finite() && self.bucket_width_secs > 0.0) {
            return Err(OceanError::Config("bucket_width_secs must be positive".into()));
        }
        if self.batch_trigger < 2 {
            return Err(OceanError::Config("batch_trigger must be at least 2".into()));
        }
        for (name, value) in [
            ("correlation_threshold", self.correlation_threshold),
            ("emergence_coherence", self.emergence_coherence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OceanError::Config(format!("{} must be within [0, 1]", name)));
            }
        }
        if self.max_workers == 0 {
            return Err(OceanError::Config("max_workers must be positive".into()));
        }
        if self.correlation_cycle_secs == 0
            || self.metrics_interval_secs == 0
            || self.emergence_interval_secs == 0
        {
            return Err(OceanError::Config("cycle periods must be positive".into()));
        }
        if self.store_lock_retries == 0 {
            return Err(OceanError::Config("store_lock_retries must be positive".into()));
        }
        if let Some(unknown) = self
            .agents
            .iter()
            .find(|id| !KNOWN_AGENTS.contains(&id.as_str()))
        {
            return Err(OceanError::Config(format!("unknown agent '{}'", unknown)));
        }
        Ok(())
    }

    pub fn correlation_cycle(&self) -> Duration {
        Duration::from_secs(self.correlation_cycle_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    pub fn emergence_interval(&self) -> Duration {
        Duration::from_secs(self.emergence_interval_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn store_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.store_lock_timeout_ms)
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = env::var(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = OceanConfig::default();
        assert_eq!(config.bucket_width_secs, 300.0);
        assert_eq!(config.batch_trigger, 3);
        assert_eq!(config.correlation_threshold, 0.7);
        assert_eq!(config.emergence_coherence, 0.8);
        assert_eq!(config.emergence_min_packets, 5);
        assert_eq!(config.agents.len(), KNOWN_AGENTS.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = OceanConfig::from_yaml("batch_trigger: 4\nagents: [hardware_monitor]\n").unwrap();
        assert_eq!(config.batch_trigger, 4);
        assert_eq!(config.agents, vec!["hardware_monitor".to_string()]);
        assert_eq!(config.max_workers, 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(OceanConfig::from_yaml("correlation_threshold: 1.2").is_err());
        assert!(OceanConfig::from_yaml("batch_trigger: 1").is_err());
        assert!(OceanConfig::from_yaml("metrics_interval_secs: 0").is_err());
        match OceanConfig::from_yaml("agents: [oracle]") {
            Err(OceanError::Config(msg)) => assert!(msg.contains("oracle")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"bucket_width_secs": 60, "max_workers": 2}}"#).unwrap();
        let config = OceanConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bucket_width_secs, 60.0);
        assert_eq!(config.max_workers, 2);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "emergence_min_packets: 8").unwrap();
        let config = OceanConfig::from_file(file.path()).unwrap();
        assert_eq!(config.emergence_min_packets, 8);
    }
}
