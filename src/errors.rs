//! Error types for the intelligence ocean.
//!
//! Failures local to one agent or one pairwise correlation unit are
//! contained by the orchestrator and only logged. Store contention and
//! setup errors are the only kinds that stop a run.

use thiserror::Error;

/// Errors produced by the store, the correlation engine and the orchestrator.
#[derive(Debug, Error)]
pub enum OceanError {
    /// Packet failed boundary validation (confidence outside `[0, 1]`,
    /// unknown domain name, malformed JSON shape).
    #[error("Invalid packet {packet_id}: {reason}")]
    InvalidPacket { packet_id: String, reason: String },

    /// Packet references a parent that is not in the store.
    #[error("Packet {packet_id} references unknown parent {parent_id}")]
    UnknownParent { packet_id: String, parent_id: String },

    /// An analyzer agent panicked or was cancelled mid-dispatch.
    #[error("Agent {agent_id} failed: {message}")]
    AgentFailure { agent_id: String, message: String },

    /// A single pairwise correlation unit failed.
    #[error("Correlation unit {left} x {right} failed: {message}")]
    CorrelationUnitFailure {
        left: String,
        right: String,
        message: String,
    },

    /// The store lock could not be acquired within the retry budget.
    #[error("Packet store contention: lock not acquired after {attempts} attempts")]
    StoreContention { attempts: u32 },

    /// Operation attempted on a stopped orchestrator.
    #[error("Orchestrator is stopped")]
    Stopped,

    /// Configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OceanError {
    /// Shorthand for an [`OceanError::InvalidPacket`].
    pub fn invalid_packet(packet_id: impl Into<String>, reason: impl Into<String>) -> Self {
        OceanError::InvalidPacket {
            packet_id: packet_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must stop the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OceanError::StoreContention { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OceanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_contention_is_fatal() {
        assert!(OceanError::StoreContention { attempts: 5 }.is_fatal());
        assert!(!OceanError::invalid_packet("p1", "confidence 1.5").is_fatal());
        assert!(!OceanError::Stopped.is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = OceanError::UnknownParent {
            packet_id: "child".into(),
            parent_id: "ghost".into(),
        };
        assert_eq!(err.to_string(), "Packet child references unknown parent ghost");
    }
}
