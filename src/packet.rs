//! Intelligence packets and their domain enumeration.
//!
//! A [`Packet`] is the unit of derived intelligence. It is immutable once
//! created except for `child_ids`, which the store backfills as derived
//! packets arrive. Payloads are open JSON maps; the per-agent key
//! vocabulary is documented on each analyzer.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::{OceanError, Result};

/// Open key/value payload carried by a packet.
pub type Payload = Map<String, Value>;

/// Current wall-clock time as fractional Unix seconds.
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// Closed set of intelligence domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Hardware,
    Performance,
    Security,
    Behavior,
    Predictive,
    Diagnostic,
    Optimization,
    Anomaly,
    Correlation,
}

impl Domain {
    /// All domains in declaration order.
    pub const ALL: [Domain; 9] = [
        Domain::Hardware,
        Domain::Performance,
        Domain::Security,
        Domain::Behavior,
        Domain::Predictive,
        Domain::Diagnostic,
        Domain::Optimization,
        Domain::Anomaly,
        Domain::Correlation,
    ];

    /// Wire name of the domain.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Hardware => "hardware",
            Domain::Performance => "performance",
            Domain::Security => "security",
            Domain::Behavior => "behavior",
            Domain::Predictive => "predictive",
            Domain::Diagnostic => "diagnostic",
            Domain::Optimization => "optimization",
            Domain::Anomaly => "anomaly",
            Domain::Correlation => "correlation",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = OceanError;

    fn from_str(s: &str) -> Result<Self> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| OceanError::invalid_packet("-", format!("unknown domain '{}'", s)))
    }
}

// ---------------------------------------------------------------------------
// PacketId
// ---------------------------------------------------------------------------

/// Globally unique packet identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(String);

impl PacketId {
    /// Fresh random identifier for a primary packet.
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Deterministic identifier for the correlation of two packets.
    ///
    /// The same ordered pair always maps to the same id, which makes a
    /// repeated wave over the same pair idempotent at the store.
    pub fn for_pair(left: &PacketId, right: &PacketId) -> Self {
        let mut hasher = Md5::new();
        hasher.update(format!("{}_{}", left, right).as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..12].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PacketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PacketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A single unit of intelligence emitted by an agent or the correlator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Unique id.
    pub id: PacketId,
    /// Creation time (fractional Unix seconds). Drives field bucketing.
    pub timestamp: f64,
    /// Id of the agent (or `ocean_correlator`) that produced the packet.
    pub source_agent: String,
    pub domain: Domain,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub payload: Payload,
    /// Packets this one was derived from. Empty for primary packets.
    #[serde(default)]
    pub parent_ids: BTreeSet<PacketId>,
    /// Packets derived from this one, backfilled by the store.
    #[serde(default)]
    pub child_ids: BTreeSet<PacketId>,
}

impl Packet {
    /// Create a primary packet stamped with the current time.
    pub fn new(
        source_agent: impl Into<String>,
        domain: Domain,
        confidence: f64,
        payload: Payload,
    ) -> Self {
        Self {
            id: PacketId::random(),
            timestamp: now_secs(),
            source_agent: source_agent.into(),
            domain,
            confidence,
            payload,
            parent_ids: BTreeSet::new(),
            child_ids: BTreeSet::new(),
        }
    }

    /// Create a packet derived from existing packets.
    pub fn derived(
        source_agent: impl Into<String>,
        domain: Domain,
        confidence: f64,
        payload: Payload,
        parents: impl IntoIterator<Item = PacketId>,
    ) -> Self {
        let mut packet = Self::new(source_agent, domain, confidence, payload);
        packet.parent_ids = parents.into_iter().collect();
        packet
    }

    /// Replace the id.
    pub fn with_id(mut self, id: impl Into<PacketId>) -> Self {
        self.id = id.into();
        self
    }

    /// Replace the timestamp.
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this packet was derived from others.
    pub fn is_derived(&self) -> bool {
        !self.parent_ids.is_empty()
    }

    /// Look up a string payload value.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Check the boundary invariants that do not need store context.
    pub fn validate(&self) -> Result<()> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(OceanError::invalid_packet(
                self.id.as_str(),
                format!("confidence {} outside [0, 1]", self.confidence),
            ));
        }
        if !self.timestamp.is_finite() {
            return Err(OceanError::invalid_packet(self.id.as_str(), "non-finite timestamp"));
        }
        if self.parent_ids.contains(&self.id) {
            return Err(OceanError::invalid_packet(self.id.as_str(), "packet lists itself as parent"));
        }
        Ok(())
    }

    /// Parse a packet from untrusted JSON, validating domain and confidence.
    pub fn from_json(value: Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string();
        let packet: Packet = serde_json::from_value(value)
            .map_err(|e| OceanError::invalid_packet(id, e.to_string()))?;
        packet.validate()?;
        Ok(packet)
    }
}

/// Build a [`Payload`] from a `serde_json::json!` object literal.
///
/// Non-object values produce an empty payload.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}
