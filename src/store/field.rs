//! Fields: time- and domain-bucketed packet collections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::packet::{Domain, Packet, PacketId};

/// Seconds over which the time term of coherence decays by half.
const COHERENCE_DECAY_SECS: f64 = 60.0;

/// Share of members a payload key must appear in to count as emergent.
const EMERGENCE_SHARE: f64 = 0.5;

/// Smallest field on which emergent patterns are computed.
const EMERGENCE_MIN_MEMBERS: usize = 3;

/// Field id for a domain and timestamp under the given bucket width.
pub fn field_key(domain: Domain, timestamp: f64, bucket_width: f64) -> String {
    format!("{}_{}", domain, (timestamp / bucket_width).floor() as i64)
}

/// Per-member data retained for coherence recomputation.
#[derive(Debug, Clone)]
struct Member {
    timestamp: f64,
    confidence: f64,
}

/// A field of related packets sharing a domain and a time bucket.
///
/// Members are kept in submission-completion order, not timestamp order.
#[derive(Debug, Clone)]
pub struct Field {
    pub id: String,
    pub domain: Domain,
    /// Timestamp of the packet that created the field.
    pub creation_time: f64,
    packet_ids: Vec<PacketId>,
    members: Vec<Member>,
    key_counts: BTreeMap<String, usize>,
    coherence: f64,
    emergent_patterns: BTreeMap<String, usize>,
}

impl Field {
    pub fn new(id: impl Into<String>, domain: Domain, creation_time: f64) -> Self {
        Self {
            id: id.into(),
            domain,
            creation_time,
            packet_ids: Vec::new(),
            members: Vec::new(),
            key_counts: BTreeMap::new(),
            coherence: 1.0,
            emergent_patterns: BTreeMap::new(),
        }
    }

    /// Append a packet, then recompute coherence and emergent patterns.
    pub fn add(&mut self, packet: &Packet) {
        self.packet_ids.push(packet.id.clone());
        self.members.push(Member {
            timestamp: packet.timestamp,
            confidence: packet.confidence,
        });
        for key in packet.payload.keys() {
            *self.key_counts.entry(key.clone()).or_insert(0) += 1;
        }
        self.recalculate_coherence();
        self.detect_emergence();
    }

    /// Mean of `time_term * confidence_term` over all unordered member pairs.
    fn recalculate_coherence(&mut self) {
        if self.members.len() < 2 {
            self.coherence = 1.0;
            return;
        }

        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, a) in self.members.iter().enumerate() {
            for b in &self.members[i + 1..] {
                let time_term = 1.0 / (1.0 + (a.timestamp - b.timestamp).abs() / COHERENCE_DECAY_SECS);
                let confidence_term = (a.confidence + b.confidence) / 2.0;
                total += time_term * confidence_term;
                pairs += 1;
            }
        }
        self.coherence = total / pairs as f64;
    }

    fn detect_emergence(&mut self) {
        if self.members.len() < EMERGENCE_MIN_MEMBERS {
            return;
        }
        let threshold = self.members.len() as f64 * EMERGENCE_SHARE;
        self.emergent_patterns = self
            .key_counts
            .iter()
            .filter(|(_, &count)| count as f64 >= threshold)
            .map(|(k, &count)| (k.clone(), count))
            .collect();
    }

    pub fn coherence(&self) -> f64 {
        self.coherence
    }

    pub fn packet_ids(&self) -> &[PacketId] {
        &self.packet_ids
    }

    pub fn len(&self) -> usize {
        self.packet_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packet_ids.is_empty()
    }

    /// Payload keys present in at least half of the members, with counts.
    pub fn emergent_patterns(&self) -> &BTreeMap<String, usize> {
        &self.emergent_patterns
    }

    pub fn summary(&self) -> FieldSummary {
        FieldSummary {
            id: self.id.clone(),
            domain: self.domain,
            creation_time: self.creation_time,
            packet_count: self.len(),
            coherence: self.coherence,
            emergent_patterns: self.emergent_patterns.clone(),
        }
    }
}

/// Read-only snapshot of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub id: String,
    pub domain: Domain,
    pub creation_time: f64,
    pub packet_count: usize,
    pub coherence: f64,
    pub emergent_patterns: BTreeMap<String, usize>,
}
