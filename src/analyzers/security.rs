//! Security auditor: repeated `user:access_type` combinations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{majority_evidence, AnalyzerAgent};
use crate::event::Event;
use crate::packet::{payload, Domain, Packet};

/// Occurrences of one combination above which every further one is flagged.
const ACCESS_ALERT_COUNT: u64 = 100;
/// Bound on distinct combinations tracked; new ones past this are ignored.
const MAX_TRACKED_PATTERNS: usize = 10_000;

#[derive(Debug, Default)]
pub struct SecurityAuditAgent {
    access_patterns: HashMap<String, u64>,
}

impl SecurityAuditAgent {
    pub const ID: &'static str = "security_auditor";

    pub fn new() -> Self {
        Self::default()
    }

    /// Occurrences seen so far for `user:access_type`.
    pub fn count(&self, user: &str, access_type: &str) -> u64 {
        self.access_patterns
            .get(&format!("{}:{}", user, access_type))
            .copied()
            .unwrap_or(0)
    }
}

fn as_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl AnalyzerAgent for SecurityAuditAgent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn domain(&self) -> Domain {
        Domain::Security
    }

    async fn process(&mut self, event: &Event) -> Option<Packet> {
        let access_type = as_label(event.get("access_type")?);
        let user = event.get("user").map(as_label).unwrap_or_else(|| "unknown".to_string());
        let key = format!("{}:{}", user, access_type);

        if !self.access_patterns.contains_key(&key)
            && self.access_patterns.len() >= MAX_TRACKED_PATTERNS
        {
            log::debug!("Security auditor pattern table full, not tracking {}", key);
            return None;
        }
        let count = self.access_patterns.entry(key).or_insert(0);
        *count += 1;
        if *count <= ACCESS_ALERT_COUNT {
            return None;
        }

        Some(Packet::new(
            Self::ID,
            Domain::Security,
            0.75,
            payload(json!({
                "alert_type": "unusual_access_pattern",
                "user": user,
                "access_type": access_type,
                "count": *count,
                "risk_level": "medium",
            })),
        ))
    }

    async fn correlate(&mut self, own_recent: &[Packet]) -> Option<Packet> {
        let evidence = majority_evidence(own_recent, "alert_type", "unusual_access_pattern", 3)?;
        Some(Packet::derived(
            Self::ID,
            Domain::Diagnostic,
            0.85,
            payload(json!({
                "diagnosis": "access_pattern_abuse",
                "recommendation": "review_account_permissions",
                "evidence_packets": evidence,
                "urgency": "high",
            })),
            evidence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alert_on_101st_matching_event() {
        let mut agent = SecurityAuditAgent::new();
        // reads land on even indices; the 101st read is event 200
        for i in 0..201 {
            let access = if i % 2 == 0 { "read" } else { "write" };
            let event = Event::from(json!({"timestamp": i, "user": "alice", "access_type": access}));
            let result = agent.process(&event).await;
            if i < 200 {
                assert!(result.is_none(), "unexpected alert at event {}", i);
            } else {
                let packet = result.expect("alert on the 101st read");
                assert_eq!(packet.domain, Domain::Security);
                assert_eq!(packet.payload_str("alert_type"), Some("unusual_access_pattern"));
                assert_eq!(packet.payload_str("access_type"), Some("read"));
                assert_eq!(packet.payload["count"], 101);
            }
        }
        assert_eq!(agent.count("alice", "write"), 100);
    }

    #[tokio::test]
    async fn test_missing_user_is_unknown() {
        let mut agent = SecurityAuditAgent::new();
        agent.process(&Event::from(json!({"timestamp": 0, "access_type": "execute"}))).await;
        assert_eq!(agent.count("unknown", "execute"), 1);
    }

    #[tokio::test]
    async fn test_abstains_without_access_type() {
        let mut agent = SecurityAuditAgent::new();
        assert!(agent.process(&Event::from(json!({"timestamp": 0, "user": "bob"}))).await.is_none());
        assert!(agent.access_patterns.is_empty());
    }
}
