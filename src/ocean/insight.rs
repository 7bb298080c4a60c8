//! Fixed insight text per unordered domain pair.

use crate::packet::Domain;

pub const DEFAULT_INSIGHT: &str = "Cross-domain correlation detected";

/// Human-readable insight for a correlation between `a` and `b`.
///
/// The table is symmetric: `insight(a, b) == insight(b, a)`.
pub fn insight(a: Domain, b: Domain) -> &'static str {
    use Domain::*;
    match (a, b) {
        (Hardware, Performance) | (Performance, Hardware) => {
            "Hardware conditions affecting performance"
        }
        (Performance, Security) | (Security, Performance) => {
            "Performance anomalies indicating security issues"
        }
        (Hardware, Predictive) | (Predictive, Hardware) => "Hardware trends predicting future states",
        (Security, Behavior) | (Behavior, Security) => {
            "Security events correlating with user behavior"
        }
        (Diagnostic, Optimization) | (Optimization, Diagnostic) => {
            "Diagnostic findings suggesting optimizations"
        }
        _ => DEFAULT_INSIGHT,
    }
}

/// `"{a}_to_{b}"`, in the order given.
pub fn correlation_type(a: Domain, b: Domain) -> String {
    format!("{}_to_{}", a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_symmetric() {
        for a in Domain::ALL {
            for b in Domain::ALL {
                assert_eq!(insight(a, b), insight(b, a));
            }
        }
    }

    #[test]
    fn test_known_and_fallback_pairs() {
        assert_eq!(
            insight(Domain::Predictive, Domain::Hardware),
            "Hardware trends predicting future states"
        );
        assert_eq!(insight(Domain::Anomaly, Domain::Hardware), DEFAULT_INSIGHT);
        assert_eq!(correlation_type(Domain::Security, Domain::Behavior), "security_to_behavior");
    }
}
