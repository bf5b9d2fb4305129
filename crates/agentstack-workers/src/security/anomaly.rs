//! Anomaly detection: duration and token-usage thresholds.
//!
//! Grounded on `original_source/.../workers/rules/anomaly.py`: two
//! independent checks, both LOW severity, `rule_name` taken as the text
//! before the first `:` in the generated description.

const DURATION_THRESHOLD_MS: u64 = 300_000;
const TOTAL_TOKENS_THRESHOLD: u64 = 32_000;

/// One anomaly finding: a human-readable description whose text before the
/// first `:` is the alert's `rule_name`.
pub struct AnomalyFinding {
    /// Full description, e.g. `"Excessive duration: 450000ms"`.
    pub description: String,
}

impl AnomalyFinding {
    /// The rule name: everything before the first `:` in the description.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        self.description.split(':').next().unwrap_or(&self.description)
    }
}

/// Check a span's duration and total token usage against the fixed
/// thresholds. A span can trigger both checks; each produces its own
/// finding.
#[must_use]
pub fn scan(duration_ms: u64, total_tokens: u64) -> Vec<AnomalyFinding> {
    let mut findings = Vec::new();
    if duration_ms > DURATION_THRESHOLD_MS {
        findings.push(AnomalyFinding {
            description: format!("Excessive duration: {duration_ms}ms"),
        });
    }
    if total_tokens > TOTAL_TOKENS_THRESHOLD {
        findings.push(AnomalyFinding {
            description: format!("High token usage: {total_tokens}"),
        });
    }
    findings
}

/// Anomaly findings are always this severity.
pub const SEVERITY: &str = "LOW";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_over_threshold_is_flagged() {
        let findings = scan(300_001, 0);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_name(), "Excessive duration");
    }

    #[test]
    fn duration_at_threshold_is_not_flagged() {
        assert!(scan(300_000, 0).is_empty());
    }

    #[test]
    fn token_usage_over_threshold_is_flagged() {
        let findings = scan(0, 32_001);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_name(), "High token usage");
    }

    #[test]
    fn both_thresholds_crossed_produce_two_findings() {
        let findings = scan(400_000, 40_000);
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn neither_threshold_crossed_is_clean() {
        assert!(scan(1_000, 100).is_empty());
    }
}
