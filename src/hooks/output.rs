//! Hook output types for host integration.
//!
//! These types represent the JSON that stopgate returns to the host.

use serde::{Deserialize, Serialize};

pub use crate::core::verdict::StopDecision;
use crate::core::verdict::Verdict;
use crate::error::{GateError, Result};

/// Output for the stop hook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopOutput {
    /// The decision: approve or block.
    pub decision: StopDecision,
    /// Explanation shown to the agent when blocking, or to the user when
    /// approving with caveats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Approved by the loop detector or circuit breaker.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub security_violation: bool,
}

impl StopOutput {
    /// Create an approve output.
    pub fn approve() -> Self {
        Self {
            decision: StopDecision::Approve,
            reason: None,
            forced: false,
            fingerprint: None,
            security_violation: false,
        }
    }

}

impl From<&Verdict> for StopOutput {
    fn from(verdict: &Verdict) -> Self {
        // A clean approval needs no explanation. Fail-open verdicts never
        // reached the store and keep turn_count at zero.
        let quiet = verdict.decision == StopDecision::Approve
            && verdict.turn_count > 0
            && !verdict.forced
            && verdict.warnings.is_empty()
            && !verdict.security_violation;
        Self {
            decision: verdict.decision,
            reason: (!quiet).then(|| verdict.diagnostic_summary.clone()),
            forced: verdict.forced,
            fingerprint: verdict.fingerprint.clone(),
            security_violation: verdict.security_violation,
        }
    }
}

/// Serialize output to JSON string.
pub fn to_json<T: Serialize>(output: &T) -> Result<String> {
    serde_json::to_string(output)
        .map_err(|e| GateError::serde(format!("Failed to serialize output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approve_serializes_minimally() {
        let json = to_json(&StopOutput::approve()).unwrap();
        assert_eq!(json, r#"{"decision":"approve"}"#);
    }

    #[test]
    fn test_from_blocked_verdict() {
        let mut verdict = Verdict::fail_open("1 blocker failed: ci-passing");
        verdict.decision = StopDecision::Block;
        verdict.turn_count = 1;

        let json = to_json(&StopOutput::from(&verdict)).unwrap();
        assert!(json.contains(r#""decision":"block""#));
        assert!(json.contains(r#""reason":"1 blocker failed: ci-passing""#));
    }

    #[test]
    fn test_from_clean_verdict_has_no_reason() {
        let mut verdict = Verdict::fail_open("All blocking considerations passed.");
        verdict.turn_count = 1;
        let output = StopOutput::from(&verdict);
        assert!(output.reason.is_none());
    }

    #[test]
    fn test_from_fail_open_verdict_keeps_reason() {
        let verdict = Verdict::fail_open("stopgate: bad input (fail-open)");
        let output = StopOutput::from(&verdict);
        assert_eq!(output.decision, StopDecision::Approve);
        assert!(output.reason.unwrap().contains("fail-open"));
    }

    #[test]
    fn test_from_forced_verdict() {
        let mut verdict = Verdict::fail_open("loop detected");
        verdict.forced = true;
        verdict.fingerprint = Some("0123456789abcdef".to_string());

        let json = serde_json::to_value(StopOutput::from(&verdict)).unwrap();
        assert_eq!(json["decision"], "approve");
        assert_eq!(json["forced"], true);
        assert_eq!(json["reason"], "loop detected");
        assert_eq!(json["fingerprint"], "0123456789abcdef");
    }

    #[test]
    fn test_security_violation_serialized() {
        let mut verdict = Verdict::fail_open("compaction event rejected");
        verdict.security_violation = true;
        verdict.turn_count = 1;

        let output = StopOutput::from(&verdict);
        let parsed: StopOutput = serde_json::from_str(&to_json(&output).unwrap()).unwrap();
        assert_eq!(parsed, output);
        assert!(parsed.security_violation);
        assert!(parsed.reason.is_some());
    }
}
