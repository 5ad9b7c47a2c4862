//! The gate's answer to one stop attempt.

use serde::{Deserialize, Serialize};

use crate::considerations::ConsiderationResult;
use crate::core::breaker::ForceTrigger;
use crate::error::exit_codes;

/// Whether the agent may stop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopDecision {
    /// Allow the session to end.
    Approve,
    /// Block the session from ending.
    Block,
}

impl StopDecision {
    /// Get the exit code for this decision.
    ///
    /// - 0 = approve (session can end)
    /// - 2 = block (unresolved blockers)
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Approve => exit_codes::APPROVE,
            Self::Block => exit_codes::BLOCK,
        }
    }
}

/// Aggregated outcome of a stop attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub decision: StopDecision,
    /// Failing blocker-severity results.
    pub blockers: Vec<ConsiderationResult>,
    /// Failing warning-severity results.
    pub warnings: Vec<ConsiderationResult>,
    /// Text shown to the agent or user.
    pub diagnostic_summary: String,
    /// Approved even though blockers are still failing.
    pub forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_trigger: Option<ForceTrigger>,
    /// Fingerprint of the failing blockers, when there were any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Turn count after this attempt was recorded.
    pub turn_count: u64,
    /// A checker refused an out-of-bounds path.
    pub security_violation: bool,
}

impl Verdict {
    /// An approval that bypassed evaluation entirely.
    pub fn fail_open(reason: impl Into<String>) -> Self {
        Self {
            decision: StopDecision::Approve,
            blockers: Vec::new(),
            warnings: Vec::new(),
            diagnostic_summary: reason.into(),
            forced: false,
            force_trigger: None,
            fingerprint: None,
            turn_count: 0,
            security_violation: false,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == StopDecision::Approve
    }

    /// IDs of the failing blockers.
    pub fn blocker_ids(&self) -> Vec<&str> {
        self.blockers
            .iter()
            .map(|r| r.consideration_id.as_str())
            .collect()
    }
}
