//! Loop detection and circuit breaker.
//!
//! Blocking without bound is a denial of service against the user. Two
//! independent triggers force the gate to approve even while blockers are
//! still failing.

use serde::{Deserialize, Serialize};

use crate::core::state::TurnState;

/// Which circuit breaker trigger forced an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceTrigger {
    /// The session has been blocked `max_consecutive_blocks` times in a row.
    ConsecutiveBlocks {
        /// Blocks recorded before this turn.
        blocks: u32,
        /// Configured ceiling.
        max: u32,
    },
    /// The same set of failing blockers keeps recurring.
    RepeatedFailure {
        /// Total occurrences including this turn.
        occurrences: usize,
        /// Configured repeat threshold.
        threshold: u32,
    },
}

impl ForceTrigger {
    /// Human-readable explanation for the verdict diagnostic.
    pub fn describe(&self) -> String {
        match self {
            Self::ConsecutiveBlocks { blocks, max } => format!(
                "circuit breaker: stop was blocked {} times in a row (limit {})",
                blocks, max
            ),
            Self::RepeatedFailure {
                occurrences,
                threshold,
            } => format!(
                "loop detected: the same set of failing checks has occurred {} times (threshold {})",
                occurrences, threshold
            ),
        }
    }
}

/// Decide whether the gate must force-approve, and why.
///
/// The consecutive-block ceiling is checked first so its diagnostic wins
/// when both triggers fire on the same turn.
pub fn evaluate(
    state: &TurnState,
    current_fingerprint: &str,
    max_consecutive_blocks: u32,
    loop_repeat_threshold: u32,
) -> Option<ForceTrigger> {
    if state.consecutive_blocks >= max_consecutive_blocks {
        return Some(ForceTrigger::ConsecutiveBlocks {
            blocks: state.consecutive_blocks,
            max: max_consecutive_blocks,
        });
    }

    let prior = state.fingerprint_occurrences(current_fingerprint);
    let needed = loop_repeat_threshold.saturating_sub(1) as usize;
    if needed > 0 && prior >= needed {
        return Some(ForceTrigger::RepeatedFailure {
            occurrences: prior + 1,
            threshold: loop_repeat_threshold,
        });
    }

    None
}

/// Whether either trigger fires for this turn.
pub fn should_force_approve(
    state: &TurnState,
    current_fingerprint: &str,
    max_consecutive_blocks: u32,
    loop_repeat_threshold: u32,
) -> bool {
    evaluate(
        state,
        current_fingerprint,
        max_consecutive_blocks,
        loop_repeat_threshold,
    )
    .is_some()
}
