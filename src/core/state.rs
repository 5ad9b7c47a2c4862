//! Turn state types for stopgate.
//!
//! A `TurnState` is the persisted decision history of one session: how many
//! stop attempts it has made, how many of the latest were blocked in a row,
//! and which sets of failing blockers caused each block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted block/approve history for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnState {
    /// Session identifier supplied by the host runtime.
    pub session_id: String,
    /// Number of stop attempts evaluated. Never decreases.
    #[serde(default)]
    pub turn_count: u64,
    /// Blocks since the last approval.
    #[serde(default)]
    pub consecutive_blocks: u32,
    /// One fingerprint per blocked or force-approved turn, oldest first.
    #[serde(default)]
    pub failure_fingerprints: Vec<String>,
    /// When the state was first created.
    pub created_at: DateTime<Utc>,
    /// When the state was last modified.
    pub updated_at: DateTime<Utc>,
}

impl TurnState {
    /// Create a fresh zero-valued state for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            turn_count: 0,
            consecutive_blocks: 0,
            failure_fingerprints: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record an approved turn.
    ///
    /// Resets the consecutive block counter. Fingerprints are untouched.
    pub fn record_approval(&mut self) {
        self.turn_count = self.turn_count.saturating_add(1);
        self.consecutive_blocks = 0;
        self.touch();
    }

    /// Record a turn that failed on the blockers identified by `fingerprint`.
    ///
    /// Used for both genuine blocks and forced approvals so later turns see
    /// accurate history.
    pub fn record_failure(&mut self, fingerprint: impl Into<String>) {
        self.turn_count = self.turn_count.saturating_add(1);
        self.consecutive_blocks = self.consecutive_blocks.saturating_add(1);
        self.failure_fingerprints.push(fingerprint.into());
        self.touch();
    }

    /// How many times a fingerprint has already been recorded.
    pub fn fingerprint_occurrences(&self, fingerprint: &str) -> usize {
        self.failure_fingerprints
            .iter()
            .filter(|f| f.as_str() == fingerprint)
            .count()
    }

    /// The most recently recorded fingerprint, if any.
    pub fn last_fingerprint(&self) -> Option<&str> {
        self.failure_fingerprints.last().map(String::as_str)
    }

    /// Update the `updated_at` timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
