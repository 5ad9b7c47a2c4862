//! Sessions command for stopgate.
//!
//! Lists recent turn states with their block history, useful for finding
//! session IDs to pass to `stopgate debug`.

use serde::{Deserialize, Serialize};

use crate::core::TurnState;
use crate::error::Result;
use crate::storage::TurnStateStore;

/// Options for the sessions command.
#[derive(Debug, Clone, Default)]
pub struct SessionsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Maximum number of sessions to show.
    pub limit: usize,
}

/// Summary of a single session for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session ID.
    pub id: String,
    /// Stop attempts evaluated.
    pub turn_count: u64,
    /// Blocks since the last approval.
    pub consecutive_blocks: u32,
    /// Blocked or force-approved turns overall.
    pub failures: usize,
    /// Last updated timestamp (ISO 8601).
    pub updated_at: String,
    /// Most recent failure fingerprint, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fingerprint: Option<String>,
}

impl From<&TurnState> for SessionSummary {
    fn from(state: &TurnState) -> Self {
        Self {
            id: state.session_id.clone(),
            turn_count: state.turn_count,
            consecutive_blocks: state.consecutive_blocks,
            failures: state.failure_fingerprints.len(),
            updated_at: state.updated_at.to_rfc3339(),
            last_fingerprint: state.last_fingerprint().map(str::to_string),
        }
    }
}

/// Output format for the sessions command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsOutput {
    /// Whether the command was successful.
    pub success: bool,
    /// List of session summaries.
    pub sessions: Vec<SessionSummary>,
    /// Total count of sessions returned.
    pub count: usize,
    /// Error message if command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionsOutput {
    /// Create a successful output.
    pub fn success(sessions: Vec<SessionSummary>) -> Self {
        let count = sessions.len();
        Self {
            success: true,
            sessions,
            count,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            sessions: vec![],
            count: 0,
            error: Some(error.into()),
        }
    }

    /// Format as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Sessions failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        if self.sessions.is_empty() {
            return "No sessions found.".to_string();
        }

        let mut lines = vec![format!("Sessions ({} found):", self.count)];
        lines.push(String::new());

        lines.push(format!(
            "{:<36}  {:>5}  {:>6}  {:<20}  {}",
            "ID", "TURNS", "BLOCKS", "UPDATED", "LAST FINGERPRINT"
        ));
        lines.push("-".repeat(96));

        for session in &self.sessions {
            let fingerprint = session.last_fingerprint.as_deref().unwrap_or("-");
            // RFC 3339 prefix: YYYY-MM-DDTHH:MM:SS
            let updated: String = session.updated_at.chars().take(19).collect();
            lines.push(format!(
                "{:<36}  {:>5}  {:>6}  {:<20}  {}",
                session.id, session.turn_count, session.consecutive_blocks, updated, fingerprint
            ));
        }

        lines.join("\n")
    }
}

/// The sessions command implementation.
pub struct SessionsCommand<S: TurnStateStore> {
    store: S,
}

impl<S: TurnStateStore> SessionsCommand<S> {
    /// Create a new sessions command.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Run the sessions command.
    pub fn run(&self, options: &SessionsOptions) -> SessionsOutput {
        match self.list_sessions(options.limit) {
            Ok(states) => {
                SessionsOutput::success(states.iter().map(SessionSummary::from).collect())
            }
            Err(e) => SessionsOutput::failure(format!("Failed to list sessions: {}", e)),
        }
    }

    fn list_sessions(&self, limit: usize) -> Result<Vec<TurnState>> {
        self.store.list(limit)
    }
}
