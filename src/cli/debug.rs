//! Debug command for stopgate.
//!
//! Full turn state dump for development and troubleshooting, with a
//! `--reset` escape hatch that clears a session's history.

use serde::{Deserialize, Serialize};

use crate::core::TurnState;
use crate::storage::TurnStateStore;

/// Options for the debug command.
#[derive(Debug, Clone, Default)]
pub struct DebugOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Delete the stored state after showing it.
    pub reset: bool,
}

/// Output format for the debug command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugOutput {
    /// Whether the command was successful.
    pub success: bool,
    /// The turn state (full dump).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TurnState>,
    /// Whether the state was deleted.
    pub reset: bool,
    /// Error message if command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DebugOutput {
    /// Create a successful output.
    pub fn success(state: TurnState, reset: bool) -> Self {
        Self {
            success: true,
            state: Some(state),
            reset,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            state: None,
            reset: false,
            error: Some(error.into()),
        }
    }
}

/// The debug command implementation.
pub struct DebugCommand<S: TurnStateStore> {
    store: S,
}

impl<S: TurnStateStore> DebugCommand<S> {
    /// Create a new debug command.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Run the debug command.
    pub fn run(&self, session_id: &str, options: &DebugOptions) -> DebugOutput {
        if !self.store.contains(session_id) {
            return DebugOutput::failure(format!("Session not found: {}", session_id));
        }

        let _lock = self.store.lock(session_id);
        let state = self.store.load(session_id);

        if options.reset {
            if let Err(e) = self.store.delete(session_id) {
                return DebugOutput::failure(format!("Failed to reset session: {}", e));
            }
            return DebugOutput::success(state, true);
        }

        DebugOutput::success(state, false)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &DebugOutput, options: &DebugOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    /// Format output as human-readable text.
    fn format_human_readable(&self, output: &DebugOutput) -> String {
        if !output.success {
            return format!(
                "Debug failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let Some(state) = &output.state else {
            return String::new();
        };

        let mut lines = vec![
            format!("Session: {}", state.session_id),
            format!("Turns: {}", state.turn_count),
            format!("Consecutive blocks: {}", state.consecutive_blocks),
            format!("Created: {}", state.created_at.to_rfc3339()),
            format!("Updated: {}", state.updated_at.to_rfc3339()),
        ];

        if state.failure_fingerprints.is_empty() {
            lines.push("Failure fingerprints: none".to_string());
        } else {
            lines.push(format!(
                "Failure fingerprints ({}):",
                state.failure_fingerprints.len()
            ));
            for (i, fp) in state.failure_fingerprints.iter().enumerate() {
                lines.push(format!(
                    "  {:>3}. {} (seen {}x)",
                    i + 1,
                    fp,
                    state.fingerprint_occurrences(fp)
                ));
            }
        }

        if output.reset {
            lines.push(String::new());
            lines.push("State reset.".to_string());
        }

        lines.join("\n")
    }
}
