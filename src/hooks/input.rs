//! Hook input types for host integration.
//!
//! These types represent the JSON the host runtime passes to stopgate hooks.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::considerations::SessionContext;
use crate::error::GateError;

/// Common input fields shared by all hooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookInput {
    /// Unique session identifier.
    pub session_id: String,
    /// Path to the conversation transcript.
    pub transcript_path: PathBuf,
    /// Current working directory.
    pub cwd: PathBuf,
}

/// Input for the stop and subagent-stop hooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopInput {
    /// Common hook input fields.
    #[serde(flatten)]
    pub common: HookInput,
    /// The host is already continuing because of an earlier block.
    #[serde(default)]
    pub stop_hook_active: bool,
    /// Override for the compaction event log location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_events_path: Option<PathBuf>,
    /// Override for the directory compaction transcripts must live in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_dir: Option<PathBuf>,
    /// Host-provided facts for checkers (CI status, flags, to-dos).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub inputs: HashMap<String, Value>,
}

impl From<StopInput> for SessionContext {
    fn from(input: StopInput) -> Self {
        Self {
            session_id: input.common.session_id,
            transcript_path: input.common.transcript_path,
            compaction_events_path: input.compaction_events_path,
            transcript_dir: input.transcript_dir,
            cwd: input.common.cwd,
            inputs: input.inputs,
        }
    }
}

/// Parse hook input from JSON string.
pub fn parse_input<T: for<'de> Deserialize<'de>>(json: &str) -> crate::error::Result<T> {
    serde_json::from_str(json)
        .map_err(|e| GateError::serde(format!("Failed to parse hook input: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_stop_input() {
        let json = r#"{
            "session_id": "session-123",
            "transcript_path": "/tmp/transcript.jsonl",
            "cwd": "/home/user/project",
            "hook_event_name": "Stop"
        }"#;

        let input: StopInput = parse_input(json).unwrap();

        assert_eq!(input.common.session_id, "session-123");
        assert!(!input.stop_hook_active);
        assert!(input.inputs.is_empty());
        assert!(input.compaction_events_path.is_none());
    }

    #[test]
    fn test_parse_full_stop_input_into_context() {
        let json = r#"{
            "session_id": "session-123",
            "transcript_path": "/tmp/transcript.jsonl",
            "cwd": "/home/user/project",
            "stop_hook_active": true,
            "compaction_events_path": "/tmp/rt/events.json",
            "transcript_dir": "/tmp/rt",
            "inputs": {"ci_status": "failure", "docs-updated": false}
        }"#;

        let input: StopInput = parse_input(json).unwrap();
        assert!(input.stop_hook_active);

        let ctx: SessionContext = input.into();
        assert_eq!(ctx.session_id, "session-123");
        assert_eq!(ctx.transcript_dir, Some(PathBuf::from("/tmp/rt")));
        assert_eq!(ctx.input("ci_status"), Some(&Value::from("failure")));
        assert_eq!(ctx.input("docs-updated"), Some(&Value::from(false)));
    }

    #[test]
    fn test_parse_input_missing_field() {
        let result: crate::error::Result<StopInput> = parse_input(r#"{"session_id": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_input_invalid_json() {
        let result: crate::error::Result<StopInput> = parse_input("not json");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse hook input"));
    }
}
