//! Per-invocation session context handed to every checker.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::session_runtime_dir;

/// Default file name of the compaction event log inside a runtime dir.
pub const COMPACTION_EVENTS_FILE: &str = "compaction_events.json";

/// Everything a checker may inspect about the session trying to stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub transcript_path: PathBuf,
    #[serde(default)]
    pub compaction_events_path: Option<PathBuf>,
    /// Directory event-referenced transcripts must stay within.
    #[serde(default)]
    pub transcript_dir: Option<PathBuf>,
    pub cwd: PathBuf,
    /// Extra host-provided facts, keyed by what considerations need.
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        transcript_path: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            transcript_path: transcript_path.into(),
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    /// The compaction event log, defaulting to the session's runtime dir.
    pub fn resolved_events_path(&self) -> Option<PathBuf> {
        self.compaction_events_path.clone().or_else(|| {
            session_runtime_dir(&self.session_id).map(|d| d.join(COMPACTION_EVENTS_FILE))
        })
    }

    /// The transcript sandbox, defaulting to the session's runtime dir.
    pub fn resolved_transcript_dir(&self) -> Option<PathBuf> {
        self.transcript_dir
            .clone()
            .or_else(|| session_runtime_dir(&self.session_id))
    }
}
