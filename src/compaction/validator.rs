//! Post-compaction context validation.
//!
//! Compares the transcript saved before the latest compaction with the one
//! the agent works from afterwards, and reports outstanding to-dos, stated
//! objectives and recent messages that can no longer be found.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::compaction::events::{latest_event, load_events, CompactionEvent};
use crate::config::CompactionConfig;
use crate::error::GateError;
use crate::transcript::{TextIndex, Transcript};
use crate::util::resolve_within;

/// Longest excerpt of a message used as a search needle.
const MAX_NEEDLE_CHARS: usize = 400;

/// Line prefixes that mark outstanding work.
const TODO_MARKERS: &[&str] = &["todo:", "fixme:"];

/// Line prefixes that state what the session is for.
const OBJECTIVE_MARKERS: &[&str] = &["objective:", "goal:", "task:"];

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub has_security_violation: bool,
    pub issues: Vec<String>,
    pub diagnostic_summary: String,
    /// The validated event is older than the freshness threshold.
    pub stale: bool,
    pub event_age_hours: Option<f64>,
}

impl ValidationResult {
    fn pass(summary: impl Into<String>) -> Self {
        Self {
            passed: true,
            has_security_violation: false,
            issues: Vec::new(),
            diagnostic_summary: summary.into(),
            stale: false,
            event_age_hours: None,
        }
    }

    fn no_data() -> Self {
        Self::pass("no compaction data")
    }

    fn security_violation(err: &GateError) -> Self {
        Self {
            has_security_violation: true,
            ..Self::pass(format!("refused compaction event: {}", err))
        }
    }

    /// JSON form attached to a consideration result.
    pub fn to_diagnostic(&self) -> Value {
        json!({
            "security_violation": self.has_security_violation,
            "issues": self.issues,
            "summary": self.diagnostic_summary,
            "stale": self.stale,
            "event_age_hours": self.event_age_hours,
        })
    }
}

/// Validates that a compaction preserved the context the agent needs.
#[derive(Debug, Clone)]
pub struct CompactionValidator {
    config: CompactionConfig,
    session_id: Option<String>,
    current_transcript: Option<PathBuf>,
}

impl CompactionValidator {
    pub fn new(config: CompactionConfig) -> Self {
        Self {
            config,
            session_id: None,
            current_transcript: None,
        }
    }

    /// Only consider events recorded for this session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Transcript to compare against when an event names no post-compaction
    /// transcript.
    pub fn with_current_transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.current_transcript = Some(path.into());
        self
    }

    /// Validate the most recent compaction event in `events_path`.
    ///
    /// Never fails: missing data and unreadable transcripts pass, and paths
    /// escaping `transcript_dir` pass with the security flag set.
    pub fn validate(&self, events_path: &Path, transcript_dir: &Path) -> ValidationResult {
        let events = match load_events(events_path) {
            Ok(events) => events,
            Err(e) => {
                tracing::debug!(path = %events_path.display(), "no compaction events: {}", e);
                return ValidationResult::no_data();
            }
        };
        let Some(event) = latest_event(&events, self.session_id.as_deref()) else {
            return ValidationResult::no_data();
        };

        let now = Utc::now();
        let age = event.age_hours(now);
        let stale = event.is_stale(now, self.config.freshness_hours);
        if stale {
            tracing::warn!(
                session_id = %event.session_id,
                age_hours = age,
                "compaction event is stale; validating anyway"
            );
        }

        let mut result = self.validate_event(&event, transcript_dir);
        result.stale = stale;
        result.event_age_hours = Some(age);
        result
    }

    fn validate_event(&self, event: &CompactionEvent, transcript_dir: &Path) -> ValidationResult {
        let pre_path =
            match resolve_within(transcript_dir, Path::new(&event.pre_compaction_transcript_path)) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("compaction event rejected: {}", e);
                    return ValidationResult::security_violation(&e);
                }
            };

        let post_path = match &event.post_compaction_transcript_path {
            Some(p) => match resolve_within(transcript_dir, Path::new(p)) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("compaction event rejected: {}", e);
                    return ValidationResult::security_violation(&e);
                }
            },
            None => match &self.current_transcript {
                Some(path) => path.clone(),
                None => return ValidationResult::pass("no post-compaction transcript"),
            },
        };

        let pre = match Transcript::load(&pre_path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("pre-compaction transcript unreadable: {} (fail-open)", e);
                return ValidationResult::pass("pre-compaction transcript unavailable");
            }
        };
        let post = match Transcript::load(&post_path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("post-compaction transcript unreadable: {} (fail-open)", e);
                return ValidationResult::pass("post-compaction transcript unavailable");
            }
        };

        self.compare(&pre, &post)
    }

    /// Run the three preservation checks of `pre` against `post`.
    pub fn compare(&self, pre: &Transcript, post: &Transcript) -> ValidationResult {
        let index = TextIndex::from_transcript(post);
        let threshold = self.config.match_threshold;
        let mut issues = Vec::new();

        for todo in outstanding_todos(pre) {
            if !index.discoverable(&todo, threshold) {
                issues.push(format!("to-do lost after compaction: {}", todo));
            }
        }

        for objective in stated_objectives(pre) {
            if !index.discoverable(&objective, threshold) {
                issues.push(format!("objective lost after compaction: {}", objective));
            }
        }

        let recent: Vec<String> = pre
            .recent(self.config.recent_messages)
            .iter()
            .filter(|m| !m.text.trim().is_empty())
            .map(|m| excerpt(&m.text, MAX_NEEDLE_CHARS))
            .collect();
        let missing = recent
            .iter()
            .filter(|text| !index.discoverable(text, threshold))
            .count();
        if missing > 0 {
            issues.push(format!(
                "{} of {} recent messages missing after compaction",
                missing,
                recent.len()
            ));
        }

        let diagnostic_summary = if issues.is_empty() {
            "compaction preserved to-dos, objectives and recent messages".to_string()
        } else {
            format!("{} context issue(s) after compaction", issues.len())
        };

        ValidationResult {
            passed: issues.is_empty(),
            issues,
            diagnostic_summary,
            ..ValidationResult::pass("")
        }
    }
}

/// Outstanding work items stated in a transcript.
fn outstanding_todos(transcript: &Transcript) -> Vec<String> {
    let mut items = Vec::new();

    for message in &transcript.messages {
        for line in message.text.lines() {
            let line = line.trim();
            if let Some(item) = line.strip_prefix("- [ ]") {
                push_unique(&mut items, item.trim());
            } else if let Some(pos) = find_marker(line, TODO_MARKERS) {
                push_unique(&mut items, line[pos..].trim());
            }
        }
    }

    if let Some(todos) = transcript.latest_todos() {
        for todo in todos.iter().filter(|t| t.is_open()) {
            push_unique(&mut items, todo.content.trim());
        }
    }

    items
}

/// Objectives stated in a transcript, starting with the first user request.
fn stated_objectives(transcript: &Transcript) -> Vec<String> {
    let mut items = Vec::new();

    if let Some(request) = transcript.first_user_request() {
        push_unique(&mut items, &excerpt(request.trim(), MAX_NEEDLE_CHARS));
    }

    for message in &transcript.messages {
        for line in message.text.lines() {
            let line = line.trim().trim_start_matches(['-', '*', '#', ' ']);
            if starts_with_marker(line, OBJECTIVE_MARKERS) {
                push_unique(&mut items, line);
            }
        }
    }

    items
}

/// Byte offset of the first marker in `line`, matched case-insensitively.
fn find_marker(line: &str, markers: &[&str]) -> Option<usize> {
    let lower = line.to_ascii_lowercase();
    markers.iter().filter_map(|m| lower.find(m)).min()
}

fn starts_with_marker(line: &str, markers: &[&str]) -> bool {
    let lower = line.to_ascii_lowercase();
    markers.iter().any(|m| lower.starts_with(m))
}

fn push_unique(items: &mut Vec<String>, item: &str) {
    if !item.is_empty() && !items.iter().any(|i| i == item) {
        items.push(item.to_string());
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
