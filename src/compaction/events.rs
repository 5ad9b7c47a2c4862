//! Compaction event records.
//!
//! The host writes one record each time it compacts a session's context.
//! The file may hold a JSON array, a single JSON object, or JSON lines.
//! Unparsable entries are skipped.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::util::read_to_string_limited;

/// One compaction of a session's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub turn_number: u64,
    #[serde(default)]
    pub messages_removed: u64,
    pub pre_compaction_transcript_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_compaction_transcript_path: Option<String>,
    pub session_id: String,
}

impl CompactionEvent {
    /// Age of the event relative to `now`, in fractional hours.
    ///
    /// Events stamped in the future report zero.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.timestamp).num_seconds().max(0);
        secs as f64 / 3600.0
    }

    /// Whether the event is older than `freshness_hours`.
    pub fn is_stale(&self, now: DateTime<Utc>, freshness_hours: u32) -> bool {
        self.age_hours(now) > f64::from(freshness_hours)
    }
}

/// Parse every readable event from file content.
pub fn parse_events(content: &str) -> Vec<CompactionEvent> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) => items.into_iter().filter_map(from_value).collect(),
            other => from_value(other).into_iter().collect(),
        };
    }

    // JSON lines
    let mut events = Vec::new();
    let mut skipped = 0usize;
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CompactionEvent>(line) {
            Ok(event) => events.push(event),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "skipped corrupt compaction event lines");
    }
    events
}

fn from_value(value: Value) -> Option<CompactionEvent> {
    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("skipping malformed compaction event: {}", e);
            None
        }
    }
}

/// Load all events from a file.
pub fn load_events(path: &Path) -> Result<Vec<CompactionEvent>> {
    let content = read_to_string_limited(path)?;
    Ok(parse_events(&content))
}

/// The most recent event, optionally restricted to one session.
///
/// Ordered by timestamp; ties go to the later entry in the file.
pub fn latest_event(
    events: &[CompactionEvent],
    session_id: Option<&str>,
) -> Option<CompactionEvent> {
    events
        .iter()
        .filter(|e| session_id.is_none_or(|id| e.session_id == id))
        .fold(None::<&CompactionEvent>, |best, e| match best {
            Some(b) if b.timestamp > e.timestamp => Some(b),
            _ => Some(e),
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(session: &str, ts: DateTime<Utc>, turn: u64) -> CompactionEvent {
        CompactionEvent {
            timestamp: ts,
            turn_number: turn,
            messages_removed: 12,
            pre_compaction_transcript_path: "pre.jsonl".to_string(),
            post_compaction_transcript_path: None,
            session_id: session.to_string(),
        }
    }

    #[test]
    fn test_parse_array() {
        let now = Utc::now();
        let json = serde_json::to_string(&vec![event("s", now, 1), event("s", now, 2)]).unwrap();
        assert_eq!(parse_events(&json).len(), 2);
    }

    #[test]
    fn test_parse_single_object() {
        let json = serde_json::to_string(&event("s", Utc::now(), 1)).unwrap();
        let events = parse_events(&json);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].turn_number, 1);
    }

    #[test]
    fn test_parse_jsonl_skips_corrupt_lines() {
        let a = serde_json::to_string(&event("s", Utc::now(), 1)).unwrap();
        let b = serde_json::to_string(&event("s", Utc::now(), 2)).unwrap();
        let content = format!("{}\n{{broken\n{}\n", a, b);

        let events = parse_events(&content);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_events("").is_empty());
        assert!(parse_events("not json").is_empty());
        assert!(parse_events(r#"{"unrelated": true}"#).is_empty());
    }

    #[test]
    fn test_latest_event_by_timestamp_and_session() {
        let now = Utc::now();
        let events = vec![
            event("a", now - Duration::hours(2), 1),
            event("b", now, 2),
            event("a", now - Duration::hours(1), 3),
        ];

        assert_eq!(latest_event(&events, None).unwrap().turn_number, 2);
        assert_eq!(latest_event(&events, Some("a")).unwrap().turn_number, 3);
        assert!(latest_event(&events, Some("c")).is_none());
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let old = event("s", now - Duration::hours(30), 1);
        let fresh = event("s", now - Duration::hours(1), 1);
        let future = event("s", now + Duration::hours(1), 1);

        assert!(old.is_stale(now, 24));
        assert!(!fresh.is_stale(now, 24));
        assert_eq!(future.age_hours(now), 0.0);
    }
}
