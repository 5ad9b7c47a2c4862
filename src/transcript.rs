//! Session transcript parsing and text matching.
//!
//! Transcripts are JSON lines. Each line is either a host envelope
//! (`{"type": "user", "message": {"role": "user", "content": ...}}`) or a
//! bare `{"role": ..., "content": ...}` message. Content is a string or a
//! list of blocks (`text`, `tool_use`, `tool_result`). Lines that don't
//! parse, or carry no role, are skipped.

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::util::read_to_string_limited;

/// Tool name whose `input.todos` carries the agent's to-do list.
pub const TODO_TOOL: &str = "TodoWrite";

/// Words too common to count as evidence that content survived.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "may", "new", "now", "see", "way",
    "who", "did", "get", "let", "put", "say", "she", "too", "use", "that", "this", "with", "from",
    "have", "will", "into", "them", "then", "than", "there", "their", "what", "when", "which",
    "your", "been", "were", "also", "some", "just", "should", "would", "could",
];

/// One entry of a TodoWrite list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    pub content: String,
    pub status: String,
}

impl TodoItem {
    /// Whether the item still needs work.
    pub fn is_open(&self) -> bool {
        !self.status.eq_ignore_ascii_case("completed")
    }
}

/// A single transcript message, flattened to searchable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// `user`, `assistant`, `system` or whatever the host wrote.
    pub role: String,
    /// Concatenated text, tool-result and tool-input content.
    pub text: String,
    /// The to-do list, if this message called the TodoWrite tool.
    pub todos: Option<Vec<TodoItem>>,
}

/// A parsed transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub messages: Vec<Message>,
}

impl Transcript {
    /// Parse JSONL content. Returns the transcript and the 1-based line
    /// numbers that failed to parse.
    pub fn parse(content: &str) -> (Self, Vec<usize>) {
        let mut messages = Vec::new();
        let mut errors = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => {
                    if let Some(message) = parse_message(&value) {
                        messages.push(message);
                    }
                }
                Err(_) => errors.push(idx + 1),
            }
        }

        (Self { messages }, errors)
    }

    /// Load and parse a transcript file, skipping corrupt lines.
    pub fn load(path: &Path) -> Result<Self> {
        let content = read_to_string_limited(path)?;
        let (transcript, errors) = Self::parse(&content);
        if !errors.is_empty() {
            tracing::warn!(
                path = %path.display(),
                skipped = errors.len(),
                first_line = errors[0],
                "skipped corrupt transcript lines"
            );
        }
        Ok(transcript)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent TodoWrite list, if the agent ever wrote one.
    pub fn latest_todos(&self) -> Option<&[TodoItem]> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.todos.as_deref())
    }

    /// Text of the first user message with any content.
    pub fn first_user_request(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "user" && !m.text.trim().is_empty())
            .map(|m| m.text.as_str())
    }

    /// The last `n` messages.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// All message text joined by newlines.
    pub fn full_text(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&message.text);
        }
        out
    }
}

fn parse_message(value: &Value) -> Option<Message> {
    let inner = value.get("message").unwrap_or(value);
    let role = inner.get("role").and_then(Value::as_str).or_else(|| {
        value
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| matches!(*t, "user" | "assistant" | "system"))
    })?;

    let mut text = String::new();
    let mut todos = None;

    match inner.get("content") {
        Some(Value::String(s)) => text.push_str(s),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                collect_block(block, &mut text, &mut todos);
            }
        }
        _ => {}
    }

    Some(Message {
        role: role.to_string(),
        text,
        todos,
    })
}

fn collect_block(block: &Value, text: &mut String, todos: &mut Option<Vec<TodoItem>>) {
    let kind = block.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "text" => {
            if let Some(s) = block.get("text").and_then(Value::as_str) {
                push_line(text, s);
            }
        }
        "tool_use" => {
            let name = block.get("name").and_then(Value::as_str).unwrap_or("");
            if name == TODO_TOOL {
                let items = parse_todos(block.get("input").and_then(|i| i.get("todos")));
                for item in &items {
                    push_line(text, &item.content);
                }
                *todos = Some(items);
            }
        }
        "tool_result" => match block.get("content") {
            Some(Value::String(s)) => push_line(text, s),
            Some(Value::Array(parts)) => {
                for part in parts {
                    if let Some(s) = part.get("text").and_then(Value::as_str) {
                        push_line(text, s);
                    }
                }
            }
            _ => {}
        },
        _ => {}
    }
}

/// Parse a TodoWrite `todos` array. Entries without content are dropped.
pub fn parse_todos(value: Option<&Value>) -> Vec<TodoItem> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let content = item.get("content").and_then(Value::as_str)?;
                    let status = item
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("pending");
                    Some(TodoItem {
                        content: content.to_string(),
                        status: status.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn push_line(text: &mut String, s: &str) {
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(s);
}

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased words of at least three characters that aren't stopwords.
pub fn significant_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Precomputed search structures over a body of text.
///
/// Built once per transcript so each lookup is a substring scan plus set
/// lookups.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    normalized: String,
    words: HashSet<String>,
}

impl TextIndex {
    pub fn new(text: &str) -> Self {
        Self {
            normalized: normalize_text(text),
            words: significant_words(text).into_iter().collect(),
        }
    }

    pub fn from_transcript(transcript: &Transcript) -> Self {
        Self::new(&transcript.full_text())
    }

    /// Whether `needle` can still be found in the indexed text.
    ///
    /// Matches on a case-insensitive substring, or when at least
    /// `threshold` of the needle's significant words are present.
    pub fn discoverable(&self, needle: &str, threshold: f64) -> bool {
        let normalized = normalize_text(needle);
        if normalized.is_empty() || self.normalized.contains(&normalized) {
            return true;
        }

        let needle_words: HashSet<String> = significant_words(needle).into_iter().collect();
        if needle_words.is_empty() {
            return false;
        }
        let present = needle_words
            .iter()
            .filter(|w| self.words.contains(*w))
            .count();
        present as f64 / needle_words.len() as f64 >= threshold
    }
}
