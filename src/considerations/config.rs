//! Consideration configuration loading.
//!
//! Considerations come from `[[consideration]]` tables in
//! `.stopgate/considerations.toml` (project) or `~/.stopgate/considerations.toml`
//! (user), falling back to a built-in battery. Each entry is validated on
//! its own: a malformed entry is dropped with a warning and the rest load.

use std::path::{Path, PathBuf};

use crate::config::considerations_path;
use crate::considerations::{CheckerRegistry, Consideration, Severity};
use crate::core::fingerprint::ID_SEPARATOR;
use crate::error::{GateError, Result};
use crate::util::read_to_string_limited;

/// Category used when an entry names none.
pub const DEFAULT_CATEGORY: &str = "general";

/// Maximum length of a consideration id.
pub const MAX_ID_LEN: usize = 128;

/// Result of loading the consideration battery.
#[derive(Debug, Default)]
pub struct LoadedConsiderations {
    /// Valid considerations in file order.
    pub considerations: Vec<Consideration>,
    /// Why each dropped entry was dropped.
    pub rejected: Vec<GateError>,
    /// The file the battery came from, or `None` for built-in defaults.
    pub source: Option<PathBuf>,
}

/// The battery used when no configuration file exists.
pub fn default_considerations(registry: &CheckerRegistry) -> Vec<Consideration> {
    let defaults = [
        (
            "todos-complete",
            "workflow",
            "Are all items on the to-do list complete?",
            "todos_complete",
        ),
        (
            "ci-passing",
            "quality",
            "Is CI passing for the current changes?",
            "ci_status",
        ),
        (
            "compaction-context",
            "context",
            "Did the last context compaction preserve outstanding to-dos, objectives and recent messages?",
            "compaction_context",
        ),
    ];

    defaults
        .into_iter()
        .filter_map(|(id, category, question, checker)| {
            let Some(checker) = registry.resolve(checker) else {
                tracing::warn!(consideration = id, checker, "default checker not registered");
                return None;
            };
            Some(Consideration {
                id: id.to_string(),
                category: category.to_string(),
                question: question.to_string(),
                severity: Severity::Blocker,
                checker,
                enabled: true,
            })
        })
        .collect()
}

/// Load the battery for a working directory.
///
/// Never fails: an unreadable or unparsable file falls back to the
/// defaults, and the failure is reported in `rejected`.
pub fn load_considerations(cwd: &Path, registry: &CheckerRegistry) -> LoadedConsiderations {
    let Some(path) = considerations_path(cwd) else {
        return LoadedConsiderations {
            considerations: default_considerations(registry),
            ..LoadedConsiderations::default()
        };
    };

    let parsed = read_to_string_limited(&path)
        .and_then(|content| parse_considerations(&content, registry));
    match parsed {
        Ok(mut loaded) => {
            loaded.source = Some(path);
            loaded
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                "considerations file unusable: {} (fail-open: using defaults)",
                e
            );
            LoadedConsiderations {
                considerations: default_considerations(registry),
                rejected: vec![e],
                source: None,
            }
        }
    }
}

/// Parse considerations TOML.
///
/// Errors only when the document itself is not valid TOML. A document
/// without a `consideration` key yields the defaults.
pub fn parse_considerations(
    content: &str,
    registry: &CheckerRegistry,
) -> Result<LoadedConsiderations> {
    let table = content
        .parse::<toml::Table>()
        .map_err(|e| GateError::config(format!("invalid considerations TOML: {}", e)))?;

    let Some(entries) = table.get("consideration") else {
        return Ok(LoadedConsiderations {
            considerations: default_considerations(registry),
            ..LoadedConsiderations::default()
        });
    };
    let entries = entries
        .as_array()
        .ok_or_else(|| GateError::config("'consideration' must be an array of tables"))?;

    let mut loaded = LoadedConsiderations::default();
    for (index, entry) in entries.iter().enumerate() {
        let result = entry
            .as_table()
            .ok_or_else(|| GateError::invalid_consideration(index, "entry is not a table"))
            .and_then(|t| parse_entry(index, t, registry))
            .and_then(|c| {
                if loaded.considerations.iter().any(|o| o.id == c.id) {
                    Err(GateError::invalid_consideration(
                        index,
                        format!("duplicate id '{}'", c.id),
                    ))
                } else {
                    Ok(c)
                }
            });

        match result {
            Ok(consideration) => loaded.considerations.push(consideration),
            Err(e) => {
                tracing::warn!("rejected consideration: {}", e);
                loaded.rejected.push(e);
            }
        }
    }

    Ok(loaded)
}

fn parse_entry(
    index: usize,
    table: &toml::Table,
    registry: &CheckerRegistry,
) -> Result<Consideration> {
    let invalid = |msg: String| GateError::invalid_consideration(index, msg);

    let id = required_str(table, "id").map_err(&invalid)?.trim().to_string();
    if id.is_empty() {
        return Err(invalid("'id' is empty".to_string()));
    }
    if id.chars().count() > MAX_ID_LEN {
        return Err(invalid(format!("'id' longer than {} characters", MAX_ID_LEN)));
    }
    if id.chars().any(|c| c.is_control() || c == ID_SEPARATOR) {
        return Err(invalid(format!("'id' {:?} contains control characters", id)));
    }

    let question = required_str(table, "question").map_err(&invalid)?.trim().to_string();
    if question.is_empty() {
        return Err(invalid(format!("'{}': 'question' is empty", id)));
    }

    let category = match table.get("category") {
        None => DEFAULT_CATEGORY.to_string(),
        Some(v) => v
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid(format!("'{}': 'category' must be a non-empty string", id)))?,
    };

    let severity = required_str(table, "severity")
        .ok()
        .and_then(Severity::parse)
        .ok_or_else(|| {
            invalid(format!("'{}': 'severity' must be \"blocker\" or \"warning\"", id))
        })?;

    let checker_name = required_str(table, "checker").map_err(&invalid)?;
    let checker = registry.resolve(checker_name).ok_or_else(|| {
        invalid(format!(
            "'{}': unknown checker '{}' (available: {})",
            id,
            checker_name,
            registry.names().join(", ")
        ))
    })?;

    let enabled = match table.get("enabled") {
        None => true,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| invalid(format!("'{}': 'enabled' must be a boolean", id)))?,
    };

    for key in table.keys() {
        if !matches!(
            key.as_str(),
            "id" | "category" | "question" | "severity" | "checker" | "enabled"
        ) {
            tracing::warn!(consideration = %id, key = %key, "ignoring unknown consideration key");
        }
    }

    Ok(Consideration {
        id,
        category,
        question,
        severity,
        checker,
        enabled,
    })
}

fn required_str<'a>(table: &'a toml::Table, key: &str) -> std::result::Result<&'a str, String> {
    match table.get(key) {
        None => Err(format!("missing '{}'", key)),
        Some(v) => v.as_str().ok_or_else(|| format!("'{}' must be a string", key)),
    }
}
