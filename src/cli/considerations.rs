//! Considerations command for stopgate.
//!
//! Shows the battery the stop hook would run from a directory, and every
//! entry that was rejected while loading it.

use std::path::Path;

use serde::Serialize;

use crate::config::Config;
use crate::considerations::{load_considerations, CheckerRegistry, Consideration};

/// Options for the considerations command.
#[derive(Debug, Clone, Default)]
pub struct ConsiderationsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the considerations command.
#[derive(Debug, Clone, Serialize)]
pub struct ConsiderationsOutput {
    /// Whether every entry loaded cleanly.
    pub success: bool,
    /// Configuration file the battery came from, or `None` for defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub considerations: Vec<Consideration>,
    /// Why each dropped entry was dropped.
    pub rejected: Vec<String>,
    /// Checker names available to configuration.
    pub checkers: Vec<String>,
}

impl ConsiderationsOutput {
    /// Format as human-readable text.
    pub fn format_text(&self) -> String {
        let mut lines = vec![format!(
            "Considerations ({}):",
            self.source.as_deref().unwrap_or("built-in defaults")
        )];
        lines.push(String::new());

        if self.considerations.is_empty() {
            lines.push("  (none)".to_string());
        }
        for c in &self.considerations {
            let state = if c.enabled { "" } else { " [disabled]" };
            lines.push(format!(
                "  {:<24} {:<8} {:<20} {}{}",
                c.id,
                c.severity.as_str(),
                c.checker.name(),
                c.question,
                state
            ));
        }

        if !self.rejected.is_empty() {
            lines.push(String::new());
            lines.push(format!("Rejected ({}):", self.rejected.len()));
            for r in &self.rejected {
                lines.push(format!("  {}", r));
            }
        }

        lines.push(String::new());
        lines.push(format!("Available checkers: {}", self.checkers.join(", ")));
        lines.join("\n")
    }
}

/// The considerations command implementation.
pub struct ConsiderationsCommand {
    registry: CheckerRegistry,
}

impl ConsiderationsCommand {
    /// Create a command using the built-in checkers.
    pub fn new(config: &Config) -> Self {
        Self {
            registry: CheckerRegistry::with_builtins(config),
        }
    }

    /// Run the considerations command for a working directory.
    pub fn run(&self, cwd: &Path) -> ConsiderationsOutput {
        let loaded = load_considerations(cwd, &self.registry);
        ConsiderationsOutput {
            success: loaded.rejected.is_empty(),
            source: loaded.source.map(|p| p.display().to_string()),
            considerations: loaded.considerations,
            rejected: loaded.rejected.iter().map(ToString::to_string).collect(),
            checkers: self.registry.names().into_iter().map(str::to_string).collect(),
        }
    }

    /// Format output based on options.
    pub fn format_output(
        &self,
        output: &ConsiderationsOutput,
        options: &ConsiderationsOptions,
    ) -> String {
        if options.quiet {
            return String::new();
        }
        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.format_text()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::env::set_var("STOPGATE_HOME", home.path());

        let cmd = ConsiderationsCommand::new(&Config::default());
        let output = cmd.run(project.path());

        assert!(output.success);
        assert!(output.source.is_none());
        assert_eq!(output.considerations.len(), 3);
        assert!(output.format_text().contains("built-in defaults"));
        std::env::remove_var("STOPGATE_HOME");
    }

    #[test]
    #[serial]
    fn test_reports_rejected_entries() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::env::set_var("STOPGATE_HOME", home.path());
        fs::write(
            home.path().join("considerations.toml"),
            r#"
[[consideration]]
id = "docs"
question = "Docs updated?"
severity = "warning"
checker = "input_flag"

[[consideration]]
id = "broken"
question = "?"
checker = "nope"
"#,
        )
        .unwrap();

        let cmd = ConsiderationsCommand::new(&Config::default());
        let output = cmd.run(project.path());

        assert!(!output.success);
        assert_eq!(output.considerations.len(), 1);
        assert_eq!(output.rejected.len(), 1);

        let text = cmd.format_output(&output, &ConsiderationsOptions::default());
        assert!(text.contains("Rejected (1):"));
        assert!(text.contains("docs"));

        let json = cmd.format_output(
            &output,
            &ConsiderationsOptions {
                json: true,
                ..Default::default()
            },
        );
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["considerations"][0]["checker"], "input_flag");
        assert_eq!(parsed["considerations"][0]["severity"], "warning");
        std::env::remove_var("STOPGATE_HOME");
    }
}
