//! Built-in checkers.

use serde_json::{json, Value};

use crate::compaction::CompactionValidator;
use crate::config::CompactionConfig;
use crate::considerations::{CheckOutcome, Checker, Consideration, SessionContext};
use crate::error::{GateError, Result};
use crate::transcript::{parse_todos, TodoItem, Transcript};

/// Passes when the agent's to-do list has no open items.
///
/// Reads `inputs.todos` when the host supplies it, otherwise the latest
/// TodoWrite list in the transcript. No list at all passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TodosCompleteChecker;

impl TodosCompleteChecker {
    pub const NAME: &'static str = "todos_complete";
}

impl Checker for TodosCompleteChecker {
    fn check(&self, _c: &Consideration, ctx: &SessionContext) -> Result<CheckOutcome> {
        let todos: Vec<TodoItem> = match ctx.input("todos") {
            Some(value) => parse_todos(Some(value)),
            None => {
                let transcript = Transcript::load(&ctx.transcript_path)?;
                transcript.latest_todos().map(<[_]>::to_vec).unwrap_or_default()
            }
        };

        let open: Vec<&str> = todos
            .iter()
            .filter(|t| t.is_open())
            .map(|t| t.content.as_str())
            .collect();

        if open.is_empty() {
            return Ok(CheckOutcome::pass(format!(
                "all {} to-do item(s) complete",
                todos.len()
            )));
        }

        let message = format!("{} to-do item(s) still open: {}", open.len(), open.join("; "));
        Ok(CheckOutcome::fail(message).with_diagnostic(json!({ "open": open })))
    }
}

/// Passes when `inputs.ci_status` reports success.
///
/// A missing status passes; an unrecognised one is an error (and so a
/// synthesized pass).
#[derive(Debug, Clone, Copy, Default)]
pub struct CiStatusChecker;

impl CiStatusChecker {
    pub const NAME: &'static str = "ci_status";
}

impl Checker for CiStatusChecker {
    fn check(&self, c: &Consideration, ctx: &SessionContext) -> Result<CheckOutcome> {
        let Some(status) = ctx.input("ci_status") else {
            return Ok(CheckOutcome::pass("no CI status reported"));
        };
        let status = status
            .as_str()
            .ok_or_else(|| GateError::checker(&c.id, "ci_status input is not a string"))?;

        match status.to_lowercase().as_str() {
            "success" | "passed" | "pass" | "green" => Ok(CheckOutcome::pass("CI is passing")),
            "failure" | "failed" | "fail" | "red" => {
                Ok(CheckOutcome::fail("CI is failing")
                    .with_diagnostic(json!({ "ci_status": status })))
            }
            "pending" | "running" | "queued" => Ok(CheckOutcome::fail("CI has not finished")
                .with_diagnostic(json!({ "ci_status": status }))),
            other => Err(GateError::checker(
                &c.id,
                format!("unrecognised ci_status '{}'", other),
            )),
        }
    }
}

/// Runs the compaction validator for the session.
#[derive(Debug, Clone)]
pub struct CompactionChecker {
    config: CompactionConfig,
}

impl CompactionChecker {
    pub const NAME: &'static str = "compaction_context";

    pub fn new(config: CompactionConfig) -> Self {
        Self { config }
    }
}

impl Checker for CompactionChecker {
    fn check(&self, _c: &Consideration, ctx: &SessionContext) -> Result<CheckOutcome> {
        let (Some(events_path), Some(transcript_dir)) =
            (ctx.resolved_events_path(), ctx.resolved_transcript_dir())
        else {
            return Ok(CheckOutcome::pass("no compaction data"));
        };

        let result = CompactionValidator::new(self.config.clone())
            .with_session(&ctx.session_id)
            .with_current_transcript(&ctx.transcript_path)
            .validate(&events_path, &transcript_dir);

        let message = if result.issues.is_empty() {
            result.diagnostic_summary.clone()
        } else {
            format!("{}: {}", result.diagnostic_summary, result.issues.join("; "))
        };

        Ok(CheckOutcome {
            passed: result.passed,
            message,
            diagnostic: Some(result.to_diagnostic()),
        })
    }
}

/// Reads a boolean the host supplies under the consideration's own id.
///
/// Missing means pass; a non-boolean is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputFlagChecker;

impl InputFlagChecker {
    pub const NAME: &'static str = "input_flag";
}

impl Checker for InputFlagChecker {
    fn check(&self, c: &Consideration, ctx: &SessionContext) -> Result<CheckOutcome> {
        match ctx.input(&c.id) {
            None => Ok(CheckOutcome::pass(format!("no '{}' input supplied", c.id))),
            Some(Value::Bool(true)) => Ok(CheckOutcome::pass(format!("'{}' satisfied", c.id))),
            Some(Value::Bool(false)) => Ok(CheckOutcome::fail(c.question.clone())),
            Some(_) => Err(GateError::checker(
                &c.id,
                format!("input '{}' is not a boolean", c.id),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::considerations::{CheckerRef, Severity};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn consideration(id: &str, checker: Arc<dyn Checker>) -> Consideration {
        Consideration {
            id: id.to_string(),
            category: "test".to_string(),
            question: format!("Is {} done?", id),
            severity: Severity::Blocker,
            checker: CheckerRef::new("under-test", checker),
            enabled: true,
        }
    }

    fn run(
        checker: impl Checker + 'static,
        id: &str,
        ctx: &SessionContext,
    ) -> Result<CheckOutcome> {
        let c = consideration(id, Arc::new(checker));
        c.checker.check(&c, ctx)
    }

    #[test]
    fn test_todos_from_inputs() {
        let ctx = SessionContext::new("s", "/nonexistent", "/").with_input(
            "todos",
            json!([
                {"content": "Write tests", "status": "completed"},
                {"content": "Update docs", "status": "pending"}
            ]),
        );

        let outcome = run(TodosCompleteChecker, "todos-complete", &ctx).unwrap();
        assert!(!outcome.passed);
        assert!(outcome.message.contains("Update docs"));
    }

    #[test]
    fn test_todos_from_transcript() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.jsonl");
        let line = json!({"type": "assistant", "message": {"role": "assistant", "content": [
            {"type": "tool_use", "name": "TodoWrite", "input": {"todos": [
                {"content": "Ship it", "status": "completed"}
            ]}}
        ]}});
        fs::write(&path, line.to_string()).unwrap();

        let ctx = SessionContext::new("s", &path, dir.path());
        let outcome = run(TodosCompleteChecker, "todos-complete", &ctx).unwrap();
        assert!(outcome.passed);
    }

    #[test]
    fn test_todos_missing_transcript_is_error() {
        let ctx = SessionContext::new("s", "/nonexistent/t.jsonl", "/");
        assert!(run(TodosCompleteChecker, "todos-complete", &ctx).is_err());
    }

    #[test]
    fn test_ci_status() {
        let base = SessionContext::new("s", "/t", "/");
        assert!(run(CiStatusChecker, "ci", &base).unwrap().passed);

        let ok = base.clone().with_input("ci_status", json!("success"));
        assert!(run(CiStatusChecker, "ci", &ok).unwrap().passed);

        let failed = base.clone().with_input("ci_status", json!("FAILED"));
        assert!(!run(CiStatusChecker, "ci", &failed).unwrap().passed);

        let pending = base.clone().with_input("ci_status", json!("pending"));
        assert!(!run(CiStatusChecker, "ci", &pending).unwrap().passed);

        let odd = base.with_input("ci_status", json!("sideways"));
        assert!(run(CiStatusChecker, "ci", &odd).is_err());
    }

    #[test]
    fn test_input_flag() {
        let base = SessionContext::new("s", "/t", "/");
        assert!(run(InputFlagChecker, "docs-updated", &base).unwrap().passed);

        let no = base.clone().with_input("docs-updated", json!(false));
        let outcome = run(InputFlagChecker, "docs-updated", &no).unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.message, "Is docs-updated done?");

        let yes = base.clone().with_input("docs-updated", json!(true));
        assert!(run(InputFlagChecker, "docs-updated", &yes).unwrap().passed);

        let bad = base.with_input("docs-updated", json!("yes"));
        assert!(run(InputFlagChecker, "docs-updated", &bad).is_err());
    }

    #[test]
    fn test_compaction_checker_flags_security_violation() {
        let dir = TempDir::new().unwrap();
        let events = dir.path().join("events.json");
        fs::write(
            &events,
            json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "pre_compaction_transcript_path": "../../../etc/passwd",
                "session_id": "s",
            })
            .to_string(),
        )
        .unwrap();

        let mut ctx = SessionContext::new("s", dir.path().join("t.jsonl"), dir.path());
        ctx.compaction_events_path = Some(events);
        ctx.transcript_dir = Some(dir.path().to_path_buf());

        let outcome = run(
            CompactionChecker::new(CompactionConfig::default()),
            "compaction-context",
            &ctx,
        )
        .unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.diagnostic.unwrap()["security_violation"], true);
    }

    #[test]
    fn test_compaction_checker_without_events_passes() {
        let dir = TempDir::new().unwrap();
        let mut ctx = SessionContext::new("s", dir.path().join("t.jsonl"), dir.path());
        ctx.compaction_events_path = Some(dir.path().join("missing.json"));
        ctx.transcript_dir = Some(dir.path().to_path_buf());

        let outcome = run(
            CompactionChecker::new(CompactionConfig::default()),
            "compaction-context",
            &ctx,
        )
        .unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.message, "no compaction data");
    }
}
