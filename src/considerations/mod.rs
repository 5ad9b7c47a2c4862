//! Considerations: the battery of checks run before a session may stop.
//!
//! A consideration pairs a question ("are all to-dos complete?") with a
//! named [`Checker`] that answers it. Only blocker-severity considerations
//! can deny a stop; warnings are reported alongside the verdict.

pub mod checkers;
pub mod config;
pub mod context;
pub mod registry;
pub mod runner;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;

pub use config::{
    default_considerations, load_considerations, parse_considerations, LoadedConsiderations,
};
pub use context::SessionContext;
pub use registry::CheckerRegistry;
pub use runner::{ConsiderationRunner, Deadlines};

/// How much weight a failing consideration carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Failing denies the stop.
    Blocker,
    /// Failing is reported but never denies the stop.
    Warning,
}

impl Severity {
    /// Parse severity from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blocker" => Some(Self::Blocker),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocker => "blocker",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The answer a checker gives for one consideration.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: String,
    pub diagnostic: Option<Value>,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            diagnostic: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: Value) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }
}

/// Answers one kind of consideration for a session.
///
/// Checkers run on a blocking thread under a deadline. An error or a panic
/// is treated as a pass, so implementations should return `Err` rather than
/// guess when their inputs are unusable.
pub trait Checker: Send + Sync {
    fn check(&self, consideration: &Consideration, ctx: &SessionContext) -> Result<CheckOutcome>;
}

/// A checker resolved from the registry, remembered by name.
#[derive(Clone)]
pub struct CheckerRef {
    name: String,
    checker: Arc<dyn Checker>,
}

impl CheckerRef {
    pub fn new(name: impl Into<String>, checker: Arc<dyn Checker>) -> Self {
        Self {
            name: name.into(),
            checker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(
        &self,
        consideration: &Consideration,
        ctx: &SessionContext,
    ) -> Result<CheckOutcome> {
        self.checker.check(consideration, ctx)
    }
}

impl fmt::Debug for CheckerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CheckerRef").field(&self.name).finish()
    }
}

impl Serialize for CheckerRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// A validated consideration, loaded once per process.
#[derive(Debug, Clone, Serialize)]
pub struct Consideration {
    /// Unique identifier, also the unit of failure fingerprints.
    pub id: String,
    pub category: String,
    /// The question shown to the agent when this consideration fails.
    pub question: String,
    pub severity: Severity,
    pub checker: CheckerRef,
    pub enabled: bool,
}

impl Consideration {
    pub fn is_blocker(&self) -> bool {
        self.severity == Severity::Blocker
    }
}

/// The outcome of one consideration for one stop attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsiderationResult {
    pub consideration_id: String,
    pub passed: bool,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Value>,
}

impl ConsiderationResult {
    pub fn from_outcome(consideration: &Consideration, outcome: CheckOutcome) -> Self {
        Self {
            consideration_id: consideration.id.clone(),
            passed: outcome.passed,
            severity: consideration.severity,
            message: outcome.message,
            diagnostic: outcome.diagnostic,
        }
    }

    /// A pass standing in for a checker that produced nothing usable.
    pub fn synthesized(
        consideration: &Consideration,
        reason: &str,
        detail: impl Into<String>,
    ) -> Self {
        let detail = detail.into();
        Self {
            consideration_id: consideration.id.clone(),
            passed: true,
            severity: consideration.severity,
            message: format!("check skipped ({}): {}", reason, detail),
            diagnostic: Some(serde_json::json!({
                "synthesized": true,
                "reason": reason,
                "detail": detail,
            })),
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.diagnostic
            .as_ref()
            .and_then(|d| d.get("synthesized"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the checker reported a refused, escaping path.
    pub fn is_security_flagged(&self) -> bool {
        self.diagnostic
            .as_ref()
            .and_then(|d| d.get("security_violation"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_failing_blocker(&self) -> bool {
        !self.passed && self.severity == Severity::Blocker
    }
}
