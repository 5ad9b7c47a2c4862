//! stopgate - Session Completion Gate for coding agents
//!
//! stopgate decides whether an autonomous coding agent may end its turn.
//! Each stop attempt runs a battery of considerations; failing blockers
//! keep the agent working, while a loop detector and circuit breaker force
//! an approval when the agent is stuck. Every internal failure approves.

pub mod cli;
pub mod compaction;
pub mod config;
pub mod considerations;
pub mod core;
pub mod error;
pub mod hooks;
pub mod storage;
pub mod transcript;
pub mod util;

pub use compaction::{CompactionEvent, CompactionValidator, ValidationResult};
pub use config::Config;
pub use considerations::{
    CheckOutcome, Checker, CheckerRegistry, Consideration, ConsiderationResult,
    ConsiderationRunner, SessionContext, Severity,
};
pub use core::{ForceTrigger, SessionGate, StopDecision, TurnState, Verdict};
pub use error::{GateError, Result};
pub use storage::{FileTurnStateStore, MemoryTurnStateStore, TurnStateStore};
pub use transcript::Transcript;

// CLI commands
pub use cli::{ConsiderationsCommand, DebugCommand, SessionsCommand};
