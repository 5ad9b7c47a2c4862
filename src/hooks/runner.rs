//! Hook runner for stopgate.
//!
//! This module implements hook dispatch. The host calls the stop hook each
//! time the agent tries to end its turn; every failure path approves.
//! Subagent stops are approved without evaluation and never touch the
//! parent session's turn state.

use std::io::{self, Read};

use crate::config::Config;
use crate::considerations::{load_considerations, CheckerRegistry, Consideration, SessionContext};
use crate::core::gate::SessionGate;
use crate::core::verdict::Verdict;
use crate::error::{GateError, Result};
use crate::hooks::input::{parse_input, StopInput};
use crate::hooks::output::{to_json, StopOutput};
use crate::storage::TurnStateStore;

/// Hook type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    /// The main agent is trying to stop.
    Stop,
    /// A subagent is trying to stop.
    SubagentStop,
}

impl HookType {
    /// Parse hook type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stop" => Some(Self::Stop),
            "subagent-stop" | "subagentstop" | "subagent_stop" => Some(Self::SubagentStop),
            _ => None,
        }
    }
}

/// Hook runner context.
pub struct HookRunner<S: TurnStateStore> {
    /// Turn state storage.
    store: S,
    /// Configuration.
    config: Config,
    /// Battery override; loaded from the hook's cwd when `None`.
    considerations: Option<Vec<Consideration>>,
}

impl<S: TurnStateStore> HookRunner<S> {
    /// Create a new hook runner.
    pub fn new(store: S, config: Config) -> Self {
        Self {
            store,
            config,
            considerations: None,
        }
    }

    /// Use a fixed battery instead of loading one per invocation.
    pub fn with_considerations(mut self, considerations: Vec<Consideration>) -> Self {
        self.considerations = Some(considerations);
        self
    }

    /// Run a hook with input from stdin.
    pub fn run(&self, hook_type: HookType) -> Result<String> {
        let input = read_stdin()?;
        self.run_with_input(hook_type, &input)
    }

    /// Run a hook with provided input.
    pub fn run_with_input(&self, hook_type: HookType, input: &str) -> Result<String> {
        match hook_type {
            HookType::Stop => self.handle_stop(input),
            HookType::SubagentStop => self.handle_subagent_stop(input),
        }
    }

    /// Evaluate a stop attempt and return the full verdict.
    pub fn evaluate_stop(&self, input: &str) -> Verdict {
        let stop_input: StopInput = match parse_input(input) {
            Ok(i) => i,
            Err(e) => {
                tracing::warn!("{} (fail-open: approving)", e);
                return Verdict::fail_open(format!("stopgate: {} (fail-open)", e));
            }
        };

        if stop_input.stop_hook_active {
            tracing::debug!(
                session_id = %stop_input.common.session_id,
                "stop hook re-entered after an earlier block"
            );
        }

        let considerations = self
            .considerations
            .clone()
            .unwrap_or_else(|| self.load_battery(&stop_input));

        let ctx: SessionContext = stop_input.into();
        let gate = SessionGate::new(&self.store, self.config.clone(), considerations);
        gate.evaluate(&ctx)
    }

    fn load_battery(&self, input: &StopInput) -> Vec<Consideration> {
        let registry = CheckerRegistry::with_builtins(&self.config);
        let loaded = load_considerations(&input.common.cwd, &registry);
        if !loaded.rejected.is_empty() {
            tracing::warn!(
                rejected = loaded.rejected.len(),
                "some considerations were rejected; run `stopgate considerations` for details"
            );
        }
        loaded.considerations
    }

    fn handle_stop(&self, input: &str) -> Result<String> {
        let verdict = self.evaluate_stop(input);
        to_json(&StopOutput::from(&verdict))
    }

    /// A subagent shares its parent's session id but not its to-do list or
    /// CI state, so its stop is not gated.
    fn handle_subagent_stop(&self, input: &str) -> Result<String> {
        match parse_input::<StopInput>(input) {
            Ok(i) => tracing::debug!(
                session_id = %i.common.session_id,
                "subagent stop approved without evaluation"
            ),
            Err(e) => tracing::debug!("subagent stop with unreadable input: {}", e),
        }
        to_json(&StopOutput::approve())
    }
}

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| GateError::storage("stdin", e))?;
    Ok(input)
}
