//! Session completion gate.
//!
//! Orchestrates one stop attempt: run the consideration battery, aggregate
//! the results, consult the session's history for loops, persist the new
//! history and return a verdict.
//!
//! ```text
//! RUNNING -> AGGREGATING -> APPROVED
//!                        -> CHECKING_LOOP -> FORCED_APPROVAL
//!                                         -> BLOCKED
//! ```

use std::time::Instant;

use crate::config::Config;
use crate::considerations::{
    Consideration, ConsiderationResult, ConsiderationRunner, Deadlines, SessionContext,
};
use crate::core::breaker::{self, ForceTrigger};
use crate::core::fingerprint;
use crate::core::state::TurnState;
use crate::core::verdict::{StopDecision, Verdict};
use crate::error::FailOpen;
use crate::storage::TurnStateStore;

/// Decides whether a session may stop.
#[derive(Debug)]
pub struct SessionGate<S: TurnStateStore> {
    store: S,
    config: Config,
    considerations: Vec<Consideration>,
    runner: ConsiderationRunner,
}

impl<S: TurnStateStore> SessionGate<S> {
    /// Create a gate over a loaded battery.
    pub fn new(store: S, config: Config, considerations: Vec<Consideration>) -> Self {
        let runner = ConsiderationRunner::from_config(&config);
        Self {
            store,
            config,
            considerations,
            runner,
        }
    }

    pub fn considerations(&self) -> &[Consideration] {
        &self.considerations
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Evaluate a stop attempt with deadlines starting now.
    pub fn evaluate(&self, ctx: &SessionContext) -> Verdict {
        let deadlines = Deadlines::from_timeouts(&self.config.timeouts, Instant::now());
        self.evaluate_until(ctx, &deadlines)
    }

    /// Evaluate a stop attempt under explicit deadlines.
    ///
    /// Never fails. State is saved once, after aggregation, while holding
    /// the session lock.
    pub fn evaluate_until(&self, ctx: &SessionContext, deadlines: &Deadlines) -> Verdict {
        if ctx.session_id.trim().is_empty() {
            tracing::warn!("stop attempt without a session id (fail-open: approving)");
            return Verdict::fail_open("approved: no session id supplied");
        }

        // RUNNING
        let results = self.runner.run_until(&self.considerations, ctx, deadlines);

        // AGGREGATING
        let security_violation = results.iter().any(ConsiderationResult::is_security_flagged);
        if security_violation {
            tracing::warn!(
                session_id = %ctx.session_id,
                "a checker refused an out-of-bounds path"
            );
        }
        let synthesized = results.iter().filter(|r| r.is_synthesized()).count();
        let (blockers, warnings): (Vec<_>, Vec<_>) = results
            .into_iter()
            .filter(|r| !r.passed)
            .partition(|r| r.is_failing_blocker());

        tracing::debug!(
            session_id = %ctx.session_id,
            blockers = blockers.len(),
            warnings = warnings.len(),
            synthesized,
            host_remaining_ms = deadlines.host_remaining().as_millis() as u64,
            "considerations aggregated"
        );

        let _lock = self.store.lock(&ctx.session_id);
        let mut state = self.store.load(&ctx.session_id);

        if blockers.is_empty() {
            // APPROVED
            state.record_approval();
            self.persist(&state);
            let diagnostic_summary = approval_summary(&warnings, synthesized);
            return Verdict {
                decision: StopDecision::Approve,
                blockers,
                warnings,
                diagnostic_summary,
                forced: false,
                force_trigger: None,
                fingerprint: None,
                turn_count: state.turn_count,
                security_violation,
            };
        }

        // CHECKING_LOOP
        let failed_ids: Vec<&str> = blockers.iter().map(|r| r.consideration_id.as_str()).collect();
        let fp = fingerprint::generate(&failed_ids);
        let trigger = breaker::evaluate(
            &state,
            &fp,
            self.config.gate.max_consecutive_blocks,
            self.config.gate.loop_repeat_threshold,
        );

        state.record_failure(fp.clone());
        self.persist(&state);

        match trigger {
            Some(trigger) => {
                // FORCED_APPROVAL
                tracing::warn!(
                    session_id = %ctx.session_id,
                    fingerprint = %fp,
                    "{}",
                    trigger.describe()
                );
                let diagnostic_summary = forced_summary(&trigger, &blockers, &self.considerations);
                Verdict {
                    decision: StopDecision::Approve,
                    blockers,
                    warnings,
                    diagnostic_summary,
                    forced: true,
                    force_trigger: Some(trigger),
                    fingerprint: Some(fp),
                    turn_count: state.turn_count,
                    security_violation,
                }
            }
            None => {
                // BLOCKED
                tracing::debug!(
                    session_id = %ctx.session_id,
                    fingerprint = %fp,
                    consecutive_blocks = state.consecutive_blocks,
                    "stop blocked"
                );
                let diagnostic_summary = block_summary(&blockers, &warnings, &self.considerations);
                Verdict {
                    decision: StopDecision::Block,
                    blockers,
                    warnings,
                    diagnostic_summary,
                    forced: false,
                    force_trigger: None,
                    fingerprint: Some(fp),
                    turn_count: state.turn_count,
                    security_violation,
                }
            }
        }
    }

    fn persist(&self, state: &TurnState) {
        self.store
            .save(state)
            .fail_open_default(&format!("failed to save turn state for {}", state.session_id));
    }
}

fn question_for<'a>(id: &str, considerations: &'a [Consideration]) -> Option<&'a str> {
    considerations
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.question.as_str())
}

fn list_results(
    out: &mut String,
    results: &[ConsiderationResult],
    considerations: &[Consideration],
) {
    for r in results {
        match question_for(&r.consideration_id, considerations) {
            Some(q) => out.push_str(&format!("\n- [{}] {} {}", r.consideration_id, q, r.message)),
            None => out.push_str(&format!("\n- [{}] {}", r.consideration_id, r.message)),
        }
    }
}

fn approval_summary(warnings: &[ConsiderationResult], synthesized: usize) -> String {
    let mut out = String::from("All blocking considerations passed.");
    if synthesized > 0 {
        out.push_str(&format!(
            " {} check(s) could not run and were treated as passing.",
            synthesized
        ));
    }
    if !warnings.is_empty() {
        out.push_str(&format!("\nWarnings ({}):", warnings.len()));
        for w in warnings {
            out.push_str(&format!("\n- [{}] {}", w.consideration_id, w.message));
        }
    }
    out
}

fn block_summary(
    blockers: &[ConsiderationResult],
    warnings: &[ConsiderationResult],
    considerations: &[Consideration],
) -> String {
    let mut out = format!("Stop blocked: {} unresolved blocker(s).", blockers.len());
    list_results(&mut out, blockers, considerations);
    if !warnings.is_empty() {
        out.push_str(&format!("\nWarnings ({}):", warnings.len()));
        list_results(&mut out, warnings, considerations);
    }
    out.push_str("\nNext steps: resolve the blockers above, then try to stop again.");
    out
}

fn forced_summary(
    trigger: &ForceTrigger,
    blockers: &[ConsiderationResult],
    considerations: &[Consideration],
) -> String {
    let mut out = format!(
        "Stop approved despite unresolved blockers ({}).\nUnresolved:",
        trigger.describe()
    );
    list_results(&mut out, blockers, considerations);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::considerations::test_support::{consideration, FixedChecker};
    use crate::considerations::{CheckOutcome, Checker, Severity};
    use crate::error::Result;
    use crate::storage::{FileTurnStateStore, MemoryTurnStateStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Checker whose answer can be flipped between attempts.
    struct Toggle(AtomicBool);

    impl Toggle {
        fn new(pass: bool) -> Arc<Self> {
            Arc::new(Self(AtomicBool::new(pass)))
        }
        fn set(&self, pass: bool) {
            self.0.store(pass, Ordering::SeqCst);
        }
    }

    impl Checker for Toggle {
        fn check(&self, c: &Consideration, _ctx: &SessionContext) -> Result<CheckOutcome> {
            Ok(if self.0.load(Ordering::SeqCst) {
                CheckOutcome::pass("ok")
            } else {
                CheckOutcome::fail(format!("{} failing", c.id))
            })
        }
    }

    struct Flagged;

    impl Checker for Flagged {
        fn check(&self, _c: &Consideration, _ctx: &SessionContext) -> Result<CheckOutcome> {
            Ok(CheckOutcome::pass("refused path")
                .with_diagnostic(json!({"security_violation": true})))
        }
    }

    fn config(max_blocks: u32, threshold: u32) -> Config {
        let mut config = Config::default();
        config.gate.max_consecutive_blocks = max_blocks;
        config.gate.loop_repeat_threshold = threshold;
        config
    }

    fn ctx() -> SessionContext {
        SessionContext::new("s-1", "/tmp/t.jsonl", "/tmp")
    }

    #[test]
    fn test_all_passing_approves() {
        let battery = vec![
            consideration("a", Severity::Blocker, Arc::new(FixedChecker(true))),
            consideration("w", Severity::Warning, Arc::new(FixedChecker(false))),
        ];
        let gate = SessionGate::new(MemoryTurnStateStore::new(), config(10, 3), battery);

        let verdict = gate.evaluate(&ctx());

        assert!(verdict.is_approved());
        assert!(!verdict.forced);
        assert!(verdict.blockers.is_empty());
        assert_eq!(verdict.warnings.len(), 1);
        assert_eq!(verdict.turn_count, 1);
        assert!(verdict.diagnostic_summary.contains("Warnings"));
    }

    #[test]
    fn test_approval_is_idempotent_on_history() {
        let battery = vec![consideration("a", Severity::Blocker, Arc::new(FixedChecker(true)))];
        let gate = SessionGate::new(MemoryTurnStateStore::new(), config(10, 3), battery);

        gate.evaluate(&ctx());
        gate.evaluate(&ctx());

        let state = gate.store().load("s-1");
        assert_eq!(state.consecutive_blocks, 0);
        assert!(state.failure_fingerprints.is_empty());
        assert_eq!(state.turn_count, 2);
    }

    #[test]
    fn test_failing_blocker_blocks_with_guidance() {
        let battery = vec![consideration(
            "ci-passing",
            Severity::Blocker,
            Arc::new(FixedChecker(false)),
        )];
        let gate = SessionGate::new(MemoryTurnStateStore::new(), config(10, 3), battery);

        let verdict = gate.evaluate(&ctx());

        assert_eq!(verdict.decision, StopDecision::Block);
        assert_eq!(verdict.blocker_ids(), vec!["ci-passing"]);
        let expected = fingerprint::generate(&["ci-passing"]);
        assert_eq!(verdict.fingerprint.as_deref(), Some(expected.as_str()));
        assert!(verdict.diagnostic_summary.contains("Is ci-passing satisfied?"));
        assert!(verdict.diagnostic_summary.contains("Next steps"));

        let state = gate.store().load("s-1");
        assert_eq!(state.consecutive_blocks, 1);
        assert_eq!(state.failure_fingerprints.len(), 1);
    }

    #[test]
    fn test_loop_detected_on_third_identical_failure() {
        let battery = vec![consideration(
            "todos",
            Severity::Blocker,
            Arc::new(FixedChecker(false)),
        )];
        let gate = SessionGate::new(MemoryTurnStateStore::new(), config(10, 3), battery);

        assert_eq!(gate.evaluate(&ctx()).decision, StopDecision::Block);
        assert_eq!(gate.evaluate(&ctx()).decision, StopDecision::Block);

        let third = gate.evaluate(&ctx());
        assert!(third.is_approved());
        assert!(third.forced);
        assert!(matches!(
            third.force_trigger,
            Some(ForceTrigger::RepeatedFailure { occurrences: 3, threshold: 3 })
        ));
        assert!(third.diagnostic_summary.contains("loop detected"));
        assert!(third.diagnostic_summary.contains("[todos]"));

        // Forced approval still records history
        let state = gate.store().load("s-1");
        assert_eq!(state.failure_fingerprints.len(), 3);
        assert_eq!(state.consecutive_blocks, 3);
    }

    #[test]
    fn test_circuit_breaker_ceiling() {
        let a = Toggle::new(false);
        let b = Toggle::new(false);
        let battery = vec![
            consideration("a", Severity::Blocker, a.clone()),
            consideration("b", Severity::Blocker, b.clone()),
        ];
        // Threshold high enough that only the ceiling can fire
        let gate = SessionGate::new(MemoryTurnStateStore::new(), config(3, 100), battery);

        for i in 0..3 {
            // Alternate the failing set so fingerprints differ
            a.set(i % 2 == 0);
            b.set(i % 2 == 1);
            assert_eq!(gate.evaluate(&ctx()).decision, StopDecision::Block);
        }

        let verdict = gate.evaluate(&ctx());
        assert!(verdict.forced);
        assert!(matches!(
            verdict.force_trigger,
            Some(ForceTrigger::ConsecutiveBlocks { blocks: 3, max: 3 })
        ));
    }

    #[test]
    fn test_approval_resets_consecutive_blocks() {
        let toggle = Toggle::new(false);
        let battery = vec![consideration("a", Severity::Blocker, toggle.clone())];
        let gate = SessionGate::new(MemoryTurnStateStore::new(), config(10, 3), battery);

        gate.evaluate(&ctx());
        toggle.set(true);
        assert!(gate.evaluate(&ctx()).is_approved());

        let state = gate.store().load("s-1");
        assert_eq!(state.consecutive_blocks, 0);
        assert_eq!(state.failure_fingerprints.len(), 1);
        assert_eq!(state.turn_count, 2);
    }

    #[test]
    fn test_security_violation_surfaces_in_verdict() {
        let battery = vec![consideration("compaction", Severity::Blocker, Arc::new(Flagged))];
        let gate = SessionGate::new(MemoryTurnStateStore::new(), config(10, 3), battery);

        let verdict = gate.evaluate(&ctx());
        assert!(verdict.is_approved());
        assert!(verdict.security_violation);
    }

    #[test]
    fn test_missing_session_id_fails_open() {
        let battery = vec![consideration("a", Severity::Blocker, Arc::new(FixedChecker(false)))];
        let gate = SessionGate::new(MemoryTurnStateStore::new(), config(10, 3), battery);

        let verdict = gate.evaluate(&SessionContext::new("", "/t", "/"));
        assert!(verdict.is_approved());
        assert!(gate.store().is_empty());
    }

    #[test]
    fn test_history_survives_process_restart() {
        let dir = TempDir::new().unwrap();
        let battery = || {
            let checker: Arc<dyn Checker> = Arc::new(FixedChecker(false));
            vec![consideration("a", Severity::Blocker, checker)]
        };

        for _ in 0..2 {
            let store = FileTurnStateStore::with_dir(dir.path()).unwrap();
            let gate = SessionGate::new(store, config(10, 3), battery());
            assert_eq!(gate.evaluate(&ctx()).decision, StopDecision::Block);
        }

        let store = FileTurnStateStore::with_dir(dir.path()).unwrap();
        let gate = SessionGate::new(store, config(10, 3), battery());
        assert!(gate.evaluate(&ctx()).forced);
    }
}
