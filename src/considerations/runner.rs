//! Concurrent consideration execution under nested deadlines.
//!
//! Every enabled consideration runs on tokio's blocking pool inside a
//! short-lived current-thread runtime. Each checker gets its own deadline,
//! capped by the shared parallel deadline, which in turn sits inside the
//! host's deadline. Anything that doesn't come back in time is reported as
//! a synthesized pass, and the runtime is shut down in the background so a
//! stuck checker can never hold up the verdict.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::config::{Config, TimeoutConfig};
use crate::considerations::{Consideration, ConsiderationResult, SessionContext};

/// The three nested deadlines of one stop attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// Budget for a single checker.
    pub checker: Duration,
    /// When every checker must have finished.
    pub parallel: Instant,
    /// When the host gives up on the gate.
    pub host: Instant,
}

impl Deadlines {
    /// Deadlines measured from `start`.
    ///
    /// The parallel deadline never exceeds the host deadline.
    pub fn from_timeouts(timeouts: &TimeoutConfig, start: Instant) -> Self {
        let host = start + timeouts.host();
        let parallel = (start + timeouts.parallel()).min(host);
        Self {
            checker: timeouts.checker(),
            parallel,
            host,
        }
    }

    /// Deadline for a checker starting at `now`.
    pub fn checker_deadline(&self, now: Instant) -> Instant {
        (now + self.checker).min(self.parallel)
    }

    /// Time left before the host deadline.
    pub fn host_remaining(&self) -> Duration {
        self.host.saturating_duration_since(Instant::now())
    }
}

/// Runs a consideration battery.
#[derive(Debug, Clone)]
pub struct ConsiderationRunner {
    timeouts: TimeoutConfig,
}

impl ConsiderationRunner {
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self { timeouts }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.timeouts.clone())
    }

    /// Run every enabled consideration with deadlines starting now.
    pub fn run(
        &self,
        considerations: &[Consideration],
        ctx: &SessionContext,
    ) -> Vec<ConsiderationResult> {
        let deadlines = Deadlines::from_timeouts(&self.timeouts, Instant::now());
        self.run_until(considerations, ctx, &deadlines)
    }

    /// Run every enabled consideration under the given deadlines.
    ///
    /// Returns one result per enabled consideration, in configuration
    /// order. Never fails and never waits past `deadlines.parallel`.
    pub fn run_until(
        &self,
        considerations: &[Consideration],
        ctx: &SessionContext,
        deadlines: &Deadlines,
    ) -> Vec<ConsiderationResult> {
        let enabled: Vec<Consideration> = considerations
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        if enabled.is_empty() {
            return Vec::new();
        }

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!("failed to start checker runtime: {} (fail-open)", e);
                return enabled
                    .iter()
                    .map(|c| {
                        let detail = format!("runtime unavailable: {}", e);
                        ConsiderationResult::synthesized(c, "error", detail)
                    })
                    .collect();
            }
        };

        let ctx = Arc::new(ctx.clone());
        let mut slots: Vec<Option<ConsiderationResult>> = vec![None; enabled.len()];

        runtime.block_on(async {
            let mut tasks = JoinSet::new();

            for (idx, consideration) in enabled.iter().cloned().enumerate() {
                let ctx = Arc::clone(&ctx);
                let deadline =
                    tokio::time::Instant::from_std(deadlines.checker_deadline(Instant::now()));
                let budget = deadlines.checker;

                tasks.spawn(async move {
                    let for_check = consideration.clone();
                    let handle = tokio::task::spawn_blocking(move || {
                        for_check.checker.check(&for_check, &ctx)
                    });

                    let result = match tokio::time::timeout_at(deadline, handle).await {
                        Ok(Ok(Ok(outcome))) => {
                            ConsiderationResult::from_outcome(&consideration, outcome)
                        }
                        Ok(Ok(Err(e))) => {
                            tracing::warn!(
                                consideration = %consideration.id,
                                "checker failed: {} (fail-open)",
                                e
                            );
                            ConsiderationResult::synthesized(&consideration, "error", e.to_string())
                        }
                        Ok(Err(join_err)) => {
                            tracing::warn!(
                                consideration = %consideration.id,
                                "checker panicked: {} (fail-open)",
                                join_err
                            );
                            let detail = join_err.to_string();
                            ConsiderationResult::synthesized(&consideration, "panic", detail)
                        }
                        Err(_) => {
                            tracing::warn!(
                                consideration = %consideration.id,
                                budget_secs = budget.as_secs_f64(),
                                "checker timed out (fail-open)"
                            );
                            ConsiderationResult::synthesized(
                                &consideration,
                                "timeout",
                                format!("no answer within {:.1}s", budget.as_secs_f64()),
                            )
                        }
                    };
                    (idx, result)
                });
            }

            let parallel = tokio::time::Instant::from_std(deadlines.parallel);
            loop {
                match tokio::time::timeout_at(parallel, tasks.join_next()).await {
                    Ok(Some(Ok((idx, result)))) => slots[idx] = Some(result),
                    Ok(Some(Err(e))) => {
                        tracing::warn!("checker task failed: {} (fail-open)", e);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(
                            pending = tasks.len(),
                            "parallel deadline reached; abandoning checkers"
                        );
                        break;
                    }
                }
            }
            tasks.abort_all();
        });

        // Blocking checker threads may still be running; don't wait for them.
        runtime.shutdown_background();

        enabled
            .iter()
            .zip(slots)
            .map(|(consideration, slot)| {
                slot.unwrap_or_else(|| {
                    ConsiderationResult::synthesized(
                        consideration,
                        "abandoned",
                        "parallel deadline reached",
                    )
                })
            })
            .collect()
    }
}
