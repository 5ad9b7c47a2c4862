//! Core types and logic for stopgate.
//!
//! This module contains the turn state model, failure fingerprints, the
//! loop detector / circuit breaker and the session completion gate that
//! ties them together.

pub mod breaker;
pub mod fingerprint;
pub mod gate;
pub mod state;
pub mod verdict;

pub use breaker::{should_force_approve, ForceTrigger};
pub use gate::SessionGate;
pub use state::TurnState;
pub use verdict::{StopDecision, Verdict};
