//! Turn state storage traits for stopgate.
//!
//! This module defines the `TurnStateStore` trait for turn state persistence.

use std::sync::Arc;

use crate::core::TurnState;
use crate::error::Result;
use crate::storage::SessionLock;

/// Trait for turn state storage backends.
///
/// `load` never fails: a missing or unreadable record yields a fresh state.
/// `load` and `save` do not lock on their own; callers that read-modify-write
/// hold the guard returned by [`TurnStateStore::lock`] across both calls.
pub trait TurnStateStore: Send + Sync {
    /// Load the state for a session, or a fresh zero-valued state.
    fn load(&self, session_id: &str) -> TurnState;

    /// Persist a state, replacing any previous record for its session.
    fn save(&self, state: &TurnState) -> Result<()>;

    /// List stored states, most recently updated first.
    fn list(&self, limit: usize) -> Result<Vec<TurnState>>;

    /// Delete a session's state.
    ///
    /// Returns `Ok(())` even if the session doesn't exist.
    fn delete(&self, session_id: &str) -> Result<()>;

    /// Check whether a record exists for a session.
    fn contains(&self, session_id: &str) -> bool;

    /// Take the session's advisory lock, or an unlocked guard on timeout.
    fn lock(&self, _session_id: &str) -> SessionLock {
        SessionLock::unlocked()
    }
}

/// Blanket implementations for shared and borrowed stores, so one store can
/// serve a gate and CLI commands.
impl<T: TurnStateStore + ?Sized> TurnStateStore for Arc<T> {
    fn load(&self, session_id: &str) -> TurnState {
        (**self).load(session_id)
    }

    fn save(&self, state: &TurnState) -> Result<()> {
        (**self).save(state)
    }

    fn list(&self, limit: usize) -> Result<Vec<TurnState>> {
        (**self).list(limit)
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        (**self).delete(session_id)
    }

    fn contains(&self, session_id: &str) -> bool {
        (**self).contains(session_id)
    }

    fn lock(&self, session_id: &str) -> SessionLock {
        (**self).lock(session_id)
    }
}

impl<T: TurnStateStore + ?Sized> TurnStateStore for &T {
    fn load(&self, session_id: &str) -> TurnState {
        (**self).load(session_id)
    }

    fn save(&self, state: &TurnState) -> Result<()> {
        (**self).save(state)
    }

    fn list(&self, limit: usize) -> Result<Vec<TurnState>> {
        (**self).list(limit)
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        (**self).delete(session_id)
    }

    fn contains(&self, session_id: &str) -> bool {
        (**self).contains(session_id)
    }

    fn lock(&self, session_id: &str) -> SessionLock {
        (**self).lock(session_id)
    }
}

/// Test utilities for TurnStateStore implementations.
#[cfg(test)]
pub mod tests {
    use super::*;

    /// Conformance check shared by every store implementation.
    pub fn test_turn_state_store_crud<S: TurnStateStore>(store: &S) {
        // Missing sessions load as fresh state
        let fresh = store.load("test-session");
        assert_eq!(fresh.session_id, "test-session");
        assert_eq!(fresh.turn_count, 0);
        assert!(!store.contains("test-session"));

        let mut state = fresh;
        state.record_failure("0123456789abcdef");
        store.save(&state).unwrap();
        assert!(store.contains("test-session"));

        let loaded = store.load("test-session");
        assert_eq!(loaded.turn_count, 1);
        assert_eq!(loaded.consecutive_blocks, 1);
        assert_eq!(loaded.failure_fingerprints, vec!["0123456789abcdef"]);

        let listed = store.list(10).unwrap();
        assert!(listed.iter().any(|s| s.session_id == "test-session"));

        store.delete("test-session").unwrap();
        assert!(!store.contains("test-session"));
        assert_eq!(store.load("test-session").turn_count, 0);

        // Delete again should succeed
        store.delete("test-session").unwrap();
    }
}
