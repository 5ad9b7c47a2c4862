//! In-memory turn state storage for testing.
//!
//! This module provides a thread-safe in-memory implementation of the
//! TurnStateStore trait, primarily for use in unit tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::core::TurnState;
use crate::error::Result;
use crate::storage::TurnStateStore;

/// In-memory turn state store for testing.
///
/// Thread-safe implementation using `RwLock<HashMap>`.
/// States are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryTurnStateStore {
    states: RwLock<HashMap<String, TurnState>>,
}

impl MemoryTurnStateStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of sessions in the store.
    pub fn len(&self) -> usize {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TurnStateStore for MemoryTurnStateStore {
    fn load(&self, session_id: &str) -> TurnState {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| TurnState::new(session_id))
    }

    fn save(&self, state: &TurnState) -> Result<()> {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = states.get(&state.session_id) {
            if state.turn_count < previous.turn_count {
                tracing::warn!(
                    session_id = %state.session_id,
                    turn_count = state.turn_count,
                    last_seen = previous.turn_count,
                    "turn_count went backwards on save (possible state corruption, continuing)"
                );
            }
        }
        states.insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<TurnState>> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        let mut result: Vec<TurnState> = states.values().cloned().collect();

        // Most recent first
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        result.truncate(limit);

        Ok(result)
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        Ok(())
    }

    fn contains(&self, session_id: &str) -> bool {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }
}
