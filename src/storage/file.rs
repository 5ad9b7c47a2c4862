//! File-based turn state storage for stopgate.
//!
//! Each session is one JSON file in `~/.stopgate/sessions/`, with a `.lock`
//! sidecar for the advisory lock. File names are the sanitized session id
//! plus a short hash of the raw id, so ids that sanitize alike stay apart.
//! Writes go to a temp file in the same directory, are synced, then renamed
//! over the target, so a reader never sees a partially written record.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::config::{sessions_dir, StorageConfig};
use crate::core::TurnState;
use crate::error::{GateError, Result};
use crate::storage::{SessionLock, TurnStateStore};
use crate::util::{read_to_string_limited, sanitize_file_component};

/// File-based turn state storage.
#[derive(Debug)]
pub struct FileTurnStateStore {
    /// Directory where state files are stored.
    sessions_dir: PathBuf,
    /// How long to poll for a session lock.
    lock_timeout: Duration,
    /// Highest turn_count this process has observed per session.
    seen_turns: Mutex<HashMap<String, u64>>,
}

impl FileTurnStateStore {
    /// Create a store in the default directory.
    ///
    /// Uses `~/.stopgate/sessions/` or `$STOPGATE_HOME/sessions/`.
    pub fn new() -> Result<Self> {
        let dir = sessions_dir().ok_or_else(|| {
            GateError::config("Could not determine sessions directory (no home directory)")
        })?;
        Self::with_dir(dir)
    }

    /// Create a store in a custom directory, creating it if needed.
    pub fn with_dir(sessions_dir: impl Into<PathBuf>) -> Result<Self> {
        let sessions_dir = sessions_dir.into();

        if !sessions_dir.exists() {
            fs::create_dir_all(&sessions_dir).map_err(|e| GateError::storage(&sessions_dir, e))?;
        }

        Ok(Self {
            sessions_dir,
            lock_timeout: StorageConfig::default().lock_timeout(),
            seen_turns: Mutex::new(HashMap::new()),
        })
    }

    /// Override the lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Directory holding the state files.
    pub fn dir(&self) -> &std::path::Path {
        &self.sessions_dir
    }

    /// Get the path for a session's state file.
    fn state_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.json", file_stem(session_id)))
    }

    /// Get the path for a session's lock file.
    fn lock_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.lock", file_stem(session_id)))
    }

    /// Get the temp path used during an atomic write.
    ///
    /// The pid keeps two unlocked writers from sharing one temp file.
    fn temp_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!(
            ".{}.{}.json.tmp",
            file_stem(session_id),
            std::process::id()
        ))
    }

    /// Write a state atomically using temp file + sync + rename.
    fn atomic_write(&self, state: &TurnState) -> Result<()> {
        let final_path = self.state_path(&state.session_id);
        let temp_path = self.temp_path(&state.session_id);

        let json = serde_json::to_string_pretty(state)?;

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| GateError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| GateError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| GateError::storage(&temp_path, e))?;
        }

        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(GateError::storage(&final_path, e));
        }

        // Persist the rename itself; best effort where directories can't be opened
        #[cfg(unix)]
        if let Ok(dir) = fs::File::open(&self.sessions_dir) {
            let _ = dir.sync_all();
        }

        Ok(())
    }

    /// Compare a turn_count against the highest one seen for the session
    /// and remember the larger.
    fn observe_turn_count(&self, session_id: &str, turn_count: u64, context: &str) {
        let mut seen = self
            .seen_turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = seen.entry(session_id.to_string()).or_insert(turn_count);
        if turn_count < *entry {
            tracing::warn!(
                session_id,
                turn_count,
                last_seen = *entry,
                "turn_count went backwards on {} (possible state corruption, continuing)",
                context
            );
        } else {
            *entry = turn_count;
        }
    }

    /// Move an unparsable state file aside so it can be inspected later.
    fn quarantine(&self, session_id: &str) {
        let path = self.state_path(session_id);
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let target = self.sessions_dir.join(format!(
            "{}.corrupt-{}",
            file_stem(session_id),
            stamp
        ));
        if let Err(e) = fs::rename(&path, &target) {
            tracing::warn!(path = %path.display(), "failed to quarantine corrupt state: {}", e);
        }
    }
}

/// Hex characters of the id hash kept in a file name.
const ID_HASH_LEN: usize = 12;

/// File name stem for a session: readable prefix plus a hash of the raw id.
fn file_stem(session_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(session_id.as_bytes()));
    format!(
        "{}-{}",
        sanitize_file_component(session_id),
        &digest[..ID_HASH_LEN]
    )
}

impl TurnStateStore for FileTurnStateStore {
    fn load(&self, session_id: &str) -> TurnState {
        let path = self.state_path(session_id);

        if !path.exists() {
            let state = TurnState::new(session_id);
            self.observe_turn_count(session_id, state.turn_count, "load");
            return state;
        }

        let parsed = read_to_string_limited(&path).and_then(|content| {
            serde_json::from_str::<TurnState>(&content).map_err(GateError::from)
        });

        let state = match parsed {
            Ok(state) if state.session_id != session_id => {
                tracing::warn!(
                    session_id,
                    stored = %state.session_id,
                    "turn state file belongs to a different session (starting fresh)"
                );
                TurnState::new(session_id)
            }
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    session_id,
                    path = %path.display(),
                    "corrupt turn state: {} (fail-open: starting fresh)",
                    e
                );
                self.quarantine(session_id);
                TurnState::new(session_id)
            }
        };

        self.observe_turn_count(session_id, state.turn_count, "load");
        state
    }

    fn save(&self, state: &TurnState) -> Result<()> {
        self.observe_turn_count(&state.session_id, state.turn_count, "save");
        self.atomic_write(state)
    }

    fn list(&self, limit: usize) -> Result<Vec<TurnState>> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut states: Vec<(TurnState, std::time::SystemTime)> = Vec::new();

        let entries = fs::read_dir(&self.sessions_dir)
            .map_err(|e| GateError::storage(&self.sessions_dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| GateError::storage(&self.sessions_dir, e))?;
            let path = entry.path();

            // Skip non-JSON files and temp files
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true)
            {
                continue;
            }

            if let Ok(content) = read_to_string_limited(&path) {
                if let Ok(state) = serde_json::from_str::<TurnState>(&content) {
                    let mtime = entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                    states.push((state, mtime));
                }
            }
        }

        states.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.updated_at.cmp(&a.0.updated_at)));

        Ok(states.into_iter().take(limit).map(|(s, _)| s).collect())
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.state_path(session_id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| GateError::storage(&path, e))?;
        }

        let temp_path = self.temp_path(session_id);
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }
        let lock_path = self.lock_path(session_id);
        if lock_path.exists() {
            let _ = fs::remove_file(&lock_path);
        }

        self.seen_turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);

        Ok(())
    }

    fn contains(&self, session_id: &str) -> bool {
        self.state_path(session_id).exists()
    }

    fn lock(&self, session_id: &str) -> SessionLock {
        SessionLock::acquire(&self.lock_path(session_id), self.lock_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::test_turn_state_store_crud;
    use tempfile::TempDir;

    fn create_test_store() -> (FileTurnStateStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileTurnStateStore::with_dir(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_file_store_crud() {
        let (store, _dir) = create_test_store();
        test_turn_state_store_crud(&store);
    }

    #[test]
    fn test_with_dir_creates_directory() {
        let dir = TempDir::new().unwrap();
        let sessions_path = dir.path().join("sessions");
        assert!(!sessions_path.exists());

        let _store = FileTurnStateStore::with_dir(&sessions_path).unwrap();

        assert!(sessions_path.is_dir());
    }

    #[test]
    fn test_state_path_is_sanitized() {
        let (store, dir) = create_test_store();

        let path = store.state_path("../../escape");
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("_._.._escape-"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn test_ids_that_sanitize_alike_get_distinct_files() {
        let (store, _dir) = create_test_store();
        assert_ne!(store.state_path("team/a"), store.state_path("team_a"));
        assert_ne!(store.lock_path("team/a"), store.lock_path("team_a"));

        let mut state = TurnState::new("team/a");
        state.record_failure("aaaa");
        state.record_failure("aaaa");
        store.save(&state).unwrap();

        let other = store.load("team_a");
        assert_eq!(other.session_id, "team_a");
        assert_eq!(other.turn_count, 0);
        assert_eq!(other.consecutive_blocks, 0);
        assert!(!store.contains("team_a"));
        assert_eq!(store.load("team/a").consecutive_blocks, 2);
    }

    #[test]
    fn test_file_naming_another_session_loads_fresh() {
        let (store, _dir) = create_test_store();

        let mut state = TurnState::new("s-other");
        state.record_failure("aaaa");
        fs::write(
            store.state_path("s-1"),
            serde_json::to_string(&state).unwrap(),
        )
        .unwrap();

        let loaded = store.load("s-1");
        assert_eq!(loaded.session_id, "s-1");
        assert_eq!(loaded.turn_count, 0);
    }

    #[test]
    fn test_save_and_load() {
        let (store, _dir) = create_test_store();

        let mut state = TurnState::new("s-1");
        state.record_failure("aaaa");
        state.record_approval();
        store.save(&state).unwrap();

        let loaded = store.load("s-1");
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_corrupt_file_loads_fresh_and_is_quarantined() {
        let (store, dir) = create_test_store();
        let path = store.state_path("s-1");
        fs::write(&path, "{ not json").unwrap();

        let state = store.load("s-1");

        assert_eq!(state.turn_count, 0);
        assert!(!path.exists());
        let prefix = format!("{}.corrupt-", file_stem("s-1"));
        let quarantined = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with(&prefix));
        assert!(quarantined);
    }

    #[test]
    fn test_interrupted_write_leaves_previous_state_readable() {
        let (store, dir) = create_test_store();

        let mut state = TurnState::new("s-1");
        state.record_failure("aaaa");
        store.save(&state).unwrap();

        // Simulate a crash after temp-file creation but before rename
        let half_written = &serde_json::to_string(&state).unwrap()[..20];
        let temp_name = format!(".{}.99999.json.tmp", file_stem("s-1"));
        fs::write(dir.path().join(temp_name), half_written).unwrap();

        let reloaded = FileTurnStateStore::with_dir(dir.path()).unwrap();
        let loaded = reloaded.load("s-1");
        assert_eq!(loaded.turn_count, 1);
        assert_eq!(loaded.failure_fingerprints, vec!["aaaa"]);
    }

    #[test]
    fn test_temp_file_cleaned_up() {
        let (store, _dir) = create_test_store();

        store.save(&TurnState::new("s-temp")).unwrap();

        assert!(!store.temp_path("s-temp").exists());
    }

    #[test]
    fn test_saved_file_is_complete_json() {
        let (store, _dir) = create_test_store();

        let mut state = TurnState::new("s-json");
        state.record_failure("aaaa");
        store.save(&state).unwrap();

        let content = fs::read_to_string(store.state_path("s-json")).unwrap();
        let parsed: TurnState = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.session_id, "s-json");
    }

    #[test]
    fn test_backwards_turn_count_still_saves() {
        let (store, _dir) = create_test_store();

        let mut state = TurnState::new("s-1");
        state.record_failure("aaaa");
        state.record_failure("aaaa");
        store.save(&state).unwrap();

        // Non-monotonic write is logged, not refused
        let stale = TurnState::new("s-1");
        store.save(&stale).unwrap();
        assert_eq!(store.load("s-1").turn_count, 0);
    }

    #[test]
    fn test_list_ignores_temp_and_invalid_files() {
        let (store, dir) = create_test_store();

        store.save(&TurnState::new("valid")).unwrap();
        fs::write(dir.path().join(".valid.1.json.tmp"), "{}").unwrap();
        fs::write(dir.path().join("invalid.json"), "not valid json").unwrap();

        let states = store.list(10).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].session_id, "valid");
    }

    #[test]
    fn test_list_with_limit() {
        let (store, _dir) = create_test_store();

        for i in 0..5 {
            store.save(&TurnState::new(format!("s-{}", i))).unwrap();
        }

        assert_eq!(store.list(2).unwrap().len(), 2);
    }

    #[test]
    fn test_lock_is_exclusive_per_session() {
        let (store, _dir) = create_test_store();
        let store = store.with_lock_timeout(Duration::from_millis(100));

        let held = store.lock("s-1");
        assert!(held.is_held());

        let contended = store.lock("s-1");
        assert!(!contended.is_held());

        let other = store.lock("s-2");
        assert!(other.is_held());
    }

    #[test]
    fn test_delete_removes_lock_file() {
        let (store, _dir) = create_test_store();

        store.save(&TurnState::new("s-1")).unwrap();
        drop(store.lock("s-1"));
        assert!(store.lock_path("s-1").exists());

        store.delete("s-1").unwrap();

        assert!(!store.lock_path("s-1").exists());
        assert!(!store.contains("s-1"));
    }
}
