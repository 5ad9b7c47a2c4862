//! Configuration loading for stopgate.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.stopgate/config.toml`)
//! 3. User config (`~/.stopgate/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The gate runs with sensible defaults
//! when no config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GateError, Result};
use crate::util::sanitize_file_component;

/// Main configuration struct for stopgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Loop detection and circuit breaker thresholds.
    pub gate: GateConfig,
    /// The nested timeout hierarchy.
    pub timeouts: TimeoutConfig,
    /// Compaction validator settings.
    pub compaction: CompactionConfig,
    /// Turn state store settings.
    pub storage: StorageConfig,
}

/// Loop detection and circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Consecutive blocks after which the gate force-approves.
    pub max_consecutive_blocks: u32,
    /// Total occurrences of one failure fingerprint that force approval.
    pub loop_repeat_threshold: u32,
}

/// Minimum valid max_consecutive_blocks (0 would disable the gate entirely).
pub const MIN_MAX_CONSECUTIVE_BLOCKS: u32 = 1;

/// Minimum valid loop_repeat_threshold.
///
/// A threshold of 1 would force-approve the very first block.
pub const MIN_LOOP_REPEAT_THRESHOLD: u32 = 2;

impl GateConfig {
    /// Check if max_consecutive_blocks is valid.
    pub fn is_valid_max_consecutive_blocks(value: u32) -> bool {
        value >= MIN_MAX_CONSECUTIVE_BLOCKS
    }

    /// Check if loop_repeat_threshold is valid.
    pub fn is_valid_loop_repeat_threshold(value: u32) -> bool {
        value >= MIN_LOOP_REPEAT_THRESHOLD
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_consecutive_blocks: 10,
            loop_repeat_threshold: 3,
        }
    }
}

/// Timeout hierarchy: `checker < parallel < host`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on a single checker call, in seconds.
    pub checker_secs: u64,
    /// Bound on the whole concurrent checker batch, in seconds.
    pub parallel_secs: u64,
    /// The host runtime's own hook timeout, in seconds.
    pub host_secs: u64,
}

impl TimeoutConfig {
    /// Per-checker timeout.
    pub fn checker(&self) -> Duration {
        Duration::from_secs(self.checker_secs)
    }

    /// Outer parallel timeout.
    pub fn parallel(&self) -> Duration {
        Duration::from_secs(self.parallel_secs)
    }

    /// Host hook timeout.
    pub fn host(&self) -> Duration {
        Duration::from_secs(self.host_secs)
    }

    /// Whether the hierarchy is strictly nested and non-zero.
    pub fn is_nested(&self) -> bool {
        self.checker_secs > 0
            && self.checker_secs < self.parallel_secs
            && self.parallel_secs < self.host_secs
    }

    /// Repair a hierarchy that violates `checker < parallel < host`.
    ///
    /// The host timeout is authoritative because the gate cannot change it.
    /// Inner bounds are clamped beneath it.
    pub fn normalize(&mut self) {
        if self.is_nested() {
            return;
        }

        let before = self.clone();
        if self.host_secs < 3 {
            self.host_secs = TimeoutConfig::default().host_secs;
        }
        if self.parallel_secs == 0 || self.parallel_secs >= self.host_secs {
            self.parallel_secs = (self.host_secs / 2).max(2);
        }
        if self.checker_secs == 0 || self.checker_secs >= self.parallel_secs {
            self.checker_secs = (self.parallel_secs / 2).max(1);
        }

        tracing::warn!(
            checker = before.checker_secs,
            parallel = before.parallel_secs,
            host = before.host_secs,
            "timeout hierarchy must satisfy checker < parallel < host; using {}s < {}s < {}s",
            self.checker_secs,
            self.parallel_secs,
            self.host_secs
        );
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            checker_secs: 25,
            parallel_secs: 60,
            host_secs: 120,
        }
    }
}

/// Compaction validator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompactionConfig {
    /// Events older than this are still validated but reported as stale.
    pub freshness_hours: u32,
    /// How many trailing pre-compaction messages must survive.
    pub recent_messages: usize,
    /// Fraction of significant words that must survive for fuzzy matches.
    pub match_threshold: f64,
}

/// Minimum valid recent_messages (0 would skip the recent-message check).
pub const MIN_RECENT_MESSAGES: usize = 1;

impl CompactionConfig {
    /// Check if a match threshold is valid (finite and in (0.0, 1.0]).
    pub fn is_valid_match_threshold(value: f64) -> bool {
        value.is_finite() && value > 0.0 && value <= 1.0
    }

    /// Check if recent_messages is valid.
    pub fn is_valid_recent_messages(value: usize) -> bool {
        value >= MIN_RECENT_MESSAGES
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            freshness_hours: 24,
            recent_messages: 10,
            match_threshold: 0.6,
        }
    }
}

/// Turn state store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// How long to poll for the session lock before proceeding unlocked.
    pub lock_timeout_ms: u64,
}

impl StorageConfig {
    /// Lock acquisition timeout.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2000,
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        // Fail-open: if cwd is unavailable, skip the project layer
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config.timeouts.normalize();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();
        config.timeouts.normalize();

        config
    }

    /// Load user config from `~/.stopgate/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = stopgate_home()?;
        Self::load_optional(&home.join("config.toml"))
    }

    /// Load project config from `.stopgate/config.toml` under the project root.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        Self::load_optional(&project_stopgate_dir(cwd).join("config.toml"))
    }

    /// Load a config layer that may legitimately be absent.
    ///
    /// A present but unparsable file is reported; a missing one is silent.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring config layer: {}", e);
                None
            }
        }
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| GateError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| GateError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(n) = env_u32("STOPGATE_MAX_CONSECUTIVE_BLOCKS") {
            if GateConfig::is_valid_max_consecutive_blocks(n) {
                self.gate.max_consecutive_blocks = n;
            } else {
                tracing::warn!(
                    "Invalid STOPGATE_MAX_CONSECUTIVE_BLOCKS value '{}'. Must be >= {}. Using '{}'.",
                    n,
                    MIN_MAX_CONSECUTIVE_BLOCKS,
                    self.gate.max_consecutive_blocks
                );
            }
        }

        if let Some(n) = env_u32("STOPGATE_LOOP_REPEAT_THRESHOLD") {
            if GateConfig::is_valid_loop_repeat_threshold(n) {
                self.gate.loop_repeat_threshold = n;
            } else {
                tracing::warn!(
                    "Invalid STOPGATE_LOOP_REPEAT_THRESHOLD value '{}'. Must be >= {}. Using '{}'.",
                    n,
                    MIN_LOOP_REPEAT_THRESHOLD,
                    self.gate.loop_repeat_threshold
                );
            }
        }

        if let Some(n) = env_u64("STOPGATE_CHECKER_TIMEOUT_SECS") {
            self.timeouts.checker_secs = n;
        }
        if let Some(n) = env_u64("STOPGATE_PARALLEL_TIMEOUT_SECS") {
            self.timeouts.parallel_secs = n;
        }
        if let Some(n) = env_u64("STOPGATE_HOST_TIMEOUT_SECS") {
            self.timeouts.host_secs = n;
        }

        if let Some(n) = env_u32("STOPGATE_COMPACTION_FRESHNESS_HOURS") {
            self.compaction.freshness_hours = n;
        }

        if let Some(n) = env_u64("STOPGATE_LOCK_TIMEOUT_MS") {
            self.storage.lock_timeout_ms = n;
        }
    }

    /// Merge another config into this one, field by field.
    ///
    /// Non-default fields from `other` win. A layer cannot set a value back
    /// to its default to undo a lower layer, because "unset" and "set to
    /// default" are indistinguishable after deserialization.
    fn merge(mut self, other: Config) -> Self {
        let default_gate = GateConfig::default();
        let max_blocks = other.gate.max_consecutive_blocks;
        if max_blocks != default_gate.max_consecutive_blocks {
            if GateConfig::is_valid_max_consecutive_blocks(max_blocks) {
                self.gate.max_consecutive_blocks = max_blocks;
            } else {
                tracing::warn!(
                    "Invalid gate.max_consecutive_blocks value '{}'. Must be >= {}. Using '{}'.",
                    max_blocks,
                    MIN_MAX_CONSECUTIVE_BLOCKS,
                    self.gate.max_consecutive_blocks
                );
            }
        }
        let threshold = other.gate.loop_repeat_threshold;
        if threshold != default_gate.loop_repeat_threshold {
            if GateConfig::is_valid_loop_repeat_threshold(threshold) {
                self.gate.loop_repeat_threshold = threshold;
            } else {
                tracing::warn!(
                    "Invalid gate.loop_repeat_threshold value '{}'. Must be >= {}. Using '{}'.",
                    threshold,
                    MIN_LOOP_REPEAT_THRESHOLD,
                    self.gate.loop_repeat_threshold
                );
            }
        }

        let default_timeouts = TimeoutConfig::default();
        if other.timeouts.checker_secs != default_timeouts.checker_secs {
            self.timeouts.checker_secs = other.timeouts.checker_secs;
        }
        if other.timeouts.parallel_secs != default_timeouts.parallel_secs {
            self.timeouts.parallel_secs = other.timeouts.parallel_secs;
        }
        if other.timeouts.host_secs != default_timeouts.host_secs {
            self.timeouts.host_secs = other.timeouts.host_secs;
        }

        let default_compaction = CompactionConfig::default();
        if other.compaction.freshness_hours != default_compaction.freshness_hours {
            self.compaction.freshness_hours = other.compaction.freshness_hours;
        }
        let recent = other.compaction.recent_messages;
        if recent != default_compaction.recent_messages {
            if CompactionConfig::is_valid_recent_messages(recent) {
                self.compaction.recent_messages = recent;
            } else {
                tracing::warn!(
                    "Invalid compaction.recent_messages value '{}'. Must be >= {}. Using '{}'.",
                    recent,
                    MIN_RECENT_MESSAGES,
                    self.compaction.recent_messages
                );
            }
        }
        let match_threshold = other.compaction.match_threshold;
        if match_threshold != default_compaction.match_threshold {
            if CompactionConfig::is_valid_match_threshold(match_threshold) {
                self.compaction.match_threshold = match_threshold;
            } else {
                tracing::warn!(
                    "Invalid compaction.match_threshold value '{}'. Must be in (0, 1]. Using '{}'.",
                    match_threshold,
                    self.compaction.match_threshold
                );
            }
        }

        if other.storage.lock_timeout_ms != StorageConfig::default().lock_timeout_ms {
            self.storage.lock_timeout_ms = other.storage.lock_timeout_ms;
        }

        self
    }
}

fn env_u32(key: &str) -> Option<u32> {
    let val = env::var(key).ok()?;
    match val.parse::<u32>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(
                "Invalid {} value '{}'. Expected a non-negative integer. Ignoring.",
                key,
                val
            );
            None
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let val = env::var(key).ok()?;
    match val.parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(
                "Invalid {} value '{}'. Expected a non-negative integer. Ignoring.",
                key,
                val
            );
            None
        }
    }
}

/// Get the stopgate home directory.
///
/// Checks `STOPGATE_HOME` first, then falls back to `~/.stopgate`. An empty
/// `STOPGATE_HOME` is ignored.
pub fn stopgate_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("STOPGATE_HOME") {
        if home.is_empty() {
            tracing::warn!("STOPGATE_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("STOPGATE_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".stopgate"));
    }

    // Containerized/minimal environments without HOME
    let fallback_path = fallback_stopgate_home();
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

#[cfg(unix)]
fn fallback_stopgate_home() -> PathBuf {
    use std::os::unix::fs::MetadataExt;
    let uid = std::fs::metadata("/").map(|m| m.uid()).unwrap_or(0);
    PathBuf::from(format!("/tmp/stopgate-{}", uid))
}

#[cfg(not(unix))]
fn fallback_stopgate_home() -> PathBuf {
    std::env::temp_dir().join("stopgate")
}

/// Find the project root for a given working directory.
///
/// An existing `.stopgate/` directory in the cwd or any ancestor wins, then
/// the nearest ancestor holding a `.git` entry, then the cwd itself. Only
/// the filesystem is consulted; no subprocess is started.
pub fn find_project_root(cwd: &Path) -> PathBuf {
    if let Some(root) = cwd.ancestors().find(|a| a.join(".stopgate").is_dir()) {
        return root.to_path_buf();
    }

    // `.git` is a directory in a checkout and a file in worktrees/submodules
    if let Some(root) = cwd.ancestors().find(|a| a.join(".git").exists()) {
        return root.to_path_buf();
    }

    cwd.to_path_buf()
}

/// Get the project `.stopgate/` directory for a working directory.
pub fn project_stopgate_dir(cwd: &Path) -> PathBuf {
    find_project_root(cwd).join(".stopgate")
}

/// Get the sessions directory: `<home>/sessions/`.
pub fn sessions_dir() -> Option<PathBuf> {
    stopgate_home().map(|h| h.join("sessions"))
}

/// Get the runtime directory holding a session's auxiliary artifacts.
///
/// Returns `<home>/runtime/<session_id>/`. Compaction events and saved
/// pre-compaction transcripts live here by default.
pub fn session_runtime_dir(session_id: &str) -> Option<PathBuf> {
    stopgate_home().map(|h| h.join("runtime").join(sanitize_file_component(session_id)))
}

/// Locate the considerations file for a working directory.
///
/// The project file (`.stopgate/considerations.toml`) shadows the user file
/// (`<home>/considerations.toml`). Returns `None` when neither exists.
pub fn considerations_path(cwd: &Path) -> Option<PathBuf> {
    let project = project_stopgate_dir(cwd).join("considerations.toml");
    if project.is_file() {
        return Some(project);
    }
    let user = stopgate_home()?.join("considerations.toml");
    user.is_file().then_some(user)
}
