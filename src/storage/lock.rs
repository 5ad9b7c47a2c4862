//! Per-session advisory locks.
//!
//! Locks are exclusive `flock`-style locks on a sidecar file, polled with a
//! short bounded timeout. When the lock cannot be taken the caller proceeds
//! without it: a lost update is preferable to a hung host process.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{GateError, Result};

/// Interval between non-blocking lock attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// An advisory lock guard that may or may not actually hold the lock.
///
/// Released on drop.
#[derive(Debug)]
pub struct SessionLock {
    file: Option<File>,
    path: Option<PathBuf>,
}

impl SessionLock {
    /// A guard that holds nothing. Used by stores without on-disk state and
    /// as the fail-open fallback.
    pub fn unlocked() -> Self {
        Self {
            file: None,
            path: None,
        }
    }

    /// Take an exclusive lock on `path` within `timeout`.
    ///
    /// Never fails: contention past the timeout, or any I/O error while
    /// opening or locking, yields an unlocked guard and a warning.
    pub fn acquire(path: &Path, timeout: Duration) -> Self {
        Self::try_acquire(path, timeout).unwrap_or_else(|e| {
            tracing::warn!("{} (fail-open: proceeding unlocked)", e);
            Self::unlocked()
        })
    }

    /// Take an exclusive lock on `path`, polling until `timeout` elapses.
    pub fn try_acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| GateError::lock(path, format!("failed to open lock file: {}", e)))?;

        let deadline = Instant::now() + timeout;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    return Ok(Self {
                        file: Some(file),
                        path: Some(path.to_path_buf()),
                    })
                }
                Err(e) if is_contended(&e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(GateError::lock(
                            path,
                            format!(
                                "still held by another process after {}ms",
                                timeout.as_millis()
                            ),
                        ));
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
                Err(e) => {
                    return Err(GateError::lock(path, format!("failed to lock: {}", e)));
                }
            }
        }
    }

    /// Whether the lock is actually held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the held lock file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
