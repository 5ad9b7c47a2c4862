//! Turn state storage for stopgate.
//!
//! This module provides persistent, crash-safe storage for per-session
//! turn state, with file-based and in-memory backends.

pub mod file;
pub mod lock;
pub mod memory;
pub mod traits;

pub use file::FileTurnStateStore;
pub use lock::SessionLock;
pub use memory::MemoryTurnStateStore;
pub use traits::TurnStateStore;
