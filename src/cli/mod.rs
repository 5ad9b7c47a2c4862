//! CLI commands for stopgate.
//!
//! The hook itself lives in [`crate::hooks`]; these are the user-facing
//! inspection commands:
//! - **sessions**: list recent sessions and their block history
//! - **debug**: dump or reset one session's turn state
//! - **considerations**: show the battery loaded for a directory

pub mod considerations;
pub mod debug;
pub mod sessions;

pub use considerations::ConsiderationsCommand;
pub use debug::DebugCommand;
pub use sessions::SessionsCommand;
