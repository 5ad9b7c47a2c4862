//! Hook integration for the host runtime.
//!
//! The host invokes `stopgate hook stop` (or `subagent-stop`) whenever an
//! agent tries to end its turn, passing session details as JSON on stdin.
//! The hook prints a JSON decision and exits 0 to approve or 2 to block.

pub mod input;
pub mod output;
pub mod runner;

pub use input::{parse_input, HookInput, StopInput};
pub use output::{to_json, StopDecision, StopOutput};
pub use runner::{HookRunner, HookType};
