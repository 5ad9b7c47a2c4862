//! Compaction context validation.
//!
//! When the host compacts a session's context it records an event pointing
//! at the transcript saved beforehand. The validator checks that the
//! compacted context still carries what the agent needs to finish.

pub mod events;
pub mod validator;

pub use events::{latest_event, load_events, parse_events, CompactionEvent};
pub use validator::{CompactionValidator, ValidationResult};
