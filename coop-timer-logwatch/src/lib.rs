//! Log file trigger engine
//!
//! Polls a growing text log (e.g. a game server's `latest.log`) and runs
//! trigger rules against every newly appended line. Rules match either a
//! plain substring or a regex anchored at the start of the line, and each
//! carries a zero-argument action.
//!
//! A file that shrinks below the number of lines already processed is
//! treated as rotated and rescanned from its first line. Read errors never
//! stop the polling loop.

pub mod error;
pub mod tailer;
pub mod trigger;

// Re-exports
pub use error::{LogWatchError, Result};
pub use tailer::{LogTailer, TailerHandle, TickOutcome, DEFAULT_POLL_INTERVAL};
pub use trigger::{Contains, LineMatcher, StartsWithPattern, TriggerAction, TriggerRule};
