//! Domain types for the run-tracking client.
//!
//! This module contains the core data structures:
//! - Run: client-side view of one run and its reducer
//! - Events: stream records and the capped event log

pub mod events;
pub mod run;

// Re-export commonly used types
pub use events::{EventLog, RunEvent, DEFAULT_EVENT_LIMIT, PARSE_ERROR_KIND};
pub use run::{
    Run, RunAction, RunId, RunStatus, StatusSnapshot, StepName, StepState, StepStatus,
};
