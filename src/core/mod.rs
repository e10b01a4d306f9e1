//! Core run-tracking logic.
//!
//! This module contains:
//! - Idea: bounded idea buffer and prefill requests
//! - Session: run lifecycle, user operations and the merged view
//! - Poller: periodic status checks
//! - Stream: event stream subscription with reconnects
//! - Cursor: stream position and redelivery filtering

pub mod cursor;
pub mod error;
pub mod idea;
pub mod poller;
pub mod session;
pub mod stream;

// Re-export commonly used types
pub use cursor::EventCursor;
pub use error::SessionError;
pub use idea::{prefill_channel, IdeaBuffer, PrefillReceiver, PrefillSender, MAX_IDEA_CHARS};
pub use poller::{PollOutcome, PollSchedule};
pub use session::{RunSession, SessionSettings, SessionUpdate};
pub use stream::ReconnectPolicy;
