//! teamflow - client for a multi-agent product planning service
//!
//! Submits a product idea to the service, tracks the run through periodic
//! status polling and a server-sent event stream, and exports the finished
//! document as Markdown or as a notebook bundle.
//!
//! # Architecture
//!
//! Both progress channels feed one reducer:
//! - The poller sends full status snapshots (replace)
//! - The stream subscriber sends events (append + cursor advance)
//! - `RunSession` applies both to a single `Run`, dropping anything that
//!   belongs to a previous run identity
//!
//! # Modules
//!
//! - `adapters`: Service access (`RunApi`, HTTP + SSE)
//! - `core`: Idea buffer, session, poller, stream subscriber
//! - `domain`: Data structures (Run, RunEvent, EventLog)
//! - `export`: Notebook conversion and downloads
//! - `store`: Last-idea cache
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Start a run and follow it to the end
//! teamflow run "A habit tracker for remote teams"
//!
//! # Follow an existing run, showing only tech events
//! teamflow watch <run-id> --step tech
//!
//! # Save the finished document as a notebook
//! teamflow notebook <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod export;
pub mod store;

// Re-export main types at crate root for convenience
pub use adapters::{ApiError, ExportFormat, HttpRunApi, RunApi};
pub use core::{IdeaBuffer, RunSession, SessionError, SessionSettings, SessionUpdate};
pub use domain::{EventLog, Run, RunEvent, RunId, RunStatus, StepName, StepStatus};
pub use export::{markdown_to_notebook, Notebook};
