//! Adapter interfaces for the remote generation service.
//!
//! The [`RunApi`] trait is the seam between the run session and the
//! network. [`HttpRunApi`] talks to the real service over HTTP; tests plug
//! in scripted implementations.

pub mod http;
pub mod sse;

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{RunId, RunStatus, StatusSnapshot, StepName};

// Re-export the HTTP adapter
pub use http::HttpRunApi;
pub use sse::{SseDecoder, SseMessage};

/// Operation labels used in error messages
pub const OP_CREATE: &str = "Run creation";
pub const OP_STATUS: &str = "Status";
pub const OP_CANCEL: &str = "Cancel";
pub const OP_REGENERATE: &str = "Regenerate";
pub const OP_EXPORT: &str = "Export";
pub const OP_EVENTS: &str = "Event stream";

/// Response to `POST /runs`
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRun {
    pub id: RunId,

    #[serde(default)]
    pub status: Option<RunStatus>,
}

/// Response to cancel and regenerate requests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub status: Option<RunStatus>,
}

/// Rendering requested from the export endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Full Markdown document
    #[default]
    Markdown,

    /// Prompt bundle for IDE agents
    Ide,

    /// Condensed prompt for Cursor
    Cursor,
}

impl ExportFormat {
    /// Value of the `format` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Ide => "ide",
            Self::Cursor => "cursor",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// Errors talking to the service
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response; `detail` is the body verbatim when there was one
    #[error("{detail}")]
    Status {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} response could not be decoded: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl ApiError {
    /// Build the error for a non-success response
    pub fn status(operation: &'static str, status: u16, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            format!("{} failed ({})", operation, status)
        } else {
            body.to_string()
        };
        Self::Status {
            operation,
            status,
            detail,
        }
    }

    /// HTTP status code, when the service answered
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Stream of server-push messages for one connection
pub type EventStream = BoxStream<'static, Result<SseMessage, ApiError>>;

/// Operations the run session issues against the service
#[async_trait]
pub trait RunApi: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// `POST /runs`
    async fn create_run(&self, idea: &str) -> Result<CreatedRun, ApiError>;

    /// `GET /runs/{id}`
    async fn run_status(&self, run_id: &RunId) -> Result<StatusSnapshot, ApiError>;

    /// `POST /runs/{id}/cancel`
    async fn cancel_run(&self, run_id: &RunId) -> Result<StatusReply, ApiError>;

    /// `POST /runs/{id}/steps/{step}/regenerate`
    async fn regenerate_step(&self, run_id: &RunId, step: StepName)
        -> Result<StatusReply, ApiError>;

    /// `GET /runs/{id}/export?format=..`, returning the raw document
    async fn export_run(&self, run_id: &RunId, format: ExportFormat) -> Result<String, ApiError>;

    /// `GET /runs/{id}/events?start=..`
    async fn open_events(&self, run_id: &RunId, start: u64) -> Result<EventStream, ApiError>;
}
