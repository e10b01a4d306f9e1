//! Errors surfaced by run session operations.

use thiserror::Error;

/// Failure of a user-initiated run operation
///
/// The message of each variant is what the shell shows as the current error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Add a product idea before starting.")]
    Validation,

    #[error("{0}")]
    RunCreation(String),

    #[error("{0}")]
    StatusFetch(String),

    #[error("{0}")]
    Cancel(String),

    #[error("{0}")]
    Regenerate(String),

    #[error("{0}")]
    Export(String),

    #[error("{0}")]
    NotebookExport(String),
}

impl SessionError {
    /// Short name of the error kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::RunCreation(_) => "run_creation",
            Self::StatusFetch(_) => "status_fetch",
            Self::Cancel(_) => "cancel",
            Self::Regenerate(_) => "regenerate",
            Self::Export(_) => "export",
            Self::NotebookExport(_) => "notebook_export",
        }
    }
}
