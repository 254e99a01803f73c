//! Error types for Sointu

use std::time::Duration;

use thiserror::Error;

use crate::submission::FieldError;

/// Result type alias using Sointu's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Sointu
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Submission payload failed validation
    #[error("Invalid submission: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// Sandbox could not be created, started or attached
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// The command inside the sandbox failed
    #[error("Execution error: {0}")]
    Execution(String),

    /// Stop/remove failed after the command ran
    #[error("Teardown error: {0}")]
    Teardown(String),

    /// The process cannot start serving traffic
    #[error("Startup error: {0}")]
    Startup(String),

    /// Sandbox exceeded its execution deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Worker pool is full
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Container engine error
    #[error("Container error: {0}")]
    Container(String),

    /// Invalid state transition or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Capacity(_))
    }

    /// Check if the error must abort the whole process
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, Error::Startup(_) | Error::Config(_))
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Container(err.to_string())
    }
}
