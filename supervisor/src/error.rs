//! Supervisor-specific error types
//!
//! Operational failures (a process that will not start or stop) are
//! reported as [`SupervisorOutcome`](crate::core::supervisor::SupervisorOutcome)
//! values. These errors cover misconfiguration and settings I/O only.

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Unknown role: {role}")]
    UnknownRole { role: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Settings store error at {path}: {message}")]
    SettingsError { path: String, message: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SupervisorError {
    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }

    pub fn unknown_role(role: impl Into<String>) -> Self {
        Self::UnknownRole { role: role.into() }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
