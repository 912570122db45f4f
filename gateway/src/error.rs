//! Gateway-specific error types
//!
//! [`HostError`] is what a host operation reports; the dispatcher turns it
//! into a failed `Outcome` so remote callers never see a transport fault for
//! a domain failure. [`GatewayError`] covers server setup and I/O.

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Server startup failed on {addr}: {message}")]
    ServerStartup { addr: String, message: String },

    #[error("Host thread failed: {message}")]
    HostThread { message: String },

    #[error("Invalid request: {details}")]
    InvalidRequest { details: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn startup(addr: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Self::ServerStartup {
            addr: addr.to_string(),
            message: message.to_string(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Document '{doc}' not found")]
    DocumentNotFound { doc: String },

    #[error("Object '{name}' not found in document '{doc}'")]
    ObjectNotFound { doc: String, name: String },

    #[error("Unknown object type '{type_id}'")]
    UnknownType { type_id: String },

    #[error("Invalid properties: {details}")]
    InvalidProperties { details: String },

    #[error("{kind} on line {line}: {message}")]
    ScriptError {
        line: usize,
        kind: String,
        message: String,
    },

    #[error("Unknown view '{view}'")]
    InvalidView { view: String },
}

pub type HostResult<T> = Result<T, HostError>;
