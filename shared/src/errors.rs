//! Shared error types for the host automation bridge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Transport failure talking to {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Remote call failed: {message}")]
    Remote { message: String },

    #[error("Unexpected reply to {method}: {reply}")]
    UnexpectedReply { method: String, reply: String },

    #[error("Correlation mismatch: sent {sent}, received {received}")]
    CorrelationMismatch { sent: String, received: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Message protocol error: {message}")]
    ProtocolError { message: String },
}

impl SharedError {
    pub fn transport(endpoint: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
