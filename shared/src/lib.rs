//! Shared types for the host automation bridge
//!
//! Contains the types that cross crate or process boundaries: the RPC wire
//! messages spoken between automation clients and the gateway, the status
//! values produced by the supervisor, and the logging setup used by both
//! binaries.

pub mod client;
pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use client::RpcClient;
pub use errors::*;
pub use logging::ComponentId;
pub use types::*;

// Re-export the wire protocol
pub use messages::{
    // Automation client ↔ Gateway calls
    RpcCall, RpcEnvelope, RpcReply,

    // Call payloads
    ObjectPayload, Outcome,

    // Gateway status endpoint
    GatewayStatus,
};
