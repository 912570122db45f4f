//! Message types for the host automation bridge
//!
//! This module organizes all wire messages by category:
//! - `rpc`: Automation client ↔ Gateway calls and replies
//! - `gateway`: Gateway health and status reporting

pub mod gateway;
pub mod rpc;

// Re-export commonly used types at module level for convenience
pub use gateway::GatewayStatus;

pub use rpc::{ObjectPayload, Outcome, RpcCall, RpcEnvelope, RpcReply};
