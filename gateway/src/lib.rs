//! RPC gateway marshalling remote calls onto a single host thread
//!
//! Network handlers never touch host state. Each call becomes a task on a
//! FIFO queue that the host drains during its cooperative tick; the caller
//! waits for its own result. The crate also carries an in-memory reference
//! host so the gateway can run standalone.

pub mod core;
pub mod error;
pub mod host;
pub mod services;
pub mod state;
pub mod traits;

// Re-export commonly used types
pub use crate::core::{HostTicker, RpcGateway, TaskQueue, TaskSubmitter, TickReport};
pub use error::{GatewayError, GatewayResult, HostError, HostResult};
pub use host::DocumentHost;
pub use services::{serve_legacy_socket, shutdown_signal, spawn_host_thread, HostThread, RpcServer};
pub use state::GatewayStats;
pub use traits::Host;
