//! Gateway services: the host thread and the network front ends

pub mod host_thread;
pub mod legacy_socket;
pub mod rpc_server;

pub use host_thread::{spawn_host_thread, HostThread, DEFAULT_TICK_INTERVAL};
pub use legacy_socket::serve_legacy_socket;
pub use rpc_server::{shutdown_signal, RpcServer};
