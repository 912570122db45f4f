//! Service implementations
//!
//! Real implementations of the seam traits in [`crate::traits`], plus the
//! OS plumbing the supervisor drives directly (signals, output drains).

pub mod connectivity;
pub mod log_sink;
pub mod port_probe;
pub mod process_table;
pub mod signals;

#[cfg(test)]
mod tests;

pub use connectivity::{HttpDetailFetcher, RpcPingProbe, TcpConnectProbe};
pub use log_sink::StderrTail;
pub use port_probe::SystemPortProbe;
pub use process_table::SysinfoProcessTable;
