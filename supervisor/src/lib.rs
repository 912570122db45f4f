//! Process supervision and status monitoring for helper servers
//!
//! Starts, stops and watches the helper processes a host application
//! depends on (legacy socket server, RPC gateway, protocol server), and
//! keeps a throttled, cached view of their liveness and of client
//! connectivity.

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod settings;
pub mod traits;

// Re-export commonly used types
pub use crate::core::{OutputCapture, ProcessOrigin, ProcessSupervisor, StatusMonitor, SupervisorOutcome};
pub use config::{MonitorSettings, Role, ServerConfig, ServerMode, SupervisorTimings};
pub use error::{SupervisorError, SupervisorResult};
pub use settings::{JsonFileSettings, MemorySettings, SettingsStore};
pub use traits::{ConnectivityProbe, DetailFetcher, PortProbe, ProcessTable, RoleLiveness};
