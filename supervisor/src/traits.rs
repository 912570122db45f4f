//! Trait definitions with mockall annotations for testing
//!
//! These are the seams between the supervisor's core logic and the
//! operating system or network. Production backends live in `services`;
//! tests substitute the generated mocks.

use shared::{ProcessStatus, RoleName, SharedResult};

/// Platform view of listening sockets
///
/// Backs both the liveness fallback and port-conflict detection.
#[mockall::automock]
#[async_trait::async_trait]
pub trait PortProbe: Send + Sync {
    /// Whether something accepts connections on `host:port`
    async fn is_listening(&self, host: &str, port: u16) -> bool;

    /// PID of the process holding a listening socket on `port`.
    ///
    /// `None` means unknown: nothing listens, or the platform would not say.
    async fn port_owner(&self, port: u16) -> Option<u32>;
}

/// Operating system process table
#[mockall::automock]
pub trait ProcessTable: Send + Sync {
    /// Whether `pid` exists and has not exited
    fn is_alive(&self, pid: u32) -> bool;

    /// Space-joined command line of `pid`, if visible
    fn command_line(&self, pid: u32) -> Option<String>;
}

/// Source of per-role liveness for the status monitor
#[mockall::automock]
#[async_trait::async_trait]
pub trait RoleLiveness: Send + Sync {
    /// Roles to report on, in a stable order
    fn role_names(&self) -> Vec<RoleName>;

    /// Fresh layered liveness check for one role
    async fn probe_role(&self, role: &RoleName) -> ProcessStatus;
}

/// Client connectivity check (is the host-side gateway reachable)
#[mockall::automock]
#[async_trait::async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// `Ok(())` when connected; errors are downgraded to "not connected"
    async fn probe(&self) -> SharedResult<()>;
}

/// Coarse status detail fetch (e.g. HTTP GET of a status endpoint)
#[mockall::automock]
#[async_trait::async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch(&self) -> SharedResult<serde_json::Value>;
}
