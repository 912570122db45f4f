//! Core status types shared by the supervisor and its consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical identity of a managed server, independent of any OS process
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    /// Legacy line-socket server
    pub const LEGACY_SOCKET: &'static str = "legacy-socket";
    /// RPC gateway inside the host
    pub const RPC: &'static str = "rpc";
    /// Protocol server used by automation agents
    pub const PROTOCOL_SERVER: &'static str = "protocol-server";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RoleName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a role's process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Not probed yet, or an observation contradicted the recorded state
    #[default]
    Unknown,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl ProcessState {
    /// Whether `self -> next` is a legal lifecycle edge.
    ///
    /// `Unknown` may be entered from and left to any state. A start that
    /// fails moves `Starting` straight back to `Stopped`.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (_, Unknown)
                | (Unknown, _)
                | (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Legal edges leading from `self` to `next`, walking the lifecycle
    /// ring when there is no direct edge
    pub fn path_to(self, next: ProcessState) -> Vec<ProcessState> {
        use ProcessState::*;
        const RING: [ProcessState; 4] = [Stopped, Starting, Running, Stopping];

        if self.can_transition_to(next) {
            return vec![next];
        }
        let Some(mut at) = RING.iter().position(|state| *state == self) else {
            return vec![next];
        };
        let mut path = Vec::new();
        loop {
            at = (at + 1) % RING.len();
            path.push(RING[at]);
            if RING[at] == next {
                return path;
            }
        }
    }

    pub fn is_alive(self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::Stopping)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Unknown => "unknown",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Which liveness layer produced a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    #[default]
    None,
    /// Poll of the stored child handle
    Handle,
    /// Platform scan of the port's owning process
    PortOwner,
    /// Direct socket connect to host:port
    SocketConnect,
    /// Connect-mode role attached to an instance we did not spawn
    Attached,
}

/// Point-in-time liveness result for one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub role: RoleName,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub method: DetectionMethod,
}

impl ProcessStatus {
    pub fn unknown(role: RoleName) -> Self {
        Self {
            role,
            state: ProcessState::Unknown,
            pid: None,
            method: DetectionMethod::None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }
}

/// Failure taxonomy for supervisor, gateway and monitor operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Missing or invalid script or interpreter path
    ConfigError,
    /// The OS failed to create the process
    SpawnError,
    /// The process did not confirm readiness within its grace period
    LivenessTimeout,
    /// The port is bound by a foreign, unmanaged process
    PortConflict,
    /// Graceful stop exceeded its window and the kill did not confirm
    ShutdownTimeout,
    /// A task raised inside the host tick
    RpcExecutionError,
    /// Network failure during a status check
    ProbeError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::ConfigError => "config_error",
            FailureReason::SpawnError => "spawn_error",
            FailureReason::LivenessTimeout => "liveness_timeout",
            FailureReason::PortConflict => "port_conflict",
            FailureReason::ShutdownTimeout => "shutdown_timeout",
            FailureReason::RpcExecutionError => "rpc_execution_error",
            FailureReason::ProbeError => "probe_error",
        };
        f.write_str(s)
    }
}

/// Cached combination of per-role liveness and client connectivity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub roles: BTreeMap<RoleName, ProcessStatus>,
    pub client_connected: bool,
    /// Set on entry into the connected state, cleared on disconnect
    pub connected_since: Option<DateTime<Utc>>,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_change_at: Option<DateTime<Utc>>,
    pub detail: Option<serde_json::Value>,
    pub detail_fetched_at: Option<DateTime<Utc>>,
    /// Bumped every time a check observes a difference
    pub generation: u64,
}

impl StatusSnapshot {
    /// True when roles or connectivity differ from `other`.
    ///
    /// Timestamps, detail and generation are bookkeeping and do not count.
    pub fn differs_from(&self, other: &StatusSnapshot) -> bool {
        self.client_connected != other.client_connected || self.roles != other.roles
    }

    pub fn role(&self, role: &RoleName) -> Option<&ProcessStatus> {
        self.roles.get(role)
    }

    pub fn connection_duration(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.connected_since.map(|since| now - since)
    }
}
