//! Role configuration and timing constants
//!
//! A [`Role`] pairs a logical server identity with its static
//! [`ServerConfig`]. Both are immutable for the lifetime of a supervisor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use shared::RoleName;

use crate::error::{SupervisorError, SupervisorResult};
use crate::settings::SettingsStore;

/// Default port of the legacy line-socket server
pub const LEGACY_SOCKET_PORT: u16 = 12345;
/// Default port of the RPC gateway
pub const RPC_PORT: u16 = 9875;
/// Default port of the protocol server
pub const PROTOCOL_SERVER_PORT: u16 = 8000;

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Argument appended when a role runs with its debug flag set
pub const DEBUG_ARG: &str = "--debug";

/// How the supervisor relates to a role's process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMode {
    /// Spawn and own the process
    #[default]
    Standalone,
    /// Attach to an instance started elsewhere; never spawn
    Connect,
}

impl FromStr for ServerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standalone" => Ok(ServerMode::Standalone),
            "connect" => Ok(ServerMode::Connect),
            other => Err(format!("Unknown server mode: {other}")),
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMode::Standalone => write!(f, "standalone"),
            ServerMode::Connect => write!(f, "connect"),
        }
    }
}

/// Static parameters for one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Script run by the interpreter, or the executable itself
    pub script: PathBuf,
    pub interpreter: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub mode: ServerMode,
    /// Argument template; `{host}`, `{port}` and `{script}` are expanded
    pub args: Vec<String>,
}

/// Fully resolved program and argv for a spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ServerConfig {
    /// Defaults for a role: loopback host, the role's well-known port
    pub fn defaults_for(role: &RoleName) -> Self {
        let port = match role.as_str() {
            RoleName::LEGACY_SOCKET => LEGACY_SOCKET_PORT,
            RoleName::RPC => RPC_PORT,
            _ => PROTOCOL_SERVER_PORT,
        };
        Self {
            script: PathBuf::new(),
            interpreter: None,
            host: DEFAULT_HOST.to_string(),
            port,
            debug: false,
            mode: ServerMode::Standalone,
            args: vec![
                "--host".to_string(),
                "{host}".to_string(),
                "--port".to_string(),
                "{port}".to_string(),
            ],
        }
    }

    /// Load a role's configuration from the settings collaborator.
    ///
    /// Missing keys fall back to [`ServerConfig::defaults_for`]; malformed
    /// values are a configuration error.
    pub fn from_settings(store: &dyn SettingsStore, role: &RoleName) -> SupervisorResult<Self> {
        let mut config = Self::defaults_for(role);
        let key = |field: &str| format!("roles.{role}.{field}");

        if let Some(script) = store.get_string(&key("script")) {
            config.script = PathBuf::from(script);
        }
        if let Some(interpreter) = store.get_string(&key("interpreter")) {
            config.interpreter = (!interpreter.trim().is_empty()).then(|| PathBuf::from(interpreter));
        }
        if let Some(host) = store.get_string(&key("host")) {
            config.host = host;
        }
        if let Some(port) = store.get_string(&key("port")) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| SupervisorError::config(format!("{} = {port}", key("port"))))?;
        }
        if let Some(debug) = store.get_string(&key("debug")) {
            config.debug = parse_flag(&debug)
                .ok_or_else(|| SupervisorError::config(format!("{} = {debug}", key("debug"))))?;
        }
        if let Some(mode) = store.get_string(&key("mode")) {
            config.mode = mode.parse().map_err(SupervisorError::config)?;
        }
        if let Some(args) = store.get_string(&key("args")) {
            config.args = args.split_whitespace().map(str::to_string).collect();
        }
        Ok(config)
    }

    /// Persist this configuration under the role's keys
    pub fn save(&self, store: &mut dyn SettingsStore, role: &RoleName) -> SupervisorResult<()> {
        let key = |field: &str| format!("roles.{role}.{field}");
        store.set_string(&key("script"), &self.script.to_string_lossy())?;
        store.set_string(
            &key("interpreter"),
            &self
                .interpreter
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
        )?;
        store.set_string(&key("host"), &self.host)?;
        store.set_string(&key("port"), &self.port.to_string())?;
        store.set_string(&key("debug"), &self.debug.to_string())?;
        store.set_string(&key("mode"), &self.mode.to_string())?;
        store.set_string(&key("args"), &self.args.join(" "))?;
        Ok(())
    }

    /// Expand the argument template and append the debug flag
    pub fn expanded_args(&self) -> Vec<String> {
        let script = self.script.to_string_lossy();
        let port = self.port.to_string();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{host}", &self.host)
                    .replace("{port}", &port)
                    .replace("{script}", &script)
            })
            .collect();
        if self.debug {
            args.push(DEBUG_ARG.to_string());
        }
        args
    }

    /// Resolve the program to spawn and its argv.
    ///
    /// With an interpreter the script becomes the first argument and must
    /// exist on disk. Without one the script is the executable itself and
    /// bare names are looked up on `PATH`.
    pub fn resolve_command(&self) -> Result<ResolvedCommand, String> {
        if self.script.as_os_str().is_empty() {
            return Err("no script configured".to_string());
        }

        match &self.interpreter {
            Some(interpreter) => {
                let program = resolve_executable(interpreter)?;
                if !self.script.is_file() {
                    return Err(format!("script not found: {}", self.script.display()));
                }
                let mut args = vec![self.script.to_string_lossy().to_string()];
                args.extend(self.expanded_args());
                Ok(ResolvedCommand { program, args })
            }
            None => Ok(ResolvedCommand {
                program: resolve_executable(&self.script)?,
                args: self.expanded_args(),
            }),
        }
    }

    /// File name used to recognise this role's process by command line
    pub fn script_file_name(&self) -> Option<String> {
        self.script
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .filter(|name| !name.is_empty())
    }
}

fn resolve_executable(path: &Path) -> Result<PathBuf, String> {
    if path.is_absolute() || path.components().count() > 1 {
        if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(format!("executable not found: {}", path.display()))
        }
    } else {
        which::which(path).map_err(|e| format!("{} not found on PATH: {e}", path.display()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// A logical managed server identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: RoleName,
    pub config: ServerConfig,
}

impl Role {
    pub fn new(name: impl Into<RoleName>, config: ServerConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Empirically tuned supervisor delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTimings {
    /// Wait after spawn before confirming liveness
    pub start_grace: Duration,
    /// Wait for graceful termination before escalating to a kill
    pub stop_grace: Duration,
    /// Wait for a killed process to disappear
    pub kill_confirm: Duration,
    /// Pause between stop and start during a restart
    pub restart_delay: Duration,
    /// Timeout of the last-resort socket connect probe
    pub connect_probe: Duration,
    /// Poll interval while waiting on a process
    pub poll_interval: Duration,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            start_grace: Duration::from_millis(500),
            stop_grace: Duration::from_secs(3),
            kill_confirm: Duration::from_secs(2),
            restart_delay: Duration::from_secs(1),
            connect_probe: Duration::from_millis(250),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Status monitor throttle windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Minimum time between full checks
    pub check_interval: Duration,
    /// Minimum time between detail fetches
    pub detail_interval: Duration,
    /// Timeout of one detail fetch
    pub detail_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            detail_interval: Duration::from_secs(5),
            detail_timeout: Duration::from_millis(1500),
        }
    }
}
