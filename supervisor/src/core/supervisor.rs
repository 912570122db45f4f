//! Process supervisor for managed helper servers
//!
//! One slot per configured role. A slot holds at most one
//! [`ManagedProcess`] behind an async mutex, so `start`, `stop` and the
//! status monitor's liveness checks on the same role are serialized.
//!
//! Liveness is layered and the first conclusive layer wins:
//! 1. the stored handle (child poll, or PID check for adopted instances)
//! 2. the platform's port owner for the role's port, if that PID is alive
//! 3. a direct socket connect to the role's `host:port`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::{ResolvedCommand, Role, ServerMode, SupervisorTimings};
use crate::error::{SupervisorError, SupervisorResult};
use crate::services::log_sink::{self, StderrTail, STDERR_TAIL_LINES};
use crate::services::signals::{self, SignalTarget};
use crate::services::{SysinfoProcessTable, SystemPortProbe};
use crate::traits::{PortProbe, ProcessTable, RoleLiveness};
use shared::{
    component_debug, component_info, component_warn, ComponentId, DetectionMethod, FailureReason,
    ProcessState, ProcessStatus, RoleName,
};

/// How a spawned child's output reaches the log files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCapture {
    /// Pipe through drain tasks and keep a stderr tail in memory
    #[default]
    Drain,
    /// Redirect straight into the log files so the child outlives us
    Files,
}

/// How the supervisor came to hold a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOrigin {
    /// Spawned by this supervisor, leader of its own process group
    Spawned,
    /// Started elsewhere, recognised by its command line
    Adopted,
    /// Connect-mode attachment to a listener we do not own
    Attached,
}

/// An OS process held for a role
pub struct ManagedProcess {
    child: Option<Child>,
    pid: Option<u32>,
    origin: ProcessOrigin,
    started_at: DateTime<Utc>,
    drains: Vec<JoinHandle<()>>,
}

impl ManagedProcess {
    fn external(pid: Option<u32>, origin: ProcessOrigin) -> Self {
        Self {
            child: None,
            pid,
            origin,
            started_at: Utc::now(),
            drains: Vec::new(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn origin(&self) -> ProcessOrigin {
        self.origin
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn signal_target(&self) -> Option<SignalTarget> {
        let pid = self.pid?;
        Some(match self.origin {
            ProcessOrigin::Spawned => SignalTarget::Group(pid),
            ProcessOrigin::Adopted | ProcessOrigin::Attached => SignalTarget::Process(pid),
        })
    }

    /// Give drain tasks a moment to flush after the child exits
    async fn settle_drains(&mut self) {
        for drain in self.drains.drain(..) {
            let _ = tokio::time::timeout(Duration::from_millis(200), drain).await;
        }
    }
}

/// Result of a supervisor operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorOutcome {
    pub role: RoleName,
    pub ok: bool,
    pub pid: Option<u32>,
    pub reason: Option<FailureReason>,
    pub detail: Option<String>,
    /// Whether stop had to fall back to a forceful kill
    pub escalated: bool,
}

impl SupervisorOutcome {
    pub fn succeeded(role: RoleName, pid: Option<u32>) -> Self {
        Self {
            role,
            ok: true,
            pid,
            reason: None,
            detail: None,
            escalated: false,
        }
    }

    pub fn failed(role: RoleName, reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            role,
            ok: false,
            pid: None,
            reason: Some(reason),
            detail: Some(detail.into()),
            escalated: false,
        }
    }

    fn with_escalated(mut self, escalated: bool) -> Self {
        self.escalated = escalated;
        self
    }
}

struct RoleSlot {
    role: Role,
    process: Mutex<Option<ManagedProcess>>,
    state: StdMutex<ProcessState>,
    tail: Arc<StderrTail>,
}

impl RoleSlot {
    fn new(role: Role) -> Self {
        Self {
            role,
            process: Mutex::new(None),
            state: StdMutex::new(ProcessState::Unknown),
            tail: Arc::new(StderrTail::default()),
        }
    }

    /// Record a lifecycle edge. An illegal edge records `Unknown`, which
    /// the next probe settles.
    fn set_state(&self, next: ProcessState) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.can_transition_to(next) {
            *state = next;
        } else {
            component_debug!(
                ComponentId::current(),
                "{} cannot move from {} to {}, recording unknown",
                self.role.name,
                *state,
                next
            );
            *state = ProcessState::Unknown;
        }
    }

    /// Record a probe result by walking the legal edges that lead to it
    fn observe(&self, observed: ProcessState) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        for step in state.path_to(observed) {
            *state = step;
        }
    }

    fn state(&self) -> ProcessState {
        self.state.lock().map(|state| *state).unwrap_or_default()
    }
}

/// Starts, stops and watches the helper process of every configured role
pub struct ProcessSupervisor {
    slots: BTreeMap<RoleName, RoleSlot>,
    ports: Arc<dyn PortProbe>,
    processes: Arc<dyn ProcessTable>,
    timings: SupervisorTimings,
    log_dir: PathBuf,
    capture: OutputCapture,
}

impl ProcessSupervisor {
    /// Create a supervisor backed by the real OS probes
    pub fn new(roles: impl IntoIterator<Item = Role>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            slots: roles
                .into_iter()
                .map(|role| (role.name.clone(), RoleSlot::new(role)))
                .collect(),
            ports: Arc::new(SystemPortProbe::new()),
            processes: Arc::new(SysinfoProcessTable::new()),
            timings: SupervisorTimings::default(),
            log_dir: log_dir.into(),
            capture: OutputCapture::default(),
        }
    }

    /// Substitute the port and process backends (fluent API)
    pub fn with_backends(mut self, ports: Arc<dyn PortProbe>, processes: Arc<dyn ProcessTable>) -> Self {
        self.ports = ports;
        self.processes = processes;
        self
    }

    /// Configure timing constants (fluent API)
    pub fn with_timings(mut self, timings: SupervisorTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Configure how child output is captured (fluent API)
    pub fn with_output_capture(mut self, capture: OutputCapture) -> Self {
        self.capture = capture;
        self
    }

    pub fn roles(&self) -> Vec<RoleName> {
        self.slots.keys().cloned().collect()
    }

    pub fn role(&self, name: &RoleName) -> Option<&Role> {
        self.slots.get(name).map(|slot| &slot.role)
    }

    pub fn timings(&self) -> &SupervisorTimings {
        &self.timings
    }

    pub fn log_dir(&self) -> &std::path::Path {
        &self.log_dir
    }

    fn slot(&self, role: &RoleName) -> SupervisorResult<&RoleSlot> {
        self.slots
            .get(role)
            .ok_or_else(|| SupervisorError::unknown_role(role.as_str()))
    }

    /// Last recorded lifecycle state, without probing or waiting
    pub fn recorded_state(&self, role: &RoleName) -> SupervisorResult<ProcessState> {
        Ok(self.slot(role)?.state())
    }

    /// Start a role's process.
    ///
    /// A role that is already running is a no-op success. Only an unknown
    /// role is an `Err`; every operational failure is a failed outcome.
    pub async fn start(&self, role: &RoleName) -> SupervisorResult<SupervisorOutcome> {
        let slot = self.slot(role)?;
        let mut managed = slot.process.lock().await;
        let config = &slot.role.config;

        let current = self.probe_locked(slot, &mut managed).await;
        slot.observe(current.state);
        if current.is_running() {
            if managed.is_some() {
                component_debug!(ComponentId::current(), "{} already running (pid {:?})", role, current.pid);
                return Ok(SupervisorOutcome::succeeded(role.clone(), current.pid));
            }
            return Ok(self.claim_existing(slot, &mut managed, current).await);
        }

        if config.mode == ServerMode::Connect {
            slot.set_state(ProcessState::Stopped);
            return Ok(self.fail(
                slot,
                FailureReason::LivenessTimeout,
                format!("connect mode: nothing listening on {}:{}", config.host, config.port),
            ));
        }

        let command = match config.resolve_command() {
            Ok(command) => command,
            Err(message) => {
                slot.set_state(ProcessState::Stopped);
                return Ok(self.fail(slot, FailureReason::ConfigError, message));
            }
        };

        slot.set_state(ProcessState::Starting);
        let mut process = match self.spawn(slot, &command).await {
            Ok(process) => process,
            Err(message) => {
                slot.set_state(ProcessState::Stopped);
                return Ok(self.fail(slot, FailureReason::SpawnError, message));
            }
        };

        tokio::time::sleep(self.timings.start_grace).await;

        let confirmed = match process.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => Ok(()),
            Some(Ok(Some(status))) => Err(format!("exited during startup with {status}")),
            Some(Err(e)) => Err(format!("could not poll process: {e}")),
            None => Err("no process handle".to_string()),
        };

        match confirmed {
            Ok(()) => {
                let pid = process.pid;
                *managed = Some(process);
                slot.set_state(ProcessState::Running);
                component_info!(ComponentId::current(), "✅ Started {} (pid {:?})", role, pid);
                Ok(SupervisorOutcome::succeeded(role.clone(), pid))
            }
            Err(message) => {
                if let Some(child) = process.child.as_mut() {
                    let _ = child.start_kill();
                    let _ = child.try_wait();
                }
                process.settle_drains().await;
                let stderr = self.stderr_lines(slot).await;
                slot.set_state(ProcessState::Stopped);
                let detail = if stderr.is_empty() {
                    message
                } else {
                    format!("{message}; stderr:\n{}", stderr.join("\n"))
                };
                Ok(self.fail(slot, FailureReason::LivenessTimeout, detail))
            }
        }
    }

    /// Stop a role's process, escalating to a kill after the grace window.
    ///
    /// A role that is already stopped is a no-op success.
    pub async fn stop(&self, role: &RoleName) -> SupervisorResult<SupervisorOutcome> {
        let slot = self.slot(role)?;
        let mut managed = slot.process.lock().await;
        let config = &slot.role.config;
        let own_pid = std::process::id();

        let current = self.probe_locked(slot, &mut managed).await;
        slot.observe(current.state);
        if !current.is_running() {
            *managed = None;
            return Ok(SupervisorOutcome::succeeded(role.clone(), None));
        }

        slot.set_state(ProcessState::Stopping);
        let mut process = managed.take();
        let target = process
            .as_ref()
            .and_then(ManagedProcess::signal_target)
            .or_else(|| current.pid.filter(|pid| *pid != own_pid).map(SignalTarget::Process));
        let target_pid = target.map(|t| t.pid());

        match target {
            Some(target) => {
                if let Err(e) = signals::terminate(target).await {
                    component_debug!(ComponentId::current(), "terminate {:?} for {} failed: {}", target, role, e);
                }
            }
            None => {
                component_debug!(ComponentId::current(), "{} has no known pid, waiting on the port", role);
            }
        }

        let mut escalated = false;
        if !self
            .wait_until_gone(slot, &mut process, target_pid, self.timings.stop_grace)
            .await
        {
            escalated = true;
            component_warn!(
                ComponentId::current(),
                "⏱️ {} ignored terminate for {:?}, escalating to kill",
                role,
                self.timings.stop_grace
            );

            let mut targets: Vec<SignalTarget> = target.into_iter().collect();
            if let Some(owner) = self.ports.port_owner(config.port).await {
                if owner != own_pid && Some(owner) != target_pid {
                    targets.push(SignalTarget::Process(owner));
                }
            }
            if targets.is_empty() {
                component_warn!(ComponentId::current(), "{}: no process found to kill on port {}", role, config.port);
            }
            for target in &targets {
                if let Err(e) = signals::kill(*target).await {
                    component_debug!(ComponentId::current(), "kill {:?} for {} failed: {}", target, role, e);
                }
            }
            self.wait_until_gone(slot, &mut process, target_pid, self.timings.kill_confirm)
                .await;
        }

        if let Some(process) = process.as_mut() {
            process.settle_drains().await;
        }
        drop(process);

        let mut last = self.probe_locked(slot, &mut managed).await;
        if last.is_running() && !escalated {
            // A grandchild or a foreign process may still hold the port
            if let Some(pid) = last.pid.filter(|pid| *pid != own_pid) {
                escalated = true;
                component_warn!(ComponentId::current(), "⏱️ {} port still held by pid {}, killing", role, pid);
                if let Err(e) = signals::kill(SignalTarget::Process(pid)).await {
                    component_debug!(ComponentId::current(), "kill pid {} for {} failed: {}", pid, role, e);
                }
                let mut none = None;
                self.wait_until_gone(slot, &mut none, Some(pid), self.timings.kill_confirm)
                    .await;
                last = self.probe_locked(slot, &mut managed).await;
            }
        }

        if last.is_running() {
            // Left for the next probe to settle
            slot.set_state(ProcessState::Unknown);
            let detail = format!(
                "still running after stop (pid {:?}, detected via {:?})",
                last.pid, last.method
            );
            return Ok(self
                .fail(slot, FailureReason::ShutdownTimeout, detail)
                .with_escalated(escalated));
        }

        slot.set_state(ProcessState::Stopped);
        component_info!(
            ComponentId::current(),
            "🛑 Stopped {}{}",
            role,
            if escalated { " (killed)" } else { "" }
        );
        Ok(SupervisorOutcome::succeeded(role.clone(), current.pid).with_escalated(escalated))
    }

    /// Stop, pause for `restart_delay`, then start.
    ///
    /// A failed stop is reported as is and start is not attempted.
    pub async fn restart(&self, role: &RoleName) -> SupervisorResult<SupervisorOutcome> {
        let stopped = self.stop(role).await?;
        if !stopped.ok {
            component_warn!(ComponentId::current(), "⚠️ Restart of {} aborted, stop failed", role);
            return Ok(stopped);
        }
        tokio::time::sleep(self.timings.restart_delay).await;
        let escalated = stopped.escalated;
        let started = self.start(role).await?;
        Ok(started.with_escalated(escalated))
    }

    /// Layered liveness check; also reconciles the recorded state
    pub async fn status(&self, role: &RoleName) -> SupervisorResult<ProcessStatus> {
        let slot = self.slot(role)?;
        let mut managed = slot.process.lock().await;
        let status = self.probe_locked(slot, &mut managed).await;
        slot.observe(status.state);
        Ok(status)
    }

    pub async fn is_running(&self, role: &RoleName) -> SupervisorResult<bool> {
        Ok(self.status(role).await?.is_running())
    }

    /// Stop every role, in name order
    pub async fn stop_all(&self) -> SupervisorResult<Vec<SupervisorOutcome>> {
        let mut outcomes = Vec::with_capacity(self.slots.len());
        for role in self.slots.keys() {
            outcomes.push(self.stop(role).await?);
        }
        Ok(outcomes)
    }

    /// Most recent stderr lines of the role's process
    pub async fn stderr_tail(&self, role: &RoleName) -> SupervisorResult<Vec<String>> {
        let slot = self.slot(role)?;
        Ok(self.stderr_lines(slot).await)
    }

    /// How long the held process has been held, if any
    pub async fn uptime(&self, role: &RoleName) -> SupervisorResult<Option<chrono::Duration>> {
        let slot = self.slot(role)?;
        let managed = slot.process.lock().await;
        Ok(managed
            .as_ref()
            .map(|process| Utc::now() - process.started_at()))
    }

    /// Origin of the held process, if any
    pub async fn origin(&self, role: &RoleName) -> SupervisorResult<Option<ProcessOrigin>> {
        let slot = self.slot(role)?;
        let managed = slot.process.lock().await;
        Ok(managed.as_ref().map(ManagedProcess::origin))
    }

    async fn probe_locked(&self, slot: &RoleSlot, managed: &mut Option<ManagedProcess>) -> ProcessStatus {
        let role = slot.role.name.clone();
        let config = &slot.role.config;
        let attached = matches!(managed, Some(process) if process.origin == ProcessOrigin::Attached);
        let running = |pid: Option<u32>, method: DetectionMethod| ProcessStatus {
            role: role.clone(),
            state: ProcessState::Running,
            pid,
            method: if attached { DetectionMethod::Attached } else { method },
        };

        if let Some(process) = managed.as_mut() {
            if self.handle_alive(process) {
                return running(process.pid, DetectionMethod::Handle);
            }
            if !attached {
                component_info!(ComponentId::current(), "{} process {:?} has exited", role, process.pid);
                process.settle_drains().await;
                *managed = None;
            }
        }

        if let Some(pid) = self.ports.port_owner(config.port).await {
            if self.processes.is_alive(pid) {
                return running(Some(pid), DetectionMethod::PortOwner);
            }
        }

        if self.socket_probe(&config.host, config.port).await {
            return running(None, DetectionMethod::SocketConnect);
        }

        if attached {
            *managed = None;
        }
        ProcessStatus {
            role,
            state: ProcessState::Stopped,
            pid: None,
            method: DetectionMethod::None,
        }
    }

    fn handle_alive(&self, process: &mut ManagedProcess) -> bool {
        match process.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => process
                .pid
                .map(|pid| self.processes.is_alive(pid))
                .unwrap_or(false),
        }
    }

    async fn socket_probe(&self, host: &str, port: u16) -> bool {
        tokio::time::timeout(self.timings.connect_probe, self.ports.is_listening(host, port))
            .await
            .unwrap_or(false)
    }

    async fn is_gone(&self, slot: &RoleSlot, process: &mut Option<ManagedProcess>, pid: Option<u32>) -> bool {
        if let Some(child) = process.as_mut().and_then(|p| p.child.as_mut()) {
            return !matches!(child.try_wait(), Ok(None));
        }
        match pid {
            Some(pid) => !self.processes.is_alive(pid),
            None => {
                let config = &slot.role.config;
                !self.socket_probe(&config.host, config.port).await
            }
        }
    }

    async fn wait_until_gone(
        &self,
        slot: &RoleSlot,
        process: &mut Option<ManagedProcess>,
        pid: Option<u32>,
        window: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            if self.is_gone(slot, process, pid).await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    /// Something already serves the role's port and we hold no process
    async fn claim_existing(
        &self,
        slot: &RoleSlot,
        managed: &mut Option<ManagedProcess>,
        current: ProcessStatus,
    ) -> SupervisorOutcome {
        let role = &slot.role.name;
        let config = &slot.role.config;

        if config.mode == ServerMode::Connect {
            *managed = Some(ManagedProcess::external(current.pid, ProcessOrigin::Attached));
            component_info!(
                ComponentId::current(),
                "🔗 Attached {} to existing listener on {}:{}",
                role,
                config.host,
                config.port
            );
            return SupervisorOutcome::succeeded(role.clone(), current.pid);
        }

        let owner = match current.pid {
            Some(pid) => Some(pid),
            None => self.ports.port_owner(config.port).await,
        };
        let command_line = owner.and_then(|pid| self.processes.command_line(pid));
        let ours = match (&command_line, config.script_file_name()) {
            (Some(command_line), Some(script)) => command_line.contains(&script),
            _ => false,
        };

        if ours && owner != Some(std::process::id()) {
            *managed = Some(ManagedProcess::external(owner, ProcessOrigin::Adopted));
            component_info!(
                ComponentId::current(),
                "🔗 Adopted externally started {} (pid {:?})",
                role,
                owner
            );
            return SupervisorOutcome::succeeded(role.clone(), owner);
        }

        let holder = match (owner, command_line) {
            (Some(pid), Some(command_line)) => format!("pid {pid} ({command_line})"),
            (Some(pid), None) => format!("pid {pid}"),
            (None, _) => "an unidentified process".to_string(),
        };
        let mut outcome = self.fail(
            slot,
            FailureReason::PortConflict,
            format!("port {} is held by {holder}", config.port),
        );
        outcome.pid = owner;
        outcome
    }

    async fn spawn(&self, slot: &RoleSlot, command: &ResolvedCommand) -> Result<ManagedProcess, String> {
        let role = &slot.role.name;
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).stdin(Stdio::null());
        detach_process_group(&mut cmd);

        match self.capture {
            OutputCapture::Drain => {
                tokio::fs::create_dir_all(&self.log_dir)
                    .await
                    .map_err(|e| format!("cannot create log dir {}: {e}", self.log_dir.display()))?;
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputCapture::Files => {
                let (stdout, stderr) = log_sink::open_log_files(&self.log_dir, role)
                    .await
                    .map_err(|e| format!("cannot open log files in {}: {e}", self.log_dir.display()))?;
                cmd.stdout(stdout).stderr(stderr);
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", command.program.display()))?;
        let pid = child.id();

        let mut drains = Vec::new();
        if self.capture == OutputCapture::Drain {
            slot.tail.clear();
            match log_sink::spawn_output_drains(&mut child, role, &self.log_dir, slot.tail.clone()).await {
                Ok(handles) => drains = handles,
                Err(e) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(format!("cannot open log files in {}: {e}", self.log_dir.display()));
                }
            }
        }

        component_debug!(
            ComponentId::current(),
            "spawned {} (pid {:?}): {} {}",
            role,
            pid,
            command.program.display(),
            command.args.join(" ")
        );
        Ok(ManagedProcess {
            child: Some(child),
            pid,
            origin: ProcessOrigin::Spawned,
            started_at: Utc::now(),
            drains,
        })
    }

    async fn stderr_lines(&self, slot: &RoleSlot) -> Vec<String> {
        match self.capture {
            OutputCapture::Drain => slot.tail.lines(),
            OutputCapture::Files => {
                let (_, stderr_path) = log_sink::role_log_paths(&self.log_dir, &slot.role.name);
                log_sink::read_tail(&stderr_path, STDERR_TAIL_LINES).await
            }
        }
    }

    fn fail(&self, slot: &RoleSlot, reason: FailureReason, detail: impl Into<String>) -> SupervisorOutcome {
        let detail = detail.into();
        component_warn!(ComponentId::current(), "⚠️ {} {}: {}", slot.role.name, reason, detail);
        SupervisorOutcome::failed(slot.role.name.clone(), reason, detail)
    }
}

#[cfg(unix)]
fn detach_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach_process_group(cmd: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[async_trait::async_trait]
impl RoleLiveness for ProcessSupervisor {
    fn role_names(&self) -> Vec<RoleName> {
        self.roles()
    }

    async fn probe_role(&self, role: &RoleName) -> ProcessStatus {
        self.status(role)
            .await
            .unwrap_or_else(|_| ProcessStatus::unknown(role.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::traits::{MockPortProbe, MockProcessTable};

    fn role(name: &str, port: u16) -> Role {
        let name = RoleName::from(name);
        let mut config = ServerConfig::defaults_for(&name);
        config.port = port;
        Role::new(name, config)
    }

    fn fast_timings() -> SupervisorTimings {
        SupervisorTimings {
            start_grace: Duration::from_millis(50),
            stop_grace: Duration::from_millis(100),
            kill_confirm: Duration::from_millis(100),
            restart_delay: Duration::from_millis(10),
            connect_probe: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn idle_backends() -> (Arc<dyn PortProbe>, Arc<dyn ProcessTable>) {
        let mut ports = MockPortProbe::new();
        ports.expect_port_owner().returning(|_| None);
        ports.expect_is_listening().returning(|_, _| false);
        let mut processes = MockProcessTable::new();
        processes.expect_is_alive().returning(|_| false);
        processes.expect_command_line().returning(|_| None);
        (Arc::new(ports), Arc::new(processes))
    }

    #[tokio::test]
    async fn test_unknown_role_is_an_error() {
        let (ports, processes) = idle_backends();
        let supervisor = ProcessSupervisor::new([role("rpc", 9875)], "logs").with_backends(ports, processes);

        let err = supervisor.start(&RoleName::from("nope")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownRole { .. }));
        assert!(supervisor.is_running(&RoleName::from("nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let (ports, processes) = idle_backends();
        let supervisor = ProcessSupervisor::new([role("rpc", 9875)], "logs")
            .with_backends(ports, processes)
            .with_timings(fast_timings());

        let outcome = supervisor.stop(&RoleName::from("rpc")).await.unwrap();
        assert!(outcome.ok);
        assert!(!outcome.escalated);
        assert_eq!(supervisor.recorded_state(&RoleName::from("rpc")).unwrap(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_missing_script_is_config_error() {
        let (ports, processes) = idle_backends();
        let supervisor = ProcessSupervisor::new([role("rpc", 9875)], "logs")
            .with_backends(ports, processes)
            .with_timings(fast_timings());

        let outcome = supervisor.start(&RoleName::from("rpc")).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.reason, Some(FailureReason::ConfigError));
    }

    #[tokio::test]
    async fn test_connect_mode_attaches_to_listener() {
        let mut ports = MockPortProbe::new();
        ports.expect_port_owner().returning(|_| None);
        ports.expect_is_listening().returning(|_, _| true);
        let mut processes = MockProcessTable::new();
        processes.expect_is_alive().returning(|_| false);

        let mut connect = role("protocol-server", 8000);
        connect.config.mode = ServerMode::Connect;
        let supervisor = ProcessSupervisor::new([connect], "logs")
            .with_backends(Arc::new(ports), Arc::new(processes))
            .with_timings(fast_timings());
        let name = RoleName::from("protocol-server");

        let outcome = supervisor.start(&name).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(supervisor.origin(&name).await.unwrap(), Some(ProcessOrigin::Attached));

        let status = supervisor.status(&name).await.unwrap();
        assert_eq!(status.method, DetectionMethod::Attached);
    }

    #[tokio::test]
    async fn test_connect_mode_never_spawns() {
        let (ports, processes) = idle_backends();
        let mut connect = role("protocol-server", 8000);
        connect.config.mode = ServerMode::Connect;
        connect.config.script = PathBuf::from("sh");
        let supervisor = ProcessSupervisor::new([connect], "logs")
            .with_backends(ports, processes)
            .with_timings(fast_timings());

        let outcome = supervisor.start(&RoleName::from("protocol-server")).await.unwrap();
        assert_eq!(outcome.reason, Some(FailureReason::LivenessTimeout));
        assert!(supervisor.origin(&RoleName::from("protocol-server")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_layered_liveness_prefers_port_owner() {
        let mut ports = MockPortProbe::new();
        ports.expect_port_owner().returning(|_| Some(4242));
        ports.expect_is_listening().never();
        let mut processes = MockProcessTable::new();
        processes.expect_is_alive().returning(|pid| pid == 4242);

        let supervisor = ProcessSupervisor::new([role("rpc", 9875)], "logs")
            .with_backends(Arc::new(ports), Arc::new(processes));

        let status = supervisor.status(&RoleName::from("rpc")).await.unwrap();
        assert!(status.is_running());
        assert_eq!(status.pid, Some(4242));
        assert_eq!(status.method, DetectionMethod::PortOwner);
    }

    #[tokio::test]
    async fn test_dead_port_owner_falls_through_to_socket_probe() {
        let mut ports = MockPortProbe::new();
        ports.expect_port_owner().returning(|_| Some(4242));
        ports.expect_is_listening().times(1).returning(|_, _| false);
        let mut processes = MockProcessTable::new();
        processes.expect_is_alive().returning(|_| false);

        let supervisor = ProcessSupervisor::new([role("rpc", 9875)], "logs")
            .with_backends(Arc::new(ports), Arc::new(processes));

        let status = supervisor.status(&RoleName::from("rpc")).await.unwrap();
        assert_eq!(status.state, ProcessState::Stopped);
        assert_eq!(status.method, DetectionMethod::None);
    }

    #[tokio::test]
    async fn test_own_pid_is_never_signalled() {
        let own_pid = std::process::id();
        let mut ports = MockPortProbe::new();
        ports.expect_port_owner().returning(move |_| Some(own_pid));
        ports.expect_is_listening().returning(|_, _| true);
        let mut processes = MockProcessTable::new();
        processes.expect_is_alive().returning(move |pid| pid == own_pid);
        processes.expect_command_line().returning(|_| None);

        let supervisor = ProcessSupervisor::new([role("rpc", 9875)], "logs")
            .with_backends(Arc::new(ports), Arc::new(processes))
            .with_timings(fast_timings());

        let name = RoleName::from("rpc");
        let outcome = supervisor.stop(&name).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.reason, Some(FailureReason::ShutdownTimeout));

        // A failed stop never jumps straight from stopping back to running
        assert_eq!(supervisor.recorded_state(&name).unwrap(), ProcessState::Unknown);
        assert!(supervisor.is_running(&name).await.unwrap());
        assert_eq!(supervisor.recorded_state(&name).unwrap(), ProcessState::Running);
    }

    #[tokio::test]
    async fn test_restart_does_not_start_after_failed_stop() {
        let own_pid = std::process::id();
        let mut ports = MockPortProbe::new();
        ports.expect_port_owner().returning(move |_| Some(own_pid));
        ports.expect_is_listening().returning(|_, _| true);
        let mut processes = MockProcessTable::new();
        processes.expect_is_alive().returning(move |pid| pid == own_pid);
        processes.expect_command_line().returning(|_| None);

        let mut spawnable = role("rpc", 9875);
        spawnable.config.script = PathBuf::from("sleep");
        spawnable.config.args = vec!["30".to_string()];
        let supervisor = ProcessSupervisor::new([spawnable], "logs")
            .with_backends(Arc::new(ports), Arc::new(processes))
            .with_timings(fast_timings());
        let name = RoleName::from("rpc");

        let outcome = supervisor.restart(&name).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.reason, Some(FailureReason::ShutdownTimeout));
        assert!(supervisor.origin(&name).await.unwrap().is_none());
        assert_ne!(supervisor.recorded_state(&name).unwrap(), ProcessState::Starting);

        let status = supervisor.status(&name).await.unwrap();
        assert_eq!(status.pid, Some(own_pid));
        assert_eq!(status.method, DetectionMethod::PortOwner);
    }

    #[test]
    fn test_illegal_edge_records_unknown() {
        let slot = RoleSlot::new(role("rpc", 9875));
        slot.set_state(ProcessState::Stopped);
        slot.set_state(ProcessState::Running);
        assert_eq!(slot.state(), ProcessState::Unknown);

        slot.set_state(ProcessState::Starting);
        assert_eq!(slot.state(), ProcessState::Starting);
    }

    #[test]
    fn test_observation_walks_legal_edges() {
        let slot = RoleSlot::new(role("rpc", 9875));
        slot.set_state(ProcessState::Stopped);
        slot.observe(ProcessState::Running);
        assert_eq!(slot.state(), ProcessState::Running);

        slot.observe(ProcessState::Stopped);
        assert_eq!(slot.state(), ProcessState::Stopped);
    }
}
