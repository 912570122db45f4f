//! Roles, timings and builders shared by the supervisor test suites

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shared::RoleName;
use supervisor::traits::{MockPortProbe, MockProcessTable};
use supervisor::{PortProbe, ProcessSupervisor, ProcessTable, Role, ServerConfig, SupervisorTimings};

/// Short delays so lifecycle tests finish quickly
pub fn fast_timings() -> SupervisorTimings {
    SupervisorTimings {
        start_grace: Duration::from_millis(200),
        stop_grace: Duration::from_millis(500),
        kill_confirm: Duration::from_secs(2),
        restart_delay: Duration::from_millis(50),
        connect_probe: Duration::from_millis(100),
        poll_interval: Duration::from_millis(20),
    }
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Role running `program args...` directly, on a free port
pub fn shell_role(name: &str, program: &str, args: &[&str]) -> Role {
    let name = RoleName::from(name);
    let mut config = ServerConfig::defaults_for(&name);
    config.script = PathBuf::from(program);
    config.port = free_port();
    config.args = args.iter().map(|arg| arg.to_string()).collect();
    Role::new(name, config)
}

/// Builder for supervisors over mocked OS backends
pub struct SupervisorBuilder {
    roles: Vec<Role>,
    ports: MockPortProbe,
    processes: MockProcessTable,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            roles: Vec::new(),
            ports: MockPortProbe::new(),
            processes: MockProcessTable::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Port `port` is held by `pid`, running `command_line`
    pub fn with_port_holder(mut self, port: u16, pid: u32, command_line: &str) -> Self {
        let command_line = command_line.to_string();
        self.ports
            .expect_port_owner()
            .returning(move |p| (p == port).then_some(pid));
        self.ports.expect_is_listening().returning(move |_, p| p == port);
        self.processes.expect_is_alive().returning(move |p| p == pid);
        self.processes
            .expect_command_line()
            .returning(move |p| (p == pid).then(|| command_line.clone()));
        self
    }

    pub fn build(self, log_dir: &std::path::Path) -> ProcessSupervisor {
        let ports: Arc<dyn PortProbe> = Arc::new(self.ports);
        let processes: Arc<dyn ProcessTable> = Arc::new(self.processes);
        ProcessSupervisor::new(self.roles, log_dir)
            .with_backends(ports, processes)
            .with_timings(fast_timings())
    }
}
