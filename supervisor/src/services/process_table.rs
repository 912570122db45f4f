//! Process table backed by sysinfo

use std::sync::Mutex;
use sysinfo::{Pid, ProcessStatus as OsProcessStatus, System};

use crate::traits::ProcessTable;

/// Real process table; refreshes one PID per query
pub struct SysinfoProcessTable {
    system: Mutex<System>,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(mut system) = self.system.lock() else {
            return false;
        };
        let pid = Pid::from_u32(pid);
        if !system.refresh_process(pid) {
            return false;
        }
        // An unreaped zombie still has a table entry
        system
            .process(pid)
            .map(|process| !matches!(process.status(), OsProcessStatus::Zombie | OsProcessStatus::Dead))
            .unwrap_or(false)
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        let mut system = self.system.lock().ok()?;
        let pid = Pid::from_u32(pid);
        if !system.refresh_process(pid) {
            return None;
        }
        let process = system.process(pid)?;
        let cmd = process.cmd();
        if cmd.is_empty() {
            Some(process.name().to_string())
        } else {
            Some(cmd.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        let table = SysinfoProcessTable::new();
        let pid = std::process::id();
        assert!(table.is_alive(pid));
        assert!(table.command_line(pid).is_some());
    }

    #[test]
    fn test_unused_pid_is_not_alive() {
        let table = SysinfoProcessTable::new();
        // Above the default Linux pid_max and Windows' practical range
        assert!(!table.is_alive(4_000_000_000));
        assert!(table.command_line(4_000_000_000).is_none());
    }
}
