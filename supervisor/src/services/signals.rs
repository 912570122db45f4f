//! Graceful terminate and forceful kill, per platform
//!
//! - Unix: SIGTERM / SIGKILL, to the whole process group for processes we
//!   spawned (they lead their own group) and to the bare PID otherwise
//! - Windows: `taskkill` (`/T` for the tree, `/F` to force)

use std::io;

/// What a signal is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTarget {
    /// A process group led by this PID
    Group(u32),
    /// A single process
    Process(u32),
}

impl SignalTarget {
    pub fn pid(&self) -> u32 {
        match self {
            SignalTarget::Group(pid) | SignalTarget::Process(pid) => *pid,
        }
    }
}

/// Ask the target to exit
pub async fn terminate(target: SignalTarget) -> io::Result<()> {
    guard_self(target)?;
    platform::terminate(target).await
}

/// Kill the target without giving it a chance to clean up
pub async fn kill(target: SignalTarget) -> io::Result<()> {
    guard_self(target)?;
    platform::kill(target).await
}

fn guard_self(target: SignalTarget) -> io::Result<()> {
    if target.pid() == std::process::id() || target.pid() == 0 {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("refusing to signal pid {}", target.pid()),
        ));
    }
    Ok(())
}

#[cfg(unix)]
mod platform {
    use super::SignalTarget;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use std::io;

    /// Positive raw pid; anything else would address a group or every process
    pub(super) fn raw_pid(pid: u32) -> io::Result<Pid> {
        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pid {pid} is out of range"),
            )),
        }
    }

    fn send(target: SignalTarget, signal: Signal) -> io::Result<()> {
        let result = match target {
            SignalTarget::Group(pid) => signal::killpg(raw_pid(pid)?, signal),
            SignalTarget::Process(pid) => signal::kill(raw_pid(pid)?, signal),
        };
        result.map_err(io::Error::from)
    }

    pub async fn terminate(target: SignalTarget) -> io::Result<()> {
        send(target, Signal::SIGTERM)
    }

    pub async fn kill(target: SignalTarget) -> io::Result<()> {
        send(target, Signal::SIGKILL)
    }
}

#[cfg(windows)]
mod platform {
    use super::SignalTarget;
    use std::io;
    use std::process::Stdio;
    use tokio::process::Command;

    async fn taskkill(target: SignalTarget, force: bool) -> io::Result<()> {
        let mut cmd = Command::new("taskkill");
        cmd.arg("/PID").arg(target.pid().to_string());
        if matches!(target, SignalTarget::Group(_)) {
            cmd.arg("/T");
        }
        if force {
            cmd.arg("/F");
        }
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("taskkill exited with {status}"),
            ))
        }
    }

    pub async fn terminate(target: SignalTarget) -> io::Result<()> {
        taskkill(target, false).await
    }

    pub async fn kill(target: SignalTarget) -> io::Result<()> {
        taskkill(target, true).await
    }
}
