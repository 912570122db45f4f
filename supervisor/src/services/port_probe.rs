//! Real port probe implementation
//!
//! `is_listening` is a plain socket connect with a short timeout. Port
//! ownership is platform specific:
//! - Linux: `/proc/net/tcp{,6}` listening inodes matched against `/proc/<pid>/fd`
//! - other Unix: `lsof -t`
//! - Windows: `netstat -ano`

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::traits::PortProbe;
use shared::{component_debug, ComponentId};

/// Kernel socket state code for LISTEN in `/proc/net/tcp`
const TCP_LISTEN: &str = "0A";

/// Real port probe backed by the operating system
#[derive(Debug, Clone)]
pub struct SystemPortProbe {
    connect_timeout: Duration,
}

impl SystemPortProbe {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_millis(250),
        }
    }

    /// Configure the connect probe timeout (fluent API)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for SystemPortProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortProbe for SystemPortProbe {
    async fn is_listening(&self, host: &str, port: u16) -> bool {
        let addr = format!("{host}:{port}");
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                component_debug!(ComponentId::current(), "connect probe {} refused: {}", addr, e);
                false
            }
            Err(_) => {
                component_debug!(ComponentId::current(), "connect probe {} timed out", addr);
                false
            }
        }
    }

    async fn port_owner(&self, port: u16) -> Option<u32> {
        platform_port_owner(port).await
    }
}

#[cfg(target_os = "linux")]
async fn platform_port_owner(port: u16) -> Option<u32> {
    tokio::task::spawn_blocking(move || proc_port_owner(port))
        .await
        .ok()
        .flatten()
}

#[cfg(all(unix, not(target_os = "linux")))]
async fn platform_port_owner(port: u16) -> Option<u32> {
    let output = tokio::process::Command::new("lsof")
        .arg("-nP")
        .arg(format!("-iTCP:{port}"))
        .arg("-sTCP:LISTEN")
        .arg("-t")
        .output()
        .await
        .ok()?;

    // lsof exits non-zero when nothing matches
    if !output.status.success() {
        return None;
    }
    parse_lsof_pids(&String::from_utf8_lossy(&output.stdout)).into_iter().next()
}

#[cfg(windows)]
async fn platform_port_owner(port: u16) -> Option<u32> {
    let output = tokio::process::Command::new("netstat")
        .arg("-ano")
        .output()
        .await
        .ok()?;
    parse_netstat_owner(&String::from_utf8_lossy(&output.stdout), port)
}

#[cfg(target_os = "linux")]
fn proc_port_owner(port: u16) -> Option<u32> {
    let mut inodes = Vec::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        if let Ok(text) = std::fs::read_to_string(table) {
            inodes.extend(parse_proc_net_listeners(&text, port));
        }
    }
    if inodes.is_empty() {
        return None;
    }

    let wanted: Vec<String> = inodes.iter().map(|inode| format!("socket:[{inode}]")).collect();
    for entry in std::fs::read_dir("/proc").ok()?.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) else {
            continue;
        };
        // Other users' fd tables are unreadable without privileges
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Ok(target) = std::fs::read_link(fd.path()) {
                if wanted.iter().any(|w| target.as_os_str() == w.as_str()) {
                    return Some(pid);
                }
            }
        }
    }
    None
}

/// Socket inodes listening on `port` in a `/proc/net/tcp` style table
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_net_listeners(table: &str, port: u16) -> Vec<u64> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != TCP_LISTEN {
                return None;
            }
            let (_, port_hex) = fields[1].rsplit_once(':')?;
            let local_port = u16::from_str_radix(port_hex, 16).ok()?;
            if local_port != port {
                return None;
            }
            fields[9].parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// PIDs printed by `lsof -t`, one per line
#[cfg_attr(not(all(unix, not(target_os = "linux"))), allow(dead_code))]
pub(crate) fn parse_lsof_pids(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Owner PID of a TCP listener on `port` in `netstat -ano` output
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parse_netstat_owner(output: &str, port: u16) -> Option<u32> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || !fields[0].eq_ignore_ascii_case("tcp") || fields[3] != "LISTENING" {
            return None;
        }
        let (_, local_port) = fields[1].rsplit_once(':')?;
        if local_port.parse::<u16>().ok()? != port {
            return None;
        }
        fields[4].parse::<u32>().ok()
    })
}
