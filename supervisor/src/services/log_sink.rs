//! Drains a managed child's stdout/stderr into per-role log files
//!
//! Every piped stream must be consumed or the child blocks on a full pipe.
//! Lines go to `<log_dir>/<role>_stdout.log` and `<role>_stderr.log`; the
//! most recent stderr lines are also kept in memory so a failed start can
//! report why.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

use shared::{component_debug, component_warn, ComponentId, RoleName};

/// Stderr lines retained per role
pub const STDERR_TAIL_LINES: usize = 50;

/// Bounded ring of the most recent stderr lines
#[derive(Debug)]
pub struct StderrTail {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl StderrTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl Default for StderrTail {
    fn default() -> Self {
        Self::new(STDERR_TAIL_LINES)
    }
}

/// Log file paths for a role: `(stdout, stderr)`
pub fn role_log_paths(log_dir: &Path, role: &RoleName) -> (PathBuf, PathBuf) {
    (
        log_dir.join(format!("{role}_stdout.log")),
        log_dir.join(format!("{role}_stderr.log")),
    )
}

/// Take the child's piped streams and spawn one drain task per stream
pub async fn spawn_output_drains(
    child: &mut Child,
    role: &RoleName,
    log_dir: &Path,
    tail: Arc<StderrTail>,
) -> io::Result<Vec<JoinHandle<()>>> {
    tokio::fs::create_dir_all(log_dir).await?;
    let (stdout_path, stderr_path) = role_log_paths(log_dir, role);
    let mut drains = Vec::new();

    if let Some(stdout) = child.stdout.take() {
        let file = open_append(&stdout_path).await?;
        drains.push(tokio::spawn(drain(stdout, file, role.clone(), None)));
    }
    if let Some(stderr) = child.stderr.take() {
        let file = open_append(&stderr_path).await?;
        drains.push(tokio::spawn(drain(stderr, file, role.clone(), Some(tail))));
    }
    Ok(drains)
}

/// Open both role log files for direct redirection of a child's output
pub async fn open_log_files(log_dir: &Path, role: &RoleName) -> io::Result<(std::fs::File, std::fs::File)> {
    tokio::fs::create_dir_all(log_dir).await?;
    let (stdout_path, stderr_path) = role_log_paths(log_dir, role);
    let stdout = open_append(&stdout_path).await?.into_std().await;
    let stderr = open_append(&stderr_path).await?.into_std().await;
    Ok((stdout, stderr))
}

/// Last `count` lines of a log file; empty when it cannot be read
pub async fn read_tail(path: &Path, count: usize) -> Vec<String> {
    let Ok(bytes) = tokio::fs::read(path).await else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(count);
    lines[skip..].iter().map(|line| line.to_string()).collect()
}

async fn open_append(path: &Path) -> io::Result<File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

async fn drain<R>(stream: R, mut file: File, role: RoleName, tail: Option<Arc<StderrTail>>)
where
    R: AsyncRead + Unpin,
{
    // Raw bytes: a child printing invalid UTF-8 must not stop the drain
    let mut reader = BufReader::new(stream);
    let mut record = Vec::new();
    let mut write_failed = false;

    loop {
        record.clear();
        match reader.read_until(b'\n', &mut record).await {
            Ok(0) => break,
            Ok(_) => {
                if !write_failed {
                    if let Err(e) = file.write_all(&record).await {
                        // Keep draining so the child never blocks
                        component_warn!(ComponentId::current(), "⚠️ {} log write failed: {}", role, e);
                        write_failed = true;
                    }
                }
                if let Some(tail) = &tail {
                    let line = String::from_utf8_lossy(&record);
                    tail.push(line.trim_end_matches(['\r', '\n']).to_string());
                }
            }
            Err(e) => {
                component_debug!(ComponentId::current(), "{} output stream closed: {}", role, e);
                break;
            }
        }
    }
    let _ = file.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_most_recent_lines() {
        let tail = StderrTail::new(3);
        for i in 0..5 {
            tail.push(format!("line {i}"));
        }
        assert_eq!(tail.lines(), vec!["line 2", "line 3", "line 4"]);

        tail.clear();
        assert!(tail.lines().is_empty());
    }

    #[test]
    fn test_log_paths_are_per_role() {
        let (out, err) = role_log_paths(Path::new("/var/log/bridge"), &RoleName::from("rpc"));
        assert_eq!(out, PathBuf::from("/var/log/bridge/rpc_stdout.log"));
        assert_eq!(err, PathBuf::from("/var/log/bridge/rpc_stderr.log"));
    }

    #[tokio::test]
    async fn test_read_tail_of_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpc_stderr.log");
        assert!(read_tail(&path, 2).await.is_empty());

        std::fs::write(&path, "a\nb\nc\n").unwrap();
        assert_eq!(read_tail(&path, 2).await, vec!["b", "c"]);
        assert_eq!(read_tail(&path, 10).await, vec!["a", "b", "c"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_drains_write_files_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let role = RoleName::from("protocol-server");
        let tail = Arc::new(StderrTail::default());

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("echo ready; echo boom >&2")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let drains = spawn_output_drains(&mut child, &role, dir.path(), tail.clone())
            .await
            .unwrap();
        child.wait().await.unwrap();
        for drain in drains {
            drain.await.unwrap();
        }

        let (out, err) = role_log_paths(dir.path(), &role);
        assert_eq!(std::fs::read_to_string(out).unwrap(), "ready\n");
        assert_eq!(std::fs::read_to_string(err).unwrap(), "boom\n");
        assert_eq!(tail.lines(), vec!["boom"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_drain() {
        let dir = tempfile::tempdir().unwrap();
        let role = RoleName::from("protocol-server");
        let tail = Arc::new(StderrTail::default());

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("printf '\\377\\n' >&2; sleep 0.2; echo after >&2; echo done")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let drains = spawn_output_drains(&mut child, &role, dir.path(), tail.clone())
            .await
            .unwrap();
        let status = child.wait().await.unwrap();
        for drain in drains {
            drain.await.unwrap();
        }

        assert!(status.success());
        let (out, err) = role_log_paths(dir.path(), &role);
        assert_eq!(std::fs::read_to_string(out).unwrap(), "done\n");
        assert_eq!(std::fs::read(&err).unwrap(), b"\xff\nafter\n".to_vec());
        assert_eq!(tail.lines(), vec!["\u{FFFD}".to_string(), "after".to_string()]);
        assert_eq!(read_tail(&err, 1).await, vec!["after"]);
    }
}
