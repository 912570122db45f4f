use super::common::{loopback_listener, unused_port};
use crate::services::port_probe::{
    parse_lsof_pids, parse_netstat_owner, parse_proc_net_listeners, SystemPortProbe,
};
use crate::traits::PortProbe;
use std::time::Duration;

const PROC_NET_TCP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:2693 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 48213 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F40 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 48377 1 0000000000000000 100 0 0 10 0
   2: 0100007F:2693 0100007F:C350 01 00000000:00000000 00:00000000 00000000  1000        0 51002 1 0000000000000000 20 4 30 10 -1
   3: 00000000:3039 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 0 1 0000000000000000 100 0 0 10 0
";

#[test]
fn test_proc_net_listener_matches_port_and_state() {
    // 0x2693 = 9875, only the LISTEN row counts
    assert_eq!(parse_proc_net_listeners(PROC_NET_TCP, 9875), vec![48213]);
    // 0x1F40 = 8000
    assert_eq!(parse_proc_net_listeners(PROC_NET_TCP, 8000), vec![48377]);
}

#[test]
fn test_proc_net_ignores_zero_inode_and_absent_ports() {
    // 0x3039 = 12345 listed with inode 0 (socket in another namespace)
    assert!(parse_proc_net_listeners(PROC_NET_TCP, 12345).is_empty());
    assert!(parse_proc_net_listeners(PROC_NET_TCP, 1).is_empty());
    assert!(parse_proc_net_listeners("", 9875).is_empty());
}

#[test]
fn test_lsof_pid_lines() {
    assert_eq!(parse_lsof_pids("4242\n4243\n"), vec![4242, 4243]);
    assert!(parse_lsof_pids("").is_empty());
    assert_eq!(parse_lsof_pids("garbage\n17\n"), vec![17]);
}

#[test]
fn test_netstat_owner() {
    let output = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1024
  TCP    127.0.0.1:9875         0.0.0.0:0              LISTENING       4242
  TCP    127.0.0.1:9875         127.0.0.1:50000        ESTABLISHED     4242
  TCP    [::]:8000              [::]:0                 LISTENING       777
  UDP    0.0.0.0:9875           *:*                                    999
";
    assert_eq!(parse_netstat_owner(output, 9875), Some(4242));
    assert_eq!(parse_netstat_owner(output, 8000), Some(777));
    assert_eq!(parse_netstat_owner(output, 12345), None);
}

#[tokio::test]
async fn test_is_listening_with_real_listener() {
    let (_listener, port) = loopback_listener().await;
    let probe = SystemPortProbe::new();
    assert!(probe.is_listening("127.0.0.1", port).await);
}

#[tokio::test]
async fn test_is_listening_false_on_closed_port() {
    let port = unused_port();
    let probe = SystemPortProbe::new().with_connect_timeout(Duration::from_millis(200));
    assert!(!probe.is_listening("127.0.0.1", port).await);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_port_owner_finds_this_process() {
    let (_listener, port) = loopback_listener().await;
    let probe = SystemPortProbe::new();
    assert_eq!(probe.port_owner(port).await, Some(std::process::id()));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_port_owner_none_when_nothing_listens() {
    let probe = SystemPortProbe::new();
    assert_eq!(probe.port_owner(unused_port()).await, None);
}
