//! Supervise the real gateway binary and drive it over RPC

#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use shared::{RoleName, RpcClient};
use supervisor::{ProcessSupervisor, Role, ServerConfig};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_supervised_gateway_executes_code() {
    let dir = tempfile::tempdir().unwrap();
    let role = RoleName::from(RoleName::PROTOCOL_SERVER);

    let mut config = ServerConfig::defaults_for(&role);
    config.script = PathBuf::from(env!("CARGO_BIN_EXE_gateway"));
    config.port = free_port();
    config.args.extend(["--tick-ms".to_string(), "50".to_string()]);
    let client = RpcClient::new(&config.host, config.port);

    let supervisor = ProcessSupervisor::new([Role::new(role.clone(), config)], dir.path());

    let started = supervisor.start(&role).await.unwrap();
    assert!(started.ok, "{started:?}");
    assert!(supervisor.is_running(&role).await.unwrap());

    // The listener comes up shortly after the process does
    let deadline = Instant::now() + Duration::from_secs(1);
    while !client.ping().await.unwrap_or(false) {
        assert!(Instant::now() < deadline, "gateway never answered ping");
        sleep(Duration::from_millis(20)).await;
    }

    let outcome = client.execute_code("x=1+1").await.unwrap();
    assert!(outcome.success, "{outcome:?}");

    let stopped = supervisor.stop(&role).await.unwrap();
    assert!(stopped.ok, "{stopped:?}");

    let mut running = true;
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        running = supervisor.is_running(&role).await.unwrap();
        if !running {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(!running);
}
