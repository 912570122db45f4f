//! Common test utilities for gateway integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use gateway::{serve_legacy_socket, spawn_host_thread, DocumentHost, GatewayResult, HostThread, RpcGateway, RpcServer};
use shared::RpcClient;

/// Short tick so calls complete quickly
pub const TEST_TICK: Duration = Duration::from_millis(20);

/// A gateway serving a fresh [`DocumentHost`] on loopback ports
pub struct TestGateway {
    pub gateway: RpcGateway<DocumentHost>,
    pub rpc_addr: SocketAddr,
    pub legacy_addr: SocketAddr,
    stop: watch::Sender<bool>,
    servers: Vec<JoinHandle<GatewayResult<()>>>,
    host_thread: HostThread<DocumentHost>,
}

impl TestGateway {
    pub async fn start() -> Self {
        Self::start_with(DocumentHost::new()).await
    }

    pub async fn start_with(host: DocumentHost) -> Self {
        let (gateway, ticker) = RpcGateway::channel(TEST_TICK);
        let host_thread = spawn_host_thread(host, ticker, TEST_TICK).unwrap();

        let rpc = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let legacy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let rpc_addr = rpc.local_addr().unwrap();
        let legacy_addr = legacy.local_addr().unwrap();

        let (stop, stopped) = watch::channel(false);
        let servers = vec![
            tokio::spawn(RpcServer::new(gateway.clone()).serve(rpc, stop_requested(stopped.clone()))),
            tokio::spawn(serve_legacy_socket(legacy, gateway.clone(), stop_requested(stopped))),
        ];

        Self {
            gateway,
            rpc_addr,
            legacy_addr,
            stop,
            servers,
            host_thread,
        }
    }

    pub fn client(&self) -> RpcClient {
        RpcClient::new("127.0.0.1", self.rpc_addr.port()).with_call_timeout(Duration::from_secs(5))
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.rpc_addr)
    }

    /// Stop both servers and the host thread, returning the host
    pub async fn shutdown(self) -> DocumentHost {
        let _ = self.stop.send(true);
        for server in self.servers {
            server.await.unwrap().unwrap();
        }
        self.host_thread.shutdown().unwrap()
    }
}

async fn stop_requested(mut stopped: watch::Receiver<bool>) {
    let _ = stopped.wait_for(|stop| *stop).await;
}
