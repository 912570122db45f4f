//! Connectivity and detail backends for the status monitor

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::traits::{ConnectivityProbe, DetailFetcher};
use shared::{RpcClient, SharedError, SharedResult};

/// Connected when a TCP connect to `host:port` succeeds
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_millis(250),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ConnectivityProbe for TcpConnectProbe {
    async fn probe(&self) -> SharedResult<()> {
        let addr = format!("{}:{}", self.host, self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SharedError::transport(addr, e)),
            Err(_) => Err(SharedError::transport(addr, "connect timed out")),
        }
    }
}

/// Connected when the gateway answers `ping` with `true`
#[derive(Debug, Clone)]
pub struct RpcPingProbe {
    client: RpcClient,
}

impl RpcPingProbe {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectivityProbe for RpcPingProbe {
    async fn probe(&self) -> SharedResult<()> {
        if self.client.ping().await? {
            Ok(())
        } else {
            Err(SharedError::Remote {
                message: "gateway answered ping with false".to_string(),
            })
        }
    }
}

/// HTTP GET of a JSON status endpoint
#[derive(Debug, Clone)]
pub struct HttpDetailFetcher {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpDetailFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout: Duration::from_millis(1500),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetcher for a gateway's `GET /status`
    pub fn for_gateway(host: &str, port: u16) -> Self {
        Self::new(format!("http://{host}:{port}/status"))
    }
}

#[async_trait]
impl DetailFetcher for HttpDetailFetcher {
    async fn fetch(&self) -> SharedResult<serde_json::Value> {
        let response = self
            .http
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SharedError::transport(&self.url, e))?;

        if !response.status().is_success() {
            return Err(SharedError::transport(
                &self.url,
                format!("HTTP {}", response.status()),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| SharedError::ProtocolError { message: e.to_string() })
    }
}
