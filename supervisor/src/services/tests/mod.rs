//! Service-specific tests
//!
//! Parser tests run everywhere; the probes that touch real sockets use
//! loopback listeners bound to an ephemeral port.

#[cfg(test)]
mod port_probe;

#[cfg(test)]
pub mod common {
    use std::time::Duration;

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

    /// Bind a loopback listener on an ephemeral port
    pub async fn loopback_listener() -> (tokio::net::TcpListener, u16) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    /// A port that was free a moment ago
    pub fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }
}
