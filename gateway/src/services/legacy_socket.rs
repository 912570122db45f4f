//! Line-oriented socket front end for older clients
//!
//! Each line is one JSON [`RpcEnvelope`]; each answer is one JSON line. A
//! line that does not parse gets a failed outcome with the nil id and the
//! connection stays open. A line longer than [`MAX_LINE_BYTES`] gets the
//! same failure and the connection is closed.

use std::future::Future;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use shared::{component_debug, component_info, component_warn, ComponentId, RpcEnvelope, RpcReply};
use uuid::Uuid;

use super::rpc_server::decode_request;
use crate::core::RpcGateway;
use crate::error::GatewayResult;
use crate::traits::Host;

/// Longest request line accepted, in bytes
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accept connections until `shutdown` resolves
pub async fn serve_legacy_socket<H: Host>(
    listener: TcpListener,
    gateway: RpcGateway<H>,
    shutdown: impl Future<Output = ()> + Send,
) -> GatewayResult<()> {
    let addr = listener.local_addr()?;
    component_info!(ComponentId::current(), "🔌 Legacy socket listening on {}", addr);

    let (closing, closed) = watch::channel(false);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    component_debug!(ComponentId::current(), "Legacy client {} connected", peer);
                    tokio::spawn(handle_connection(stream, gateway.clone(), closed.clone()));
                }
                Err(e) => {
                    component_warn!(ComponentId::current(), "⚠️ Legacy accept failed: {}", e);
                }
            },
            _ = &mut shutdown => break,
        }
    }

    let _ = closing.send(true);
    component_info!(ComponentId::current(), "🔌 Legacy socket on {} closed", addr);
    Ok(())
}

async fn handle_connection<H: Host>(stream: TcpStream, gateway: RpcGateway<H>, mut closed: watch::Receiver<bool>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64 + 1);
        let read = tokio::select! {
            read = limited.read_until(b'\n', &mut line) => read,
            _ = closed.changed() => break,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                component_debug!(ComponentId::current(), "Legacy client read failed: {}", e);
                break;
            }
        }

        let oversized = line.len() > MAX_LINE_BYTES;
        let response = if oversized {
            component_warn!(
                ComponentId::current(),
                "⚠️ Legacy request line over {} bytes, closing connection",
                MAX_LINE_BYTES
            );
            RpcEnvelope {
                id: Uuid::nil(),
                body: RpcReply::failure(format!("Invalid request: line exceeds {MAX_LINE_BYTES} bytes")),
            }
        } else {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match decode_request(&line) {
                Ok(request) => gateway.handle(request).await,
                Err(rejection) => rejection,
            }
        };

        let mut encoded = match serde_json::to_vec(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                component_warn!(ComponentId::current(), "⚠️ Encoding reply {} failed: {}", response.id, e);
                break;
            }
        };
        encoded.push(b'\n');
        if writer.write_all(&encoded).await.is_err() || oversized {
            break;
        }
    }
}
