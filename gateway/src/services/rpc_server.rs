//! HTTP front end of the gateway
//!
//! `POST /rpc` takes one JSON [`RpcEnvelope`] and answers with the reply
//! envelope carrying the same id. Domain failures are `200` responses with
//! a failed outcome; only an unreadable request is a `400`.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use shared::{component_debug, component_info, ComponentId, RpcCall, RpcEnvelope, RpcReply};

use crate::core::RpcGateway;
use crate::error::{GatewayError, GatewayResult};
use crate::traits::Host;

pub struct RpcServer<H> {
    gateway: RpcGateway<H>,
}

impl<H: Host> RpcServer<H> {
    pub fn new(gateway: RpcGateway<H>) -> Self {
        Self { gateway }
    }

    /// Build the Axum router with all routes
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/rpc", post(rpc_handler::<H>))
            .route("/status", get(status_handler::<H>))
            .route("/health", get(health_check::<H>))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).into_inner())
            .with_state(self.gateway.clone())
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn run(self, addr: SocketAddr, shutdown: impl Future<Output = ()> + Send + 'static) -> GatewayResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::startup(addr, e))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> GatewayResult<()> {
        let addr = listener.local_addr()?;
        component_info!(ComponentId::current(), "🌐 RPC gateway listening on http://{}", addr);

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Decode a request body, answering undecodable ones with a nil-id failure
pub fn decode_request(body: &[u8]) -> Result<RpcEnvelope<RpcCall>, RpcEnvelope<RpcReply>> {
    serde_json::from_slice(body).map_err(|e| RpcEnvelope {
        id: Uuid::nil(),
        body: RpcReply::failure(format!("Invalid request: {e}")),
    })
}

async fn rpc_handler<H: Host>(State(gateway): State<RpcGateway<H>>, body: Bytes) -> impl IntoResponse {
    match decode_request(&body) {
        Ok(request) => {
            component_debug!(ComponentId::current(), "→ {} {}", request.id, request.body.method());
            (StatusCode::OK, Json(gateway.handle(request).await))
        }
        Err(rejection) => (StatusCode::BAD_REQUEST, Json(rejection)),
    }
}

async fn status_handler<H: Host>(State(gateway): State<RpcGateway<H>>) -> impl IntoResponse {
    Json(gateway.status())
}

async fn health_check<H: Host>(State(gateway): State<RpcGateway<H>>) -> impl IntoResponse {
    let host_connected = gateway.is_host_connected();
    let status = if host_connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if host_connected { "ok" } else { "host_stopped" },
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
