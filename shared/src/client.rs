//! Async client for the gateway's RPC surface
//!
//! Mirrors the gateway's method table one-to-one. Every call is wrapped in a
//! fresh [`RpcEnvelope`] and the echoed id is checked on the way back.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::errors::{SharedError, SharedResult};
use crate::messages::{GatewayStatus, ObjectPayload, Outcome, RpcCall, RpcEnvelope, RpcReply};

/// Default timeout for calls that wait on the host tick
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for `ping`, used as a connectivity probe
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Clone, Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: String,
    call_timeout: Duration,
    ping_timeout: Duration,
}

impl RpcClient {
    /// Create a client for a gateway at `host:port`
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_base_url(format!("http://{host}:{port}"))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    /// Configure the timeout for host-bound calls (fluent API)
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Configure the ping timeout (fluent API)
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one call and return the raw reply
    pub async fn call(&self, call: RpcCall) -> SharedResult<RpcReply> {
        let timeout = match call {
            RpcCall::Ping => self.ping_timeout,
            _ => self.call_timeout,
        };
        let endpoint = format!("{}/rpc", self.base_url);
        let request = RpcEnvelope::new(call);

        let response = self
            .http
            .post(&endpoint)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| SharedError::transport(&endpoint, e))?;

        if !response.status().is_success() {
            return Err(SharedError::transport(
                &endpoint,
                format!("HTTP {}", response.status()),
            ));
        }

        let reply: RpcEnvelope<RpcReply> = response
            .json()
            .await
            .map_err(|e| SharedError::ProtocolError { message: e.to_string() })?;

        if reply.id != request.id {
            return Err(SharedError::CorrelationMismatch {
                sent: request.id.to_string(),
                received: reply.id.to_string(),
            });
        }
        Ok(reply.body)
    }

    pub async fn ping(&self) -> SharedResult<bool> {
        match self.call(RpcCall::Ping).await? {
            RpcReply::Pong(alive) => Ok(alive),
            other => Err(unexpected("ping", other)),
        }
    }

    pub async fn create_document(&self, name: &str) -> SharedResult<Outcome> {
        self.outcome(RpcCall::CreateDocument { name: name.to_string() }).await
    }

    pub async fn create_object(
        &self,
        doc: &str,
        type_id: &str,
        name: &str,
        properties: Map<String, Value>,
    ) -> SharedResult<Outcome> {
        self.outcome(RpcCall::CreateObject {
            doc: doc.to_string(),
            type_id: type_id.to_string(),
            name: name.to_string(),
            properties,
        })
        .await
    }

    pub async fn edit_object(
        &self,
        doc: &str,
        name: &str,
        properties: Map<String, Value>,
    ) -> SharedResult<Outcome> {
        self.outcome(RpcCall::EditObject {
            doc: doc.to_string(),
            name: name.to_string(),
            properties,
        })
        .await
    }

    pub async fn delete_object(&self, doc: &str, name: &str) -> SharedResult<Outcome> {
        self.outcome(RpcCall::DeleteObject {
            doc: doc.to_string(),
            name: name.to_string(),
        })
        .await
    }

    pub async fn execute_code(&self, source: &str) -> SharedResult<Outcome> {
        self.outcome(RpcCall::ExecuteCode { source: source.to_string() }).await
    }

    pub async fn recompute_document(&self, doc: &str) -> SharedResult<Outcome> {
        self.outcome(RpcCall::RecomputeDocument { doc: doc.to_string() }).await
    }

    pub async fn get_objects(&self, doc: &str) -> SharedResult<Vec<ObjectPayload>> {
        match self.call(RpcCall::GetObjects { doc: doc.to_string() }).await? {
            RpcReply::Objects(objects) => Ok(objects),
            other => Err(unexpected("get_objects", other)),
        }
    }

    pub async fn get_object(&self, doc: &str, name: &str) -> SharedResult<Option<ObjectPayload>> {
        let call = RpcCall::GetObject {
            doc: doc.to_string(),
            name: name.to_string(),
        };
        match self.call(call).await? {
            RpcReply::Object(object) => Ok(object),
            other => Err(unexpected("get_object", other)),
        }
    }

    pub async fn list_documents(&self) -> SharedResult<Vec<String>> {
        match self.call(RpcCall::ListDocuments).await? {
            RpcReply::Documents(names) => Ok(names),
            other => Err(unexpected("list_documents", other)),
        }
    }

    /// Base64 PNG of the active view, `None` when no view is available
    pub async fn get_active_screenshot(&self, view: &str) -> SharedResult<Option<String>> {
        let call = RpcCall::GetActiveScreenshot { view: view.to_string() };
        match self.call(call).await? {
            RpcReply::Screenshot(image) => Ok(image),
            other => Err(unexpected("get_active_screenshot", other)),
        }
    }

    /// Fetch the gateway's `GET /status` body
    pub async fn status(&self) -> SharedResult<GatewayStatus> {
        let endpoint = format!("{}/status", self.base_url);
        let response = self
            .http
            .get(&endpoint)
            .timeout(self.ping_timeout)
            .send()
            .await
            .map_err(|e| SharedError::transport(&endpoint, e))?;

        response
            .json()
            .await
            .map_err(|e| SharedError::ProtocolError { message: e.to_string() })
    }

    async fn outcome(&self, call: RpcCall) -> SharedResult<Outcome> {
        let method = call.method();
        match self.call(call).await? {
            RpcReply::Outcome(outcome) => Ok(outcome),
            other => Err(unexpected(method, other)),
        }
    }
}

/// A failed outcome in place of a data reply is a remote failure
fn unexpected(method: &str, reply: RpcReply) -> SharedError {
    match reply {
        RpcReply::Outcome(Outcome { success: false, error, .. }) => SharedError::Remote {
            message: error.unwrap_or_else(|| format!("{method} failed")),
        },
        other => SharedError::UnexpectedReply {
            method: method.to_string(),
            reply: other.kind().to_string(),
        },
    }
}
