//! The RPC gateway: network calls in, host tasks out
//!
//! [`RpcGateway`] never touches host state. Each call becomes a task on the
//! [`TaskQueue`](super::TaskQueue) and the caller waits for the host tick
//! to run it. Ping goes through the queue too, so a pong proves the tick
//! is alive.

use std::sync::Arc;
use std::time::Duration;

use shared::{component_warn, ComponentId, GatewayStatus, RpcCall, RpcEnvelope, RpcReply};

use super::dispatch::dispatch;
use super::task_queue::{HostTicker, TaskQueue, TaskSubmitter};
use crate::state::GatewayStats;
use crate::traits::Host;

pub struct RpcGateway<H> {
    submitter: TaskSubmitter<H>,
    stats: Arc<GatewayStats>,
}

impl<H> Clone for RpcGateway<H> {
    fn clone(&self) -> Self {
        Self {
            submitter: self.submitter.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<H: Host> RpcGateway<H> {
    /// Create a gateway and the ticker the host thread must drive
    pub fn channel(tick_interval: Duration) -> (Self, HostTicker<H>) {
        let stats = Arc::new(GatewayStats::new(tick_interval));
        let (submitter, ticker) = TaskQueue::channel(stats.clone());
        (Self { submitter, stats }, ticker)
    }

    /// Run one call on the host and echo its correlation id
    pub async fn handle(&self, request: RpcEnvelope<RpcCall>) -> RpcEnvelope<RpcReply> {
        let RpcEnvelope { id, body: call } = request;
        let method = call.method();

        let reply = self
            .submitter
            .submit(id, method, move |host: &mut H| dispatch(call, host))
            .await;

        if let RpcReply::Outcome(outcome) = &reply {
            if !outcome.success {
                component_warn!(
                    ComponentId::current(),
                    "⚠️ Task {} ({}) failed: {}",
                    id,
                    method,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        RpcEnvelope { id, body: reply }
    }

    /// Convenience for in-process callers without an envelope
    pub async fn call(&self, call: RpcCall) -> RpcReply {
        self.handle(RpcEnvelope::new(call)).await.body
    }

    pub fn status(&self) -> GatewayStatus {
        self.stats.snapshot()
    }

    pub fn stats(&self) -> &Arc<GatewayStats> {
        &self.stats
    }

    /// Whether the host thread is still draining the queue
    pub fn is_host_connected(&self) -> bool {
        self.submitter.is_connected()
    }
}
