//! FIFO of closures marshalled onto the host thread
//!
//! The network side holds a [`TaskSubmitter`]; the host thread owns the
//! matching [`HostTicker`] and drains it once per cooperative tick. Every
//! task carries its own oneshot result channel, so concurrent callers can
//! never receive each other's replies.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use shared::{component_debug, component_error, ComponentId, FailureReason, RpcReply};

use crate::state::GatewayStats;

/// Work executed against live host state
pub type TaskWork<H> = Box<dyn FnOnce(&mut H) -> RpcReply + Send>;

/// One unit of work waiting for the host tick
pub struct RpcTask<H> {
    pub id: Uuid,
    pub method: &'static str,
    pub enqueued_at: Instant,
    work: TaskWork<H>,
    reply: oneshot::Sender<RpcReply>,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub executed: usize,
    pub failed: usize,
    pub panicked: usize,
}

pub struct TaskQueue;

impl TaskQueue {
    /// Create the two ends of a queue sharing `stats`
    pub fn channel<H>(stats: Arc<GatewayStats>) -> (TaskSubmitter<H>, HostTicker<H>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            TaskSubmitter {
                sender,
                stats: stats.clone(),
            },
            HostTicker { receiver, stats },
        )
    }
}

/// Network-side handle: enqueue work and wait for its result
pub struct TaskSubmitter<H> {
    sender: mpsc::UnboundedSender<RpcTask<H>>,
    stats: Arc<GatewayStats>,
}

impl<H> Clone for TaskSubmitter<H> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<H> TaskSubmitter<H> {
    /// Enqueue `work` without waiting for it
    pub fn enqueue<F>(&self, id: Uuid, method: &'static str, work: F) -> PendingReply
    where
        F: FnOnce(&mut H) -> RpcReply + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let task = RpcTask {
            id,
            method,
            enqueued_at: Instant::now(),
            work: Box::new(work),
            reply,
        };

        // Count before sending so the ticker never observes a negative depth
        self.stats.record_enqueued();
        if self.sender.send(task).is_err() {
            self.stats.record_dequeued();
            self.stats.record_result(false);
        }
        PendingReply { id, receiver }
    }

    /// Enqueue `work` and wait until a tick has executed it
    pub async fn submit<F>(&self, id: Uuid, method: &'static str, work: F) -> RpcReply
    where
        F: FnOnce(&mut H) -> RpcReply + Send + 'static,
    {
        self.enqueue(id, method, work).wait().await
    }

    /// Whether the host side still accepts work
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Result slot of an enqueued task
pub struct PendingReply {
    id: Uuid,
    receiver: oneshot::Receiver<RpcReply>,
}

impl PendingReply {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the result; a vanished host yields a failed outcome
    pub async fn wait(self) -> RpcReply {
        match self.receiver.await {
            Ok(reply) => reply,
            Err(_) => RpcReply::failure("host is not running"),
        }
    }
}

/// Host-side end of the queue, driven by the cooperative tick
pub struct HostTicker<H> {
    receiver: mpsc::UnboundedReceiver<RpcTask<H>>,
    stats: Arc<GatewayStats>,
}

impl<H> HostTicker<H> {
    /// Execute every task that was queued when this tick began, in order.
    ///
    /// Tasks enqueued while the tick runs wait for the next one. A panic
    /// inside a task becomes that task's failed result.
    pub fn tick(&mut self, host: &mut H) -> TickReport {
        let mut report = TickReport::default();
        let pending = self.receiver.len();

        for _ in 0..pending {
            let Ok(task) = self.receiver.try_recv() else {
                break;
            };
            self.stats.record_dequeued();
            report.executed += 1;

            let RpcTask {
                id,
                method,
                enqueued_at,
                work,
                reply,
            } = task;

            let result = match catch_unwind(AssertUnwindSafe(|| work(host))) {
                Ok(result) => result,
                Err(payload) => {
                    report.panicked += 1;
                    let message = panic_message(payload.as_ref());
                    component_error!(
                        ComponentId::current(),
                        "💥 Task {} ({}) panicked: {}",
                        id,
                        method,
                        message
                    );
                    RpcReply::failure(format!("{}: {message}", FailureReason::RpcExecutionError))
                }
            };

            let success = result.is_success();
            if !success {
                report.failed += 1;
            }
            self.stats.record_result(success);

            component_debug!(
                ComponentId::current(),
                "Task {} ({}) done after {:?}",
                id,
                method,
                enqueued_at.elapsed()
            );
            if reply.send(result).is_err() {
                component_debug!(ComponentId::current(), "Caller of task {} went away", id);
            }
        }

        self.stats.record_tick();
        report
    }

    /// Stop accepting work and fail everything still queued
    pub fn close(&mut self) -> usize {
        self.receiver.close();
        let mut abandoned = 0;
        while let Ok(task) = self.receiver.try_recv() {
            self.stats.record_dequeued();
            self.stats.record_result(false);
            let _ = task.reply.send(RpcReply::failure("host is shutting down"));
            abandoned += 1;
        }
        abandoned
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Outcome;
    use std::time::Duration;

    type Log = Vec<&'static str>;

    fn queue() -> (TaskSubmitter<Log>, HostTicker<Log>, Arc<GatewayStats>) {
        let stats = Arc::new(GatewayStats::new(Duration::from_millis(500)));
        let (submitter, ticker) = TaskQueue::channel(stats.clone());
        (submitter, ticker, stats)
    }

    fn record(entry: &'static str) -> impl FnOnce(&mut Log) -> RpcReply + Send + 'static {
        move |log: &mut Log| {
            log.push(entry);
            RpcReply::Outcome(Outcome::message(entry))
        }
    }

    #[tokio::test]
    async fn test_tasks_run_in_enqueue_order() {
        let (submitter, mut ticker, _) = queue();
        let first = submitter.enqueue(Uuid::new_v4(), "execute_code", record("T1"));
        let second = submitter.clone().enqueue(Uuid::new_v4(), "execute_code", record("T2"));

        let mut log = Log::new();
        let report = ticker.tick(&mut log);

        assert_eq!(log, vec!["T1", "T2"]);
        assert_eq!(report.executed, 2);
        assert_eq!(first.wait().await, RpcReply::Outcome(Outcome::message("T1")));
        assert_eq!(second.wait().await, RpcReply::Outcome(Outcome::message("T2")));
    }

    #[tokio::test]
    async fn test_caller_waits_for_tick() {
        let (submitter, mut ticker, stats) = queue();
        let caller = tokio::spawn(async move {
            submitter
                .submit(Uuid::new_v4(), "ping", |_: &mut Log| RpcReply::Pong(true))
                .await
        });

        while stats.queue_depth() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!caller.is_finished());

        ticker.tick(&mut Log::new());
        assert_eq!(caller.await.unwrap(), RpcReply::Pong(true));
        assert_eq!(stats.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_panic_fails_only_its_task() {
        let (submitter, mut ticker, stats) = queue();
        let boom = submitter.enqueue(Uuid::new_v4(), "execute_code", |_: &mut Log| -> RpcReply {
            panic!("host object vanished")
        });
        let after = submitter.enqueue(Uuid::new_v4(), "execute_code", record("after"));

        let mut log = Log::new();
        let report = ticker.tick(&mut log);
        assert_eq!(report.panicked, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(log, vec!["after"]);

        match boom.wait().await {
            RpcReply::Outcome(outcome) => {
                assert!(!outcome.success);
                let error = outcome.error.unwrap();
                assert!(error.starts_with("rpc_execution_error"));
                assert!(error.contains("host object vanished"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(after.wait().await.is_success());
        assert_eq!(stats.snapshot().tasks_failed, 1);
    }

    #[tokio::test]
    async fn test_tasks_enqueued_during_tick_wait_for_next() {
        let (submitter, mut ticker, _) = queue();
        let inner = submitter.clone();
        let late = Arc::new(std::sync::Mutex::new(None));
        let slot = late.clone();

        let _outer = submitter.enqueue(Uuid::new_v4(), "execute_code", move |log: &mut Log| {
            log.push("outer");
            let pending = inner.enqueue(Uuid::new_v4(), "execute_code", record("inner"));
            *slot.lock().unwrap() = Some(pending);
            RpcReply::Pong(true)
        });

        let mut log = Log::new();
        assert_eq!(ticker.tick(&mut log).executed, 1);
        assert_eq!(log, vec!["outer"]);
        assert_eq!(ticker.pending(), 1);

        assert_eq!(ticker.tick(&mut log).executed, 1);
        assert_eq!(log, vec!["outer", "inner"]);
        let pending = late.lock().unwrap().take().unwrap();
        assert!(pending.wait().await.is_success());
    }

    #[tokio::test]
    async fn test_gone_host_yields_failed_outcome() {
        let (submitter, ticker, _) = queue();
        drop(ticker);
        assert!(!submitter.is_connected());

        let reply = submitter.submit(Uuid::new_v4(), "ping", |_: &mut Log| RpcReply::Pong(true)).await;
        assert!(!reply.is_success());
    }

    #[tokio::test]
    async fn test_close_fails_queued_tasks() {
        let (submitter, mut ticker, stats) = queue();
        let pending = submitter.enqueue(Uuid::new_v4(), "recompute_document", record("never"));

        assert_eq!(ticker.close(), 1);
        assert!(!pending.wait().await.is_success());
        assert_eq!(stats.queue_depth(), 0);
    }
}
