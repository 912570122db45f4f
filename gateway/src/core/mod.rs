//! Core gateway logic: the task queue and the call dispatcher

pub mod dispatch;
pub mod gateway;
pub mod task_queue;

pub use dispatch::dispatch;
pub use gateway::RpcGateway;
pub use task_queue::{HostTicker, PendingReply, RpcTask, TaskQueue, TaskSubmitter, TickReport};
