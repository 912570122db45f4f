//! Gateway status reporting
//!
//! Body of the gateway's `GET /status` endpoint, fetched by the status
//! monitor as its detail blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GatewayStatus {
    /// Tasks waiting for the next host tick
    pub queue_depth: u64,
    pub tasks_enqueued: u64,
    pub tasks_completed: u64,
    /// Tasks whose outcome was a failure, including panics inside the tick
    pub tasks_failed: u64,
    pub ticks: u64,
    pub tick_interval_ms: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}
