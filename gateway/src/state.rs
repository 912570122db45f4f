//! Gateway counters shared between the network side and the host tick

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use shared::GatewayStatus;

#[derive(Debug)]
pub struct GatewayStats {
    queue_depth: AtomicU64,
    tasks_enqueued: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    ticks: AtomicU64,
    tick_interval: Duration,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
    started: Instant,
}

impl GatewayStats {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            queue_depth: AtomicU64::new(0),
            tasks_enqueued: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            tick_interval,
            last_tick_at: Mutex::new(None),
            started: Instant::now(),
        }
    }

    pub fn record_enqueued(&self) {
        self.tasks_enqueued.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    /// A task left the queue, executed or not
    pub fn record_dequeued(&self) {
        // Saturate: a rejected send is dequeued without ever being received
        let _ = self
            .queue_depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |depth| depth.checked_sub(1));
    }

    pub fn record_result(&self, success: bool) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_tick_at.lock() {
            *last = Some(Utc::now());
        }
    }

    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn snapshot(&self) -> GatewayStatus {
        GatewayStatus {
            queue_depth: self.queue_depth(),
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            tick_interval_ms: self.tick_interval.as_millis() as u64,
            last_tick_at: self.last_tick_at.lock().ok().and_then(|last| *last),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = GatewayStats::new(Duration::from_millis(500));
        stats.record_enqueued();
        stats.record_enqueued();
        stats.record_dequeued();
        stats.record_result(true);
        stats.record_dequeued();
        stats.record_result(false);
        stats.record_tick();

        let status = stats.snapshot();
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.tasks_enqueued, 2);
        assert_eq!(status.tasks_completed, 2);
        assert_eq!(status.tasks_failed, 1);
        assert_eq!(status.ticks, 1);
        assert_eq!(status.tick_interval_ms, 500);
        assert!(status.last_tick_at.is_some());
    }

    #[test]
    fn test_depth_never_underflows() {
        let stats = GatewayStats::new(Duration::from_millis(500));
        stats.record_dequeued();
        assert_eq!(stats.queue_depth(), 0);
    }
}
