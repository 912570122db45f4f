//! Throttled status monitor
//!
//! `check` refreshes the cached [`StatusSnapshot`] at most once per
//! `check_interval`; the detail fetch has its own looser window and only
//! runs while the client is connected. Getters read the cache and never
//! probe.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::MonitorSettings;
use crate::traits::{ConnectivityProbe, DetailFetcher, RoleLiveness};
use shared::{
    component_debug, component_info, ComponentId, FailureReason, ProcessStatus, RoleName, StatusSnapshot,
};

struct MonitorState {
    snapshot: StatusSnapshot,
    last_check: Option<Instant>,
    last_detail: Option<Instant>,
}

pub struct StatusMonitor {
    liveness: Arc<dyn RoleLiveness>,
    connectivity: Arc<dyn ConnectivityProbe>,
    detail: Option<Arc<dyn DetailFetcher>>,
    settings: MonitorSettings,
    state: Mutex<MonitorState>,
}

impl StatusMonitor {
    pub fn new(liveness: Arc<dyn RoleLiveness>, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        let roles = liveness
            .role_names()
            .into_iter()
            .map(|role| (role.clone(), ProcessStatus::unknown(role)))
            .collect();
        Self {
            liveness,
            connectivity,
            detail: None,
            settings: MonitorSettings::default(),
            state: Mutex::new(MonitorState {
                snapshot: StatusSnapshot {
                    roles,
                    ..StatusSnapshot::default()
                },
                last_check: None,
                last_detail: None,
            }),
        }
    }

    /// Configure the detail fetcher (fluent API)
    pub fn with_detail(mut self, detail: Arc<dyn DetailFetcher>) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Configure throttle windows (fluent API)
    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Refresh the snapshot unless the last check is too recent.
    ///
    /// Returns whether role statuses or connectivity changed.
    pub async fn check(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if !is_due(state.last_check, now, self.settings.check_interval) {
            return false;
        }
        state.last_check = Some(now);

        let mut roles = BTreeMap::new();
        for role in self.liveness.role_names() {
            let status = self.liveness.probe_role(&role).await;
            roles.insert(role, status);
        }

        let connected = match self.connectivity.probe().await {
            Ok(()) => true,
            Err(e) => {
                component_debug!(ComponentId::current(), "{}: {}", FailureReason::ProbeError, e);
                false
            }
        };

        let was_connected = state.snapshot.client_connected;
        let mut next = state.snapshot.clone();
        next.roles = roles;
        next.client_connected = connected;
        next.last_probe_at = Some(Utc::now());

        match (was_connected, connected) {
            (false, true) => {
                next.connected_since = Some(Utc::now());
                component_info!(ComponentId::current(), "🔗 Client connected");
            }
            (true, false) => {
                next.connected_since = None;
                next.detail = None;
                next.detail_fetched_at = None;
                state.last_detail = None;
                component_info!(ComponentId::current(), "🔌 Client disconnected");
            }
            _ => {}
        }

        if connected {
            if let Some(fetcher) = &self.detail {
                if is_due(state.last_detail, now, self.settings.detail_interval) {
                    state.last_detail = Some(now);
                    match tokio::time::timeout(self.settings.detail_timeout, fetcher.fetch()).await {
                        Ok(Ok(value)) => {
                            next.detail = Some(value);
                            next.detail_fetched_at = Some(Utc::now());
                        }
                        Ok(Err(e)) => {
                            component_debug!(ComponentId::current(), "detail fetch failed: {}", e);
                        }
                        Err(_) => {
                            component_debug!(
                                ComponentId::current(),
                                "detail fetch timed out after {:?}",
                                self.settings.detail_timeout
                            );
                        }
                    }
                }
            }
        }

        let changed = next.differs_from(&state.snapshot);
        if changed {
            next.generation += 1;
            next.last_change_at = Some(Utc::now());
        }
        state.snapshot = next;
        changed
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn role_status(&self, role: &RoleName) -> Option<ProcessStatus> {
        self.state.lock().await.snapshot.role(role).cloned()
    }

    pub async fn is_client_connected(&self) -> bool {
        self.state.lock().await.snapshot.client_connected
    }

    pub async fn detail(&self) -> Option<serde_json::Value> {
        self.state.lock().await.snapshot.detail.clone()
    }

    pub async fn connection_duration(&self) -> Option<chrono::Duration> {
        self.state.lock().await.snapshot.connection_duration(Utc::now())
    }
}

fn is_due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    last.map_or(true, |last| now.duration_since(last) >= interval)
}

/// Run `check` every `period`, publishing the snapshot whenever it changes
pub fn spawn_status_timer(
    monitor: Arc<StatusMonitor>,
    period: Duration,
) -> (JoinHandle<()>, watch::Receiver<StatusSnapshot>) {
    let (tx, rx) = watch::channel(StatusSnapshot::default());
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if monitor.check().await && tx.send(monitor.snapshot().await).is_err() {
                break;
            }
        }
    });
    (handle, rx)
}
