//! The dedicated host thread running the cooperative tick
//!
//! Host state moves onto this thread and never leaves it until shutdown.
//! The thread sleeps for one tick interval, drains the queue, and repeats.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use shared::{component_debug, component_info, ComponentId};

use crate::core::HostTicker;
use crate::error::{GatewayError, GatewayResult};

/// Default cooperative tick period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

pub struct HostThread<H> {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<H>,
}

/// Move `host` onto its own thread and tick it every `interval`
pub fn spawn_host_thread<H: Send + 'static>(
    mut host: H,
    mut ticker: HostTicker<H>,
    interval: Duration,
) -> GatewayResult<HostThread<H>> {
    let (stop, stopped) = mpsc::channel::<()>();

    let handle = thread::Builder::new()
        .name("host-tick".to_string())
        .spawn(move || {
            component_info!(ComponentId::current(), "🧵 Host tick every {:?}", interval);
            loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let report = ticker.tick(&mut host);
                        if report.executed > 0 {
                            component_debug!(
                                ComponentId::current(),
                                "Tick ran {} tasks ({} failed)",
                                report.executed,
                                report.failed
                            );
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let abandoned = ticker.close();
            component_info!(ComponentId::current(), "🧵 Host tick stopped, {} queued tasks abandoned", abandoned);
            host
        })?;

    Ok(HostThread { stop, handle })
}

impl<H> HostThread<H> {
    /// Stop ticking and hand the host back
    pub fn shutdown(self) -> GatewayResult<H> {
        let _ = self.stop.send(());
        self.handle.join().map_err(|_| GatewayError::HostThread {
            message: "host thread panicked".to_string(),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
