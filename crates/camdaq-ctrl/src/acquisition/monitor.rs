//! Monitor pacing strategies.
//!
//! The monitor loop is identical regardless of how it learns that something
//! may have happened; only the wait differs. [`MonitorStrategy`] isolates
//! that wait so the engine runs unchanged against polling hardware and
//! event-capable hardware.

use async_trait::async_trait;
use camdaq_core::sdk::CameraSdk;
use std::sync::Arc;
use std::time::Duration;

/// How the monitor loop paces itself between ticks.
#[async_trait]
pub trait MonitorStrategy: Send + Sync {
    /// Park until the next tick is due.
    async fn wait_tick(&self);

    /// Strategy name for logs.
    fn describe(&self) -> &'static str;
}

/// Fixed-interval polling. Works against any hardware.
pub struct PollingMonitor {
    interval: Duration,
}

impl PollingMonitor {
    /// Poll at the given interval.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl MonitorStrategy for PollingMonitor {
    async fn wait_tick(&self) {
        tokio::time::sleep(self.interval).await;
    }

    fn describe(&self) -> &'static str {
        "polling"
    }
}

/// Wake on the driver's frame-arrival event, with a bounded fallback
/// timeout so a lost event degrades to a slow poll instead of a hang.
pub struct EventDrivenMonitor {
    sdk: Arc<dyn CameraSdk>,
    timeout: Duration,
}

impl EventDrivenMonitor {
    /// Wait on frame events from `sdk`, never longer than `timeout` per tick.
    pub fn new(sdk: Arc<dyn CameraSdk>, timeout: Duration) -> Self {
        Self { sdk, timeout }
    }
}

#[async_trait]
impl MonitorStrategy for EventDrivenMonitor {
    async fn wait_tick(&self) {
        // Timeout and error both just mean "tick now"; the loop re-reads
        // status and the frame range either way.
        if let Err(err) = self.sdk.wait_frame_event(self.timeout).await {
            tracing::debug!(error = %err, "frame event wait failed, ticking anyway");
        }
    }

    fn describe(&self) -> &'static str {
        "event-driven"
    }
}

/// Pick the strategy the hardware supports: event-driven when the driver
/// offers frame events, polling otherwise.
pub fn choose(
    sdk: Arc<dyn CameraSdk>,
    poll_interval: Duration,
    event_timeout: Duration,
) -> Arc<dyn MonitorStrategy> {
    if sdk.supports_frame_events() {
        Arc::new(EventDrivenMonitor::new(sdk, event_timeout))
    } else {
        Arc::new(PollingMonitor::new(poll_interval))
    }
}
