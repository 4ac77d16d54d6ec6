//! Acquisition session state machine and monitor loop.
//!
//! One engine drives one device handle. `start` arms the hardware and spawns
//! a monitor task; the task ticks on its [`MonitorStrategy`], pulls newly
//! available frames through the [`FrameBufferReader`], and emits
//! [`AcquisitionEvent`]s. Whatever path the session takes (natural finish,
//! abort, fault), `Finished` fires exactly once and the state returns to
//! `Idle`.

use crate::acquisition::monitor::MonitorStrategy;
use crate::acquisition::reader::FrameBufferReader;
use crate::acquisition::session::{CancelFlag, SessionHandle};
use camdaq_core::error::{CamError, CamResult};
use camdaq_core::events::AcquisitionEvent;
use camdaq_core::frame::{Frame, PixelFormat};
use camdaq_core::sdk::{CameraSdk, HardwareStatus};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Engine-side session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session active.
    Idle,
    /// `start` is preparing and starting the hardware.
    Arming,
    /// The monitor loop is running.
    Acquiring,
    /// A cancel was observed; the hardware abort is in flight.
    Aborting,
}

/// Per-session parameters the engine needs beyond the applied settings.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionPlan {
    /// Encoding to pull frames in. Must be a hardware encoding.
    pub format: PixelFormat,
    /// Frame width after binning.
    pub width: u32,
    /// Frame height after binning.
    pub height: u32,
    /// Achieved exposure time from the timings readback, seconds. Used for
    /// timestamp extrapolation when the device lacks metadata.
    pub exposure_s: f64,
}

/// Channel capacity for the event and frame broadcast channels. Slow
/// observers lag and drop rather than stall the monitor.
const BROADCAST_CAPACITY: usize = 256;

/// Drives acquisition sessions against one device handle.
pub struct AcquisitionEngine {
    sdk: Arc<dyn CameraSdk>,
    strategy: Arc<dyn MonitorStrategy>,
    state: Arc<Mutex<EngineState>>,
    event_tx: broadcast::Sender<AcquisitionEvent>,
    frame_tx: broadcast::Sender<Arc<Frame>>,
    reliable_tx: Arc<Mutex<Option<mpsc::Sender<Arc<Frame>>>>>,
}

impl AcquisitionEngine {
    /// Build an engine over an SDK handle with a chosen monitor strategy.
    pub fn new(sdk: Arc<dyn CameraSdk>, strategy: Arc<dyn MonitorStrategy>) -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (frame_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sdk,
            strategy,
            state: Arc::new(Mutex::new(EngineState::Idle)),
            event_tx,
            frame_tx,
            reliable_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Current session state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Whether a session is arming, acquiring, or aborting. Settings should
    /// not be mutated while this is true.
    pub fn is_active(&self) -> bool {
        *self.state.lock() != EngineState::Idle
    }

    /// Subscribe to session events. Lossy under observer lag.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to the lossy frame stream.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.frame_tx.subscribe()
    }

    /// Register a lossless frame output. The monitor awaits channel capacity,
    /// so the consumer applies backpressure; pass `None` to detach.
    pub fn register_frame_output(&self, tx: Option<mpsc::Sender<Arc<Frame>>>) {
        *self.reliable_tx.lock() = tx;
    }

    /// Start an acquisition session.
    ///
    /// Fails synchronously with [`CamError::AcquisitionInProgress`] if a
    /// session is active, [`CamError::InvalidState`] if the hardware is not
    /// idle, or the SDK error that rejected prepare/start. Hardware failures
    /// during arming also emit `Faulted` and `Finished` before returning.
    pub async fn start(&self, plan: AcquisitionPlan) -> CamResult<SessionHandle> {
        if !plan.format.is_hardware_encoding() {
            return Err(CamError::UnsupportedFormat(plan.format));
        }
        {
            let mut state = self.state.lock();
            if *state != EngineState::Idle {
                return Err(CamError::AcquisitionInProgress);
            }
            *state = EngineState::Arming;
        }

        match self.arm(&plan).await {
            Ok(handle) => Ok(handle),
            Err(err) => {
                // Precondition failures never created a session; hardware
                // failures did, and get the Faulted+Finished pair.
                if matches!(
                    err,
                    CamError::DeviceCommunication(_) | CamError::AcquisitionFault(_)
                ) {
                    self.emit(AcquisitionEvent::Faulted {
                        error: err.to_string(),
                    });
                    self.emit(AcquisitionEvent::Finished {
                        status: HardwareStatus::Fault,
                    });
                }
                *self.state.lock() = EngineState::Idle;
                Err(err)
            }
        }
    }

    async fn arm(&self, plan: &AcquisitionPlan) -> CamResult<SessionHandle> {
        self.sdk.ensure_current().await?;
        let status = self.sdk.status().await?;
        if status != HardwareStatus::Idle {
            return Err(CamError::InvalidState {
                actual: status.to_string(),
            });
        }

        self.sdk.prepare_acquisition().await?;
        let started_at = Utc::now();
        self.sdk.start_acquisition().await?;

        *self.state.lock() = EngineState::Acquiring;
        self.emit(AcquisitionEvent::Started {
            status: HardwareStatus::Acquiring,
        });
        tracing::info!(
            strategy = self.strategy.describe(),
            exposure_s = plan.exposure_s,
            "acquisition started"
        );

        let cancel = Arc::new(CancelFlag::default());
        let (finished_tx, finished_rx) = oneshot::channel();
        let monitor = MonitorTask {
            sdk: self.sdk.clone(),
            strategy: self.strategy.clone(),
            state: self.state.clone(),
            event_tx: self.event_tx.clone(),
            frame_tx: self.frame_tx.clone(),
            reliable_tx: self.reliable_tx.clone(),
            reader: FrameBufferReader::new(self.sdk.clone(), plan.width, plan.height),
            cancel: cancel.clone(),
            format: plan.format,
            started_at,
            exposure_s: plan.exposure_s,
        };
        tokio::spawn(monitor.run(finished_tx));

        Ok(SessionHandle::new(cancel, finished_rx))
    }

    fn emit(&self, event: AcquisitionEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Terminal outcome of the monitor loop. A tick that should keep looping
/// yields no outcome.
enum TickOutcome {
    /// Hardware left the Acquiring state on its own.
    Completed(HardwareStatus),
    /// Cancellation was observed.
    Cancelled,
    /// A hardware call failed mid-session.
    Faulted(CamError),
}

struct MonitorTask {
    sdk: Arc<dyn CameraSdk>,
    strategy: Arc<dyn MonitorStrategy>,
    state: Arc<Mutex<EngineState>>,
    event_tx: broadcast::Sender<AcquisitionEvent>,
    frame_tx: broadcast::Sender<Arc<Frame>>,
    reliable_tx: Arc<Mutex<Option<mpsc::Sender<Arc<Frame>>>>>,
    reader: FrameBufferReader,
    cancel: Arc<CancelFlag>,
    format: PixelFormat,
    started_at: DateTime<Utc>,
    exposure_s: f64,
}

impl MonitorTask {
    async fn run(self, finished_tx: oneshot::Sender<()>) {
        let mut last_pulled: u64 = 0;
        let outcome = loop {
            tokio::select! {
                () = self.cancel.cancelled() => break TickOutcome::Cancelled,
                () = self.strategy.wait_tick() => {}
            }
            if self.cancel.is_cancelled() {
                break TickOutcome::Cancelled;
            }
            if let Some(outcome) = self.tick(&mut last_pulled).await {
                break outcome;
            }
        };

        let final_status = match outcome {
            TickOutcome::Cancelled => {
                *self.state.lock() = EngineState::Aborting;
                let status = self.abort_hardware().await;
                self.emit(AcquisitionEvent::Aborted { status });
                status
            }
            TickOutcome::Completed(status) => {
                tracing::info!(frames = last_pulled, "acquisition completed");
                status
            }
            TickOutcome::Faulted(err) => {
                tracing::error!(error = %err, "acquisition faulted");
                // Leave the hardware consistent; teardown failures are
                // logged and swallowed so teardown always completes.
                let _ = self.abort_hardware().await;
                self.emit(AcquisitionEvent::Faulted {
                    error: err.to_string(),
                });
                HardwareStatus::Fault
            }
        };

        // Single exit point: Finished fires exactly once, the state returns
        // to Idle unconditionally, and the completion source resolves.
        self.emit(AcquisitionEvent::Finished {
            status: final_status,
        });
        *self.state.lock() = EngineState::Idle;
        let _ = finished_tx.send(());
    }

    async fn tick(&self, last_pulled: &mut u64) -> Option<TickOutcome> {
        let status = match self.sdk.status().await {
            Ok(s) => s,
            Err(e) => return Some(TickOutcome::Faulted(e.into())),
        };
        let progress = match self.sdk.progress().await {
            Ok(p) => p,
            Err(e) => return Some(TickOutcome::Faulted(e.into())),
        };
        self.emit(AcquisitionEvent::StatusChecked {
            status,
            time: Utc::now(),
            progress,
        });

        let range = match self.sdk.available_frame_range().await {
            Ok(r) => r,
            Err(e) => return Some(TickOutcome::Faulted(e.into())),
        };
        if let Some((first, last)) = range {
            let from = (*last_pulled + 1).max(first);
            for index in from..=last {
                if self.cancel.is_cancelled() {
                    return Some(TickOutcome::Cancelled);
                }
                match self.pull_and_forward(index).await {
                    Ok(()) => *last_pulled = index,
                    Err(e) => return Some(TickOutcome::Faulted(e)),
                }
            }
        }

        if status != HardwareStatus::Acquiring {
            // Frames pulled above were the final drain of the ring buffer.
            Some(TickOutcome::Completed(status))
        } else {
            None
        }
    }

    async fn pull_and_forward(&self, index: u64) -> CamResult<()> {
        let timestamp = self.timestamp_for(index).await;
        let Some(frame) = self.reader.pull_one(index, self.format, timestamp).await? else {
            // Raced the ring buffer; the next tick retries this index.
            tracing::trace!(index, "frame announced but not yet readable");
            return Ok(());
        };
        let frame = Arc::new(frame);
        self.emit(AcquisitionEvent::NewFrameAvailable {
            index,
            timestamp: frame.timestamp,
        });
        let _ = self.frame_tx.send(frame.clone());
        let reliable = self.reliable_tx.lock().clone();
        if let Some(tx) = reliable {
            if tx.send(frame).await.is_err() {
                tracing::warn!(index, "lossless frame output closed, detaching");
                *self.reliable_tx.lock() = None;
            }
        }
        Ok(())
    }

    /// Hardware metadata when the device provides it, otherwise
    /// extrapolation from the session start and the achieved exposure.
    async fn timestamp_for(&self, index: u64) -> DateTime<Utc> {
        match self.sdk.metadata_timestamp(index).await {
            Ok(Some(offset)) => {
                self.started_at
                    + ChronoDuration::microseconds(offset.as_micros().min(i64::MAX as u128) as i64)
            }
            Ok(None) => self.extrapolate(index),
            Err(err) => {
                tracing::debug!(index, error = %err, "metadata timestamp query failed, extrapolating");
                self.extrapolate(index)
            }
        }
    }

    fn extrapolate(&self, index: u64) -> DateTime<Utc> {
        let offset_us = self.exposure_s * 1e6 * index as f64;
        self.started_at + ChronoDuration::microseconds(offset_us as i64)
    }

    async fn abort_hardware(&self) -> HardwareStatus {
        match self.sdk.abort_acquisition().await {
            Ok(halted) => {
                tracing::info!(halted, "hardware abort completed");
            }
            Err(err) => {
                // Teardown rule: log and swallow so teardown completes.
                tracing::warn!(error = %err, "hardware abort failed during teardown");
            }
        }
        self.sdk
            .status()
            .await
            .unwrap_or(HardwareStatus::Idle)
    }

    fn emit(&self, event: AcquisitionEvent) {
        let _ = self.event_tx.send(event);
    }
}
