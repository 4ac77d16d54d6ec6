//! The hardware command boundary.
//!
//! [`CameraSdk`] is the single seam between the controller and a vendor
//! driver. Everything the settings graph, acquisition engine, and frame
//! reader need from hardware crosses this trait; nothing else in the
//! workspace touches a native SDK. Implementations map raw vendor statuses
//! onto [`SdkError`](crate::error::SdkError) with a recoverable/fatal
//! severity.
//!
//! # Device focus
//!
//! The underlying driver treats the device handle as an exclusive,
//! process-wide resource: at most one device is "current" at a time.
//! [`CameraSdk::ensure_current`] reasserts focus for this handle and MUST be
//! called before a batch of commands when multiple devices coexist. This is
//! a documented side effect, not a hidden one.

use crate::capabilities::{
    AcquisitionMode, CapabilitySet, DeviceProperties, ReadoutMode, TriggerMode,
};
use crate::error::SdkError;
use crate::frame::{ImageArea, PixelBuffer, PixelFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result alias for SDK boundary calls.
pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// Coarse hardware state as reported by the status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareStatus {
    /// No acquisition running.
    Idle,
    /// An acquisition is in progress.
    Acquiring,
    /// The device reported an internal fault.
    Fault,
}

impl std::fmt::Display for HardwareStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HardwareStatus::Idle => "Idle",
            HardwareStatus::Acquiring => "Acquiring",
            HardwareStatus::Fault => "Fault",
        };
        write!(f, "{}", label)
    }
}

/// Progress through multi-frame timing cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleProgress {
    /// Completed accumulations within the current frame.
    pub accumulation: u32,
    /// Completed frames within the kinetic series.
    pub kinetic: u32,
}

/// Timings read back from the device after settings are applied.
///
/// The device rounds requested values to what its clocks can achieve, so
/// these are the authoritative numbers for downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionTimings {
    /// Actual exposure time, seconds.
    pub exposure_s: f64,
    /// Actual accumulate cycle time, seconds.
    pub accumulate_cycle_s: f64,
    /// Actual kinetic cycle time, seconds.
    pub kinetic_cycle_s: f64,
    /// Frames the driver ring buffer can hold with the applied geometry.
    pub buffer_frames: u64,
}

/// Async boundary to the vendor camera driver.
///
/// All methods take `&self`; implementations use interior mutability and are
/// `Send + Sync` so the monitor task and callers can share one handle.
#[async_trait]
pub trait CameraSdk: Send + Sync {
    /// Capability flags discovered at connect. Immutable for the handle's
    /// lifetime.
    fn capabilities(&self) -> Arc<CapabilitySet>;

    /// Detector geometry and tables discovered at connect. Immutable for the
    /// handle's lifetime.
    fn properties(&self) -> Arc<DeviceProperties>;

    /// Reassert process-wide focus on this device handle.
    async fn ensure_current(&self) -> SdkResult<()>;

    // --- settings commands -------------------------------------------------

    /// Select a vertical shift speed by table index.
    async fn set_vs_speed(&self, index: u8) -> SdkResult<()>;

    /// Select a vertical clock amplitude step.
    async fn set_vs_amplitude(&self, amplitude: u8) -> SdkResult<()>;

    /// Select an AD converter channel by index.
    async fn set_ad_converter(&self, index: u8) -> SdkResult<()>;

    /// Select an output amplifier by index.
    async fn set_output_amplifier(&self, index: u8) -> SdkResult<()>;

    /// Select a horizontal shift speed by index, for the given amplifier.
    async fn set_hs_speed(&self, amplifier: u8, index: u32) -> SdkResult<()>;

    /// Select a pre-amp gain by table index.
    async fn set_preamp_gain(&self, index: u8) -> SdkResult<()>;

    /// Set the electron-multiplication gain factor.
    async fn set_em_gain(&self, gain: i32) -> SdkResult<()>;

    /// Set the acquisition mode.
    async fn set_acquisition_mode(&self, mode: AcquisitionMode) -> SdkResult<()>;

    /// Set the readout mode.
    async fn set_readout_mode(&self, mode: ReadoutMode) -> SdkResult<()>;

    /// Set the trigger mode.
    async fn set_trigger_mode(&self, mode: TriggerMode) -> SdkResult<()>;

    /// Set the requested exposure time in seconds.
    async fn set_exposure_time(&self, seconds: f64) -> SdkResult<()>;

    /// Set the readout region and binning.
    async fn set_image_area(&self, area: ImageArea) -> SdkResult<()>;

    /// Configure the accumulation cycle.
    async fn set_accumulate_cycle(&self, frames: u32, interval_s: f64) -> SdkResult<()>;

    /// Configure the kinetic series cycle.
    async fn set_kinetic_cycle(&self, frames: u32, interval_s: f64) -> SdkResult<()>;

    // --- discovery queries -------------------------------------------------

    /// Number of horizontal speeds valid for an (AD converter, amplifier)
    /// pair. Valid combinations are only enumerable pairwise, hence the
    /// explicit arguments.
    async fn hs_speed_count(&self, adc: u8, amplifier: u8) -> SdkResult<u32>;

    /// Horizontal speed value in MHz for the given pair and index.
    async fn hs_speed(&self, adc: u8, amplifier: u8, index: u32) -> SdkResult<f64>;

    /// Whether a pre-amp gain index is usable with the given AD converter,
    /// amplifier, and horizontal speed. An unsupported combination is a
    /// `false` result, not an error.
    async fn preamp_gain_available(
        &self,
        adc: u8,
        amplifier: u8,
        hs_index: u32,
        gain_index: u8,
    ) -> SdkResult<bool>;

    /// EM gain range for the currently selected amplifier.
    async fn em_gain_range(&self) -> SdkResult<(i32, i32)>;

    /// Timings the device will actually use with the applied settings.
    async fn acquisition_timings(&self) -> SdkResult<AcquisitionTimings>;

    // --- acquisition commands ----------------------------------------------

    /// Allocate driver buffers and lock in settings ahead of start.
    async fn prepare_acquisition(&self) -> SdkResult<()>;

    /// Begin the acquisition.
    async fn start_acquisition(&self) -> SdkResult<()>;

    /// Abort a running acquisition.
    ///
    /// Returns `Ok(true)` if an active acquisition was halted, `Ok(false)` if
    /// the device was already idle. Both are success: abort is idempotent.
    async fn abort_acquisition(&self) -> SdkResult<bool>;

    /// Query the coarse hardware state.
    async fn status(&self) -> SdkResult<HardwareStatus>;

    /// Query accumulation/kinetic progress counters.
    async fn progress(&self) -> SdkResult<CycleProgress>;

    // --- frame store -------------------------------------------------------

    /// Inclusive `[first, last]` range of frame indices currently readable
    /// from the hardware ring buffer, or `None` if nothing is available yet.
    /// Indices are 1-based session-relative.
    async fn available_frame_range(&self) -> SdkResult<Option<(u64, u64)>>;

    /// Read a single frame by index. `None` means the frame is not yet
    /// available — an expected race with the acquisition clock.
    async fn read_frame(&self, index: u64, format: PixelFormat) -> SdkResult<Option<PixelBuffer>>;

    /// Bulk-read an inclusive index range as one flat buffer, frames
    /// concatenated in index order. There is no incremental form; callers
    /// must budget the range themselves.
    async fn read_frames(&self, first: u64, last: u64, format: PixelFormat)
        -> SdkResult<PixelBuffer>;

    /// Hardware metadata timestamp for a frame, as an offset from the
    /// session start. `None` if the device lacks metadata support.
    async fn metadata_timestamp(&self, index: u64) -> SdkResult<Option<Duration>>;

    // --- monitor support ----------------------------------------------------

    /// Whether the driver offers a frame-arrival wake primitive. Decided
    /// once, at connect; selects the monitor strategy.
    fn supports_frame_events(&self) -> bool;

    /// Block until the driver signals a new frame or the timeout elapses.
    /// Returns `true` if signaled, `false` on timeout. The bounded wait keeps
    /// the monitor loop live even if an event is lost.
    async fn wait_frame_event(&self, timeout: Duration) -> SdkResult<bool>;
}
