//! Simulated camera SDK.
//!
//! [`MockSdk`] implements [`CameraSdk`] entirely in-process: a builder
//! configures detector geometry, speed tables, and capability flags; an
//! acquisition task generates frames on the exposure clock into an
//! index-addressed store that behaves like the hardware ring buffer. Error
//! injection via [`FailPoint`] lets tests drive every failure path without
//! hardware.

use async_trait::async_trait;
use camdaq_core::capabilities::{
    AcquisitionMode, AmplifierInfo, AmplifierKind, CapabilitySet, DeviceProperties, Feature,
    PreAmpGainInfo, ReadoutMode, TriggerMode,
};
use camdaq_core::error::SdkError;
use camdaq_core::frame::{ImageArea, PixelBuffer, PixelFormat};
use camdaq_core::sdk::{
    AcquisitionTimings, CameraSdk, CycleProgress, HardwareStatus, SdkResult,
};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Raw status codes the mock reports, in the style of vendor drivers.
pub mod codes {
    /// General command failure.
    pub const GENERAL_ERROR: u32 = 20013;
    /// A parameter was out of range for the simulated device.
    pub const INVALID_PARAMETER: u32 = 20066;
    /// A command arrived while the simulated device was acquiring.
    pub const ACQUIRING: u32 = 20072;
}

/// Operations the mock can be told to fail, for error-path tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Fail `ensure_current`.
    EnsureCurrent,
    /// Fail `prepare_acquisition`.
    Prepare,
    /// Fail `start_acquisition`.
    Start,
    /// Fail `abort_acquisition`.
    Abort,
    /// Fail `status` queries.
    Status,
    /// Fail `set_exposure_time`.
    SetExposure,
    /// Fail `acquisition_timings`.
    Timings,
    /// Fail bulk `read_frames`.
    ReadFrames,
}

/// Process-wide "current device" focus, one slot like the real driver.
static CURRENT_DEVICE: AtomicU64 = AtomicU64::new(0);
static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

const RING_CAPACITY_FRAMES: u64 = 64;

/// Builder for [`MockSdk`].
pub struct MockSdkBuilder {
    detector: (u32, u32),
    ad_bit_depths: Vec<u8>,
    amplifiers: Vec<AmplifierInfo>,
    vertical_speeds_us: Vec<f64>,
    vertical_amplitudes: Vec<u8>,
    preamp_gains: Vec<PreAmpGainInfo>,
    em_gain_range: (i32, i32),
    hs_table: Vec<Vec<Vec<f64>>>,
    unavailable_gains: HashSet<(u8, u8, u32, u8)>,
    removed_settable: HashSet<Feature>,
    metadata: bool,
    frame_events: bool,
    fail: HashSet<FailPoint>,
    fail_after: HashMap<FailPoint, u64>,
}

impl Default for MockSdkBuilder {
    fn default() -> Self {
        Self {
            detector: (64, 64),
            ad_bit_depths: vec![16, 32],
            amplifiers: vec![
                AmplifierInfo {
                    index: 0,
                    name: "Electron Multiplying".into(),
                    kind: AmplifierKind::ElectronMultiplying,
                    max_speed_mhz: 30.0,
                },
                AmplifierInfo {
                    index: 1,
                    name: "Conventional".into(),
                    kind: AmplifierKind::Conventional,
                    max_speed_mhz: 3.0,
                },
            ],
            vertical_speeds_us: vec![1.0, 3.0, 5.0, 10.0],
            vertical_amplitudes: vec![0, 1, 2, 3, 4],
            preamp_gains: vec![
                PreAmpGainInfo {
                    index: 0,
                    factor: 1.0,
                },
                PreAmpGainInfo {
                    index: 1,
                    factor: 2.4,
                },
                PreAmpGainInfo {
                    index: 2,
                    factor: 5.1,
                },
            ],
            em_gain_range: (1, 300),
            // hs_table[adc][amplifier] -> speeds in MHz
            hs_table: vec![
                vec![vec![30.0, 20.0, 10.0], vec![3.0, 1.0]],
                vec![vec![10.0, 5.0], vec![1.0]],
            ],
            unavailable_gains: HashSet::new(),
            removed_settable: HashSet::new(),
            metadata: false,
            frame_events: false,
            fail: HashSet::new(),
            fail_after: HashMap::new(),
        }
    }
}

impl MockSdkBuilder {
    /// Set detector size in pixels.
    pub fn detector(mut self, width: u32, height: u32) -> Self {
        self.detector = (width, height);
        self
    }

    /// Remove a feature from the settable capability set.
    pub fn without_settable(mut self, feature: Feature) -> Self {
        self.removed_settable.insert(feature);
        self
    }

    /// Mark a pre-amp gain combination as unavailable.
    pub fn unavailable_gain(mut self, adc: u8, amplifier: u8, hs: u32, gain: u8) -> Self {
        self.unavailable_gains.insert((adc, amplifier, hs, gain));
        self
    }

    /// Enable per-frame hardware metadata timestamps.
    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.metadata = enabled;
        self
    }

    /// Enable the frame-arrival wake primitive.
    pub fn with_frame_events(mut self, enabled: bool) -> Self {
        self.frame_events = enabled;
        self
    }

    /// Make the named operation fail with a recoverable status.
    pub fn fail_on(mut self, point: FailPoint) -> Self {
        self.fail.insert(point);
        self
    }

    /// Let the named operation succeed `calls` times, then fail every call
    /// after that. Drives mid-session failure paths that `fail_on` cannot
    /// reach because it trips the earliest caller.
    pub fn fail_after(mut self, point: FailPoint, calls: u64) -> Self {
        self.fail_after.insert(point, calls);
        self
    }

    /// Replace the output amplifier table.
    pub fn amplifiers(mut self, amplifiers: Vec<AmplifierInfo>) -> Self {
        self.amplifiers = amplifiers;
        self
    }

    /// Replace the horizontal speed table (`[adc][amplifier] -> MHz`).
    pub fn hs_table(mut self, table: Vec<Vec<Vec<f64>>>) -> Self {
        self.hs_table = table;
        self
    }

    /// Build the simulated SDK handle.
    pub fn build(self) -> MockSdk {
        let mut settable: HashSet<Feature> = [
            Feature::VsSpeed,
            Feature::VsAmplitude,
            Feature::AdConverter,
            Feature::OutputAmplifier,
            Feature::HsSpeed,
            Feature::PreAmpGain,
            Feature::AcquisitionMode,
            Feature::ReadoutMode,
            Feature::TriggerMode,
            Feature::ExposureTime,
            Feature::ImageArea,
            Feature::AccumulateCycle,
            Feature::KineticCycle,
            Feature::EmGain,
        ]
        .into_iter()
        .collect();
        for f in &self.removed_settable {
            settable.remove(f);
        }
        let gettable = settable.clone();

        let caps = CapabilitySet::new(
            settable,
            gettable,
            vec![
                AcquisitionMode::SingleScan,
                AcquisitionMode::Accumulation,
                AcquisitionMode::Kinetic,
                AcquisitionMode::FastKinetics,
                AcquisitionMode::RunTillAbort,
            ],
            vec![
                ReadoutMode::FullImage,
                ReadoutMode::FullVerticalBinning,
                ReadoutMode::SingleTrack,
                ReadoutMode::MultiTrack,
                ReadoutMode::RandomTrack,
            ],
            vec![
                TriggerMode::Internal,
                TriggerMode::External,
                TriggerMode::ExternalStart,
                TriggerMode::Software,
            ],
        );

        let props = DeviceProperties {
            detector: self.detector,
            temperature_range_c: (-80, 20),
            ad_bit_depths: self.ad_bit_depths,
            amplifiers: self.amplifiers,
            vertical_speeds_us: self.vertical_speeds_us,
            vertical_amplitudes: self.vertical_amplitudes,
            preamp_gains: self.preamp_gains,
            em_gain_range: self.em_gain_range,
        };

        MockSdk {
            id: NEXT_DEVICE_ID.fetch_add(1, Ordering::SeqCst),
            caps: Arc::new(caps),
            props: Arc::new(props),
            hs_table: self.hs_table,
            unavailable_gains: self.unavailable_gains,
            metadata: self.metadata,
            frame_events: self.frame_events,
            fail: self.fail,
            fail_after: self.fail_after,
            call_counts: Mutex::new(HashMap::new()),
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
        }
    }
}

#[derive(Default)]
struct Inner {
    selected_adc: Option<u8>,
    selected_amp: Option<u8>,
    amp_history: Vec<u8>,
    exposure_s: f64,
    acquisition_mode: Option<AcquisitionMode>,
    accumulate: Option<(u32, f64)>,
    kinetic: Option<(u32, f64)>,
    image_area: Option<ImageArea>,
    acquiring: bool,
    run_flag: Option<Arc<AtomicBool>>,
    frames: Vec<Vec<u16>>,
    frame_offsets: Vec<Duration>,
}

/// Simulated camera SDK handle.
pub struct MockSdk {
    id: u64,
    caps: Arc<CapabilitySet>,
    props: Arc<DeviceProperties>,
    hs_table: Vec<Vec<Vec<f64>>>,
    unavailable_gains: HashSet<(u8, u8, u32, u8)>,
    metadata: bool,
    frame_events: bool,
    fail: HashSet<FailPoint>,
    fail_after: HashMap<FailPoint, u64>,
    call_counts: Mutex<HashMap<FailPoint, u64>>,
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl MockSdk {
    /// Builder with sensible EMCCD-like defaults.
    pub fn builder() -> MockSdkBuilder {
        MockSdkBuilder::default()
    }

    fn check_fail(&self, point: FailPoint, call: &'static str) -> SdkResult<()> {
        if self.fail.contains(&point) {
            return Err(SdkError::recoverable(call, codes::GENERAL_ERROR));
        }
        if let Some(&threshold) = self.fail_after.get(&point) {
            let mut counts = self.call_counts.lock();
            let count = counts.entry(point).or_insert(0);
            *count += 1;
            if *count > threshold {
                return Err(SdkError::recoverable(call, codes::GENERAL_ERROR));
            }
        }
        Ok(())
    }

    /// Currently selected amplifier index, if any. Test support.
    pub fn selected_amplifier(&self) -> Option<u8> {
        self.inner.lock().selected_amp
    }

    /// Every amplifier index written to the device, in order. Test support.
    pub fn amplifier_history(&self) -> Vec<u8> {
        self.inner.lock().amp_history.clone()
    }

    /// Frames produced so far in the current/last session. Test support.
    pub fn produced_frames(&self) -> u64 {
        self.inner.lock().frames.len() as u64
    }

    fn target_frames(mode: AcquisitionMode, kinetic: Option<(u32, f64)>) -> u64 {
        match mode {
            AcquisitionMode::SingleScan | AcquisitionMode::Accumulation => 1,
            AcquisitionMode::Kinetic | AcquisitionMode::FastKinetics => {
                kinetic.map(|(n, _)| n as u64).unwrap_or(1)
            }
            AcquisitionMode::RunTillAbort => u64::MAX,
        }
    }

    fn generate_frame(width: u32, height: u32, index: u64) -> Vec<u16> {
        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u16; (width * height) as usize];
        for (i, px) in pixels.iter_mut().enumerate() {
            let base = ((i as u64 + index) % 4096) as u16;
            *px = base.saturating_add(rng.gen_range(0..64));
        }
        pixels
    }
}

#[async_trait]
impl CameraSdk for MockSdk {
    fn capabilities(&self) -> Arc<CapabilitySet> {
        self.caps.clone()
    }

    fn properties(&self) -> Arc<DeviceProperties> {
        self.props.clone()
    }

    async fn ensure_current(&self) -> SdkResult<()> {
        self.check_fail(FailPoint::EnsureCurrent, "ensure_current")?;
        let previous = CURRENT_DEVICE.swap(self.id, Ordering::SeqCst);
        if previous != self.id {
            tracing::trace!(device = self.id, previous, "reasserted device focus");
        }
        Ok(())
    }

    async fn set_vs_speed(&self, index: u8) -> SdkResult<()> {
        if (index as usize) >= self.props.vertical_speeds_us.len() {
            return Err(SdkError::recoverable("set_vs_speed", codes::INVALID_PARAMETER));
        }
        Ok(())
    }

    async fn set_vs_amplitude(&self, amplitude: u8) -> SdkResult<()> {
        if !self.props.vertical_amplitudes.contains(&amplitude) {
            return Err(SdkError::recoverable(
                "set_vs_amplitude",
                codes::INVALID_PARAMETER,
            ));
        }
        Ok(())
    }

    async fn set_ad_converter(&self, index: u8) -> SdkResult<()> {
        if (index as usize) >= self.props.ad_bit_depths.len() {
            return Err(SdkError::recoverable(
                "set_ad_converter",
                codes::INVALID_PARAMETER,
            ));
        }
        self.inner.lock().selected_adc = Some(index);
        Ok(())
    }

    async fn set_output_amplifier(&self, index: u8) -> SdkResult<()> {
        if (index as usize) >= self.props.amplifiers.len() {
            return Err(SdkError::recoverable(
                "set_output_amplifier",
                codes::INVALID_PARAMETER,
            ));
        }
        let mut inner = self.inner.lock();
        inner.selected_amp = Some(index);
        inner.amp_history.push(index);
        Ok(())
    }

    async fn set_hs_speed(&self, amplifier: u8, index: u32) -> SdkResult<()> {
        let inner = self.inner.lock();
        let adc = inner.selected_adc.unwrap_or(0);
        drop(inner);
        let speeds = self
            .hs_table
            .get(adc as usize)
            .and_then(|amps| amps.get(amplifier as usize))
            .ok_or_else(|| SdkError::recoverable("set_hs_speed", codes::INVALID_PARAMETER))?;
        if (index as usize) >= speeds.len() {
            return Err(SdkError::recoverable("set_hs_speed", codes::INVALID_PARAMETER));
        }
        Ok(())
    }

    async fn set_preamp_gain(&self, index: u8) -> SdkResult<()> {
        if (index as usize) >= self.props.preamp_gains.len() {
            return Err(SdkError::recoverable(
                "set_preamp_gain",
                codes::INVALID_PARAMETER,
            ));
        }
        Ok(())
    }

    async fn set_em_gain(&self, gain: i32) -> SdkResult<()> {
        let (low, high) = self.props.em_gain_range;
        if gain < low || gain > high {
            return Err(SdkError::recoverable("set_em_gain", codes::INVALID_PARAMETER));
        }
        Ok(())
    }

    async fn set_acquisition_mode(&self, mode: AcquisitionMode) -> SdkResult<()> {
        self.inner.lock().acquisition_mode = Some(mode);
        Ok(())
    }

    async fn set_readout_mode(&self, _mode: ReadoutMode) -> SdkResult<()> {
        Ok(())
    }

    async fn set_trigger_mode(&self, _mode: TriggerMode) -> SdkResult<()> {
        Ok(())
    }

    async fn set_exposure_time(&self, seconds: f64) -> SdkResult<()> {
        self.check_fail(FailPoint::SetExposure, "set_exposure_time")?;
        if seconds <= 0.0 {
            return Err(SdkError::recoverable(
                "set_exposure_time",
                codes::INVALID_PARAMETER,
            ));
        }
        self.inner.lock().exposure_s = seconds;
        Ok(())
    }

    async fn set_image_area(&self, area: ImageArea) -> SdkResult<()> {
        if area.validate(self.props.detector).is_err() {
            return Err(SdkError::recoverable(
                "set_image_area",
                codes::INVALID_PARAMETER,
            ));
        }
        self.inner.lock().image_area = Some(area);
        Ok(())
    }

    async fn set_accumulate_cycle(&self, frames: u32, interval_s: f64) -> SdkResult<()> {
        self.inner.lock().accumulate = Some((frames, interval_s));
        Ok(())
    }

    async fn set_kinetic_cycle(&self, frames: u32, interval_s: f64) -> SdkResult<()> {
        self.inner.lock().kinetic = Some((frames, interval_s));
        Ok(())
    }

    async fn hs_speed_count(&self, adc: u8, amplifier: u8) -> SdkResult<u32> {
        let speeds = self
            .hs_table
            .get(adc as usize)
            .and_then(|amps| amps.get(amplifier as usize))
            .ok_or_else(|| SdkError::recoverable("hs_speed_count", codes::INVALID_PARAMETER))?;
        Ok(speeds.len() as u32)
    }

    async fn hs_speed(&self, adc: u8, amplifier: u8, index: u32) -> SdkResult<f64> {
        let speeds = self
            .hs_table
            .get(adc as usize)
            .and_then(|amps| amps.get(amplifier as usize))
            .ok_or_else(|| SdkError::recoverable("hs_speed", codes::INVALID_PARAMETER))?;
        speeds
            .get(index as usize)
            .copied()
            .ok_or_else(|| SdkError::recoverable("hs_speed", codes::INVALID_PARAMETER))
    }

    async fn preamp_gain_available(
        &self,
        adc: u8,
        amplifier: u8,
        hs_index: u32,
        gain_index: u8,
    ) -> SdkResult<bool> {
        if (gain_index as usize) >= self.props.preamp_gains.len() {
            return Ok(false);
        }
        Ok(!self
            .unavailable_gains
            .contains(&(adc, amplifier, hs_index, gain_index)))
    }

    async fn em_gain_range(&self) -> SdkResult<(i32, i32)> {
        Ok(self.props.em_gain_range)
    }

    async fn acquisition_timings(&self) -> SdkResult<AcquisitionTimings> {
        self.check_fail(FailPoint::Timings, "acquisition_timings")?;
        let inner = self.inner.lock();
        let exposure = inner.exposure_s;
        let accumulate = inner
            .accumulate
            .map(|(_, i)| i.max(exposure))
            .unwrap_or(exposure);
        let kinetic = inner
            .kinetic
            .map(|(_, i)| i.max(accumulate))
            .unwrap_or(accumulate);
        Ok(AcquisitionTimings {
            exposure_s: exposure,
            accumulate_cycle_s: accumulate,
            kinetic_cycle_s: kinetic,
            buffer_frames: RING_CAPACITY_FRAMES,
        })
    }

    async fn prepare_acquisition(&self) -> SdkResult<()> {
        self.check_fail(FailPoint::Prepare, "prepare_acquisition")?;
        let inner = self.inner.lock();
        if inner.acquiring {
            return Err(SdkError::recoverable("prepare_acquisition", codes::ACQUIRING));
        }
        Ok(())
    }

    async fn start_acquisition(&self) -> SdkResult<()> {
        self.check_fail(FailPoint::Start, "start_acquisition")?;

        let (exposure_s, target, width, height, run_flag) = {
            let mut inner = self.inner.lock();
            if inner.acquiring {
                return Err(SdkError::recoverable("start_acquisition", codes::ACQUIRING));
            }
            let mode = inner
                .acquisition_mode
                .ok_or_else(|| SdkError::recoverable("start_acquisition", codes::GENERAL_ERROR))?;
            let (width, height) = inner
                .image_area
                .map(|a| (a.width(), a.height()))
                .unwrap_or(self.props.detector);
            let target = Self::target_frames(mode, inner.kinetic);
            let run_flag = Arc::new(AtomicBool::new(true));

            inner.acquiring = true;
            inner.run_flag = Some(run_flag.clone());
            inner.frames.clear();
            inner.frame_offsets.clear();
            (inner.exposure_s.max(0.001), target, width, height, run_flag)
        };

        let inner = self.inner.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            let exposure = Duration::from_secs_f64(exposure_s);
            let started = Instant::now();
            let mut produced: u64 = 0;
            while produced < target {
                tokio::time::sleep(exposure).await;
                if !run_flag.load(Ordering::SeqCst) {
                    break;
                }
                let pixels = Self::generate_frame(width, height, produced + 1);
                {
                    let mut guard = inner.lock();
                    guard.frames.push(pixels);
                    guard.frame_offsets.push(started.elapsed());
                }
                produced += 1;
                notify.notify_waiters();
            }
            inner.lock().acquiring = false;
            notify.notify_waiters();
        });

        Ok(())
    }

    async fn abort_acquisition(&self) -> SdkResult<bool> {
        self.check_fail(FailPoint::Abort, "abort_acquisition")?;
        let mut inner = self.inner.lock();
        if !inner.acquiring {
            // Already idle: idempotent success.
            return Ok(false);
        }
        if let Some(flag) = inner.run_flag.take() {
            flag.store(false, Ordering::SeqCst);
        }
        inner.acquiring = false;
        Ok(true)
    }

    async fn status(&self) -> SdkResult<HardwareStatus> {
        self.check_fail(FailPoint::Status, "status")?;
        let inner = self.inner.lock();
        Ok(if inner.acquiring {
            HardwareStatus::Acquiring
        } else {
            HardwareStatus::Idle
        })
    }

    async fn progress(&self) -> SdkResult<CycleProgress> {
        let inner = self.inner.lock();
        Ok(CycleProgress {
            accumulation: 0,
            kinetic: inner.frames.len() as u32,
        })
    }

    async fn available_frame_range(&self) -> SdkResult<Option<(u64, u64)>> {
        let inner = self.inner.lock();
        if inner.frames.is_empty() {
            Ok(None)
        } else {
            Ok(Some((1, inner.frames.len() as u64)))
        }
    }

    async fn read_frame(&self, index: u64, format: PixelFormat) -> SdkResult<Option<PixelBuffer>> {
        let inner = self.inner.lock();
        let Some(pixels) = inner.frames.get((index.max(1) - 1) as usize) else {
            return Ok(None);
        };
        match format {
            PixelFormat::Mono16 => Ok(Some(PixelBuffer::Mono16(pixels.clone()))),
            PixelFormat::Mono32 => Ok(Some(PixelBuffer::Mono32(
                pixels.iter().map(|&p| p as i32).collect(),
            ))),
            PixelFormat::Float32 => {
                Err(SdkError::recoverable("read_frame", codes::INVALID_PARAMETER))
            }
        }
    }

    async fn read_frames(
        &self,
        first: u64,
        last: u64,
        format: PixelFormat,
    ) -> SdkResult<PixelBuffer> {
        self.check_fail(FailPoint::ReadFrames, "read_frames")?;
        if first == 0 || last < first {
            return Err(SdkError::recoverable("read_frames", codes::INVALID_PARAMETER));
        }
        let inner = self.inner.lock();
        if last > inner.frames.len() as u64 {
            return Err(SdkError::recoverable("read_frames", codes::INVALID_PARAMETER));
        }
        let range = (first - 1) as usize..last as usize;
        match format {
            PixelFormat::Mono16 => {
                let mut flat = Vec::new();
                for pixels in &inner.frames[range] {
                    flat.extend_from_slice(pixels);
                }
                Ok(PixelBuffer::Mono16(flat))
            }
            PixelFormat::Mono32 => {
                let mut flat = Vec::new();
                for pixels in &inner.frames[range] {
                    flat.extend(pixels.iter().map(|&p| p as i32));
                }
                Ok(PixelBuffer::Mono32(flat))
            }
            PixelFormat::Float32 => {
                Err(SdkError::recoverable("read_frames", codes::INVALID_PARAMETER))
            }
        }
    }

    async fn metadata_timestamp(&self, index: u64) -> SdkResult<Option<Duration>> {
        if !self.metadata {
            return Ok(None);
        }
        let inner = self.inner.lock();
        Ok(inner.frame_offsets.get((index.max(1) - 1) as usize).copied())
    }

    fn supports_frame_events(&self) -> bool {
        self.frame_events
    }

    async fn wait_frame_event(&self, timeout: Duration) -> SdkResult<bool> {
        match tokio::time::timeout(timeout, self.notify.notified()).await {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_kinetic_series_and_returns_idle() {
        let sdk = MockSdk::builder().detector(16, 16).build();
        sdk.set_acquisition_mode(AcquisitionMode::Kinetic).await.unwrap();
        sdk.set_exposure_time(0.01).await.unwrap();
        sdk.set_kinetic_cycle(3, 0.01).await.unwrap();
        sdk.start_acquisition().await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sdk.status().await.unwrap(), HardwareStatus::Idle);
        assert_eq!(sdk.available_frame_range().await.unwrap(), Some((1, 3)));
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let sdk = MockSdk::builder().build();
        // Idle abort reports "already idle" as success.
        assert!(!sdk.abort_acquisition().await.unwrap());
    }

    #[tokio::test]
    async fn read_frame_before_available_is_none() {
        let sdk = MockSdk::builder().build();
        let frame = sdk.read_frame(1, PixelFormat::Mono16).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn fail_point_injects_error() {
        let sdk = MockSdk::builder().fail_on(FailPoint::Prepare).build();
        let err = sdk.prepare_acquisition().await.unwrap_err();
        assert_eq!(err.code, codes::GENERAL_ERROR);
    }

    #[tokio::test]
    async fn fail_after_lets_early_calls_through() {
        let sdk = MockSdk::builder().fail_after(FailPoint::Status, 1).build();
        assert!(sdk.status().await.is_ok());
        assert!(sdk.status().await.is_err());
        assert!(sdk.status().await.is_err());
    }
}
