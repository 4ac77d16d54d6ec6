//! Immutable device capability and property model.
//!
//! A [`CapabilitySet`] and [`DeviceProperties`] are discovered once when a
//! device is connected and never change while the handle is open. Every
//! settings-graph setter consults the capability set before touching the
//! value, so "this hardware can't do that" is answered without a device
//! round-trip.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A logical camera feature that may be gettable and/or settable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Vertical shift speed selection.
    VsSpeed,
    /// Vertical clock voltage amplitude.
    VsAmplitude,
    /// AD converter channel selection.
    AdConverter,
    /// Output amplifier selection.
    OutputAmplifier,
    /// Horizontal shift speed selection.
    HsSpeed,
    /// Pre-amplifier gain selection.
    PreAmpGain,
    /// Acquisition mode selection.
    AcquisitionMode,
    /// Readout mode selection.
    ReadoutMode,
    /// Trigger mode selection.
    TriggerMode,
    /// Exposure time.
    ExposureTime,
    /// Readout region and binning.
    ImageArea,
    /// Accumulation cycle (frame count + interval).
    AccumulateCycle,
    /// Kinetic series cycle (frame count + interval).
    KineticCycle,
    /// Electron-multiplication gain.
    EmGain,
    /// Per-frame hardware metadata (timestamps).
    FrameMetadata,
    /// Hardware frame-arrival wake events.
    FrameEvents,
}

impl Feature {
    /// Human-readable label used in errors and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Feature::VsSpeed => "vertical shift speed",
            Feature::VsAmplitude => "vertical clock amplitude",
            Feature::AdConverter => "AD converter",
            Feature::OutputAmplifier => "output amplifier",
            Feature::HsSpeed => "horizontal shift speed",
            Feature::PreAmpGain => "pre-amp gain",
            Feature::AcquisitionMode => "acquisition mode",
            Feature::ReadoutMode => "readout mode",
            Feature::TriggerMode => "trigger mode",
            Feature::ExposureTime => "exposure time",
            Feature::ImageArea => "image area",
            Feature::AccumulateCycle => "accumulate cycle",
            Feature::KineticCycle => "kinetic cycle",
            Feature::EmGain => "EM gain",
            Feature::FrameMetadata => "frame metadata",
            Feature::FrameEvents => "frame events",
        }
    }
}

/// Supported ways of sequencing exposures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// One exposure, one frame.
    SingleScan,
    /// Sum several exposures into one frame.
    Accumulation,
    /// A timed series of frames.
    Kinetic,
    /// Kinetic series using on-chip storage.
    FastKinetics,
    /// Stream frames until externally aborted.
    RunTillAbort,
}

impl AcquisitionMode {
    /// Whether this mode requires an accumulate cycle to be configured.
    pub fn requires_accumulate_cycle(&self) -> bool {
        matches!(
            self,
            AcquisitionMode::Accumulation | AcquisitionMode::Kinetic | AcquisitionMode::FastKinetics
        )
    }

    /// Whether this mode requires a kinetic cycle to be configured.
    pub fn requires_kinetic_cycle(&self) -> bool {
        matches!(
            self,
            AcquisitionMode::Kinetic | AcquisitionMode::RunTillAbort | AcquisitionMode::FastKinetics
        )
    }
}

/// Supported detector readout geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadoutMode {
    /// Full-resolution image readout.
    FullImage,
    /// Bin all rows into a single spectrum.
    FullVerticalBinning,
    /// A single binned track of rows.
    SingleTrack,
    /// Several user-positioned tracks.
    MultiTrack,
    /// Arbitrary track positions.
    RandomTrack,
}

/// Supported exposure trigger sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Free-running internal timing.
    Internal,
    /// Hardware trigger input.
    External,
    /// External trigger starts the series, then internal timing.
    ExternalStart,
    /// Software-commanded trigger.
    Software,
}

/// Output amplifier gain-stage family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmplifierKind {
    /// Conventional CCD output.
    Conventional,
    /// Electron-multiplying output.
    ElectronMultiplying,
}

/// One output amplifier the detector offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmplifierInfo {
    /// Index used in SDK commands.
    pub index: u8,
    /// Vendor-reported name.
    pub name: String,
    /// Gain-stage family.
    pub kind: AmplifierKind,
    /// Fastest horizontal speed this amplifier supports, MHz.
    pub max_speed_mhz: f64,
}

/// One discrete pre-amplifier gain setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreAmpGainInfo {
    /// Index used in SDK commands.
    pub index: u8,
    /// Gain factor (e.g. 1.0, 2.4, 5.1).
    pub factor: f64,
}

/// What a connected device supports. Immutable after discovery.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    settable: HashSet<Feature>,
    gettable: HashSet<Feature>,
    acquisition_modes: Vec<AcquisitionMode>,
    readout_modes: Vec<ReadoutMode>,
    trigger_modes: Vec<TriggerMode>,
}

impl CapabilitySet {
    /// Build a capability set from discovery results.
    pub fn new(
        settable: impl IntoIterator<Item = Feature>,
        gettable: impl IntoIterator<Item = Feature>,
        acquisition_modes: Vec<AcquisitionMode>,
        readout_modes: Vec<ReadoutMode>,
        trigger_modes: Vec<TriggerMode>,
    ) -> Self {
        Self {
            settable: settable.into_iter().collect(),
            gettable: gettable.into_iter().collect(),
            acquisition_modes,
            readout_modes,
            trigger_modes,
        }
    }

    /// Whether the feature can be written on this device.
    pub fn can_set(&self, feature: Feature) -> bool {
        self.settable.contains(&feature)
    }

    /// Whether the feature can be read back from this device.
    pub fn can_get(&self, feature: Feature) -> bool {
        self.gettable.contains(&feature)
    }

    /// Supported acquisition modes, in vendor order.
    pub fn acquisition_modes(&self) -> &[AcquisitionMode] {
        &self.acquisition_modes
    }

    /// Supported readout modes, in vendor order.
    pub fn readout_modes(&self) -> &[ReadoutMode] {
        &self.readout_modes
    }

    /// Supported trigger modes, in vendor order.
    pub fn trigger_modes(&self) -> &[TriggerMode] {
        &self.trigger_modes
    }

    /// Membership test for an acquisition mode.
    pub fn supports_acquisition_mode(&self, mode: AcquisitionMode) -> bool {
        self.acquisition_modes.contains(&mode)
    }

    /// Membership test for a readout mode.
    pub fn supports_readout_mode(&self, mode: ReadoutMode) -> bool {
        self.readout_modes.contains(&mode)
    }

    /// Membership test for a trigger mode.
    pub fn supports_trigger_mode(&self, mode: TriggerMode) -> bool {
        self.trigger_modes.contains(&mode)
    }
}

/// Static detector geometry and tables. Immutable after discovery.
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    /// Detector size in unbinned pixels (width, height).
    pub detector: (u32, u32),
    /// Supported cooler setpoint range, degrees C (min, max).
    pub temperature_range_c: (i32, i32),
    /// Bit depth of each AD converter channel, by index.
    pub ad_bit_depths: Vec<u8>,
    /// Output amplifiers, by index.
    pub amplifiers: Vec<AmplifierInfo>,
    /// Vertical shift speeds in microseconds per row, by index.
    pub vertical_speeds_us: Vec<f64>,
    /// Supported vertical clock amplitude steps, by index.
    pub vertical_amplitudes: Vec<u8>,
    /// Pre-amp gain table, by index.
    pub preamp_gains: Vec<PreAmpGainInfo>,
    /// EM gain range (low, high) for the EM amplifier.
    pub em_gain_range: (i32, i32),
}

impl DeviceProperties {
    /// The first electron-multiplying amplifier, if the device has one.
    pub fn em_amplifier(&self) -> Option<&AmplifierInfo> {
        self.amplifiers
            .iter()
            .find(|a| a.kind == AmplifierKind::ElectronMultiplying)
    }
}
