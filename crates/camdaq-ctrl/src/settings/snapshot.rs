//! Validated settings snapshot and the dependency cascade.
//!
//! The snapshot holds every camera parameter the controller has validated so
//! far. Parameters are not independent: selecting a new AD converter changes
//! which horizontal speeds exist, a new horizontal speed changes which
//! pre-amp gains are usable, and so on. The cascade table in
//! [`SettingsSnapshot::clear_dependents`] is the single place that knowledge
//! lives; setters call it after storing a value so stale dependents can never
//! reach the device.

use camdaq_core::capabilities::{
    AcquisitionMode as AcqMode, AmplifierKind, ReadoutMode as RdMode, TriggerMode as TrgMode,
};
use camdaq_core::frame::ImageArea;
use serde::{Deserialize, Serialize};

/// A validated vertical shift speed selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VsSpeed {
    /// Table index.
    pub index: u8,
    /// Shift time in microseconds per row.
    pub speed_us: f64,
}

/// A validated AD converter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdConverter {
    /// Channel index.
    pub index: u8,
    /// Converter bit depth.
    pub bit_depth: u8,
}

/// A validated output amplifier selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputAmplifier {
    /// Amplifier index.
    pub index: u8,
    /// Gain-stage family.
    pub kind: AmplifierKind,
    /// Vendor-reported name.
    pub name: String,
}

/// A validated horizontal shift speed selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsSpeed {
    /// Index within the (AD converter, amplifier) speed table.
    pub index: u32,
    /// Readout speed in MHz.
    pub speed_mhz: f64,
}

/// A validated pre-amp gain selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreAmpGain {
    /// Table index.
    pub index: u8,
    /// Gain factor.
    pub factor: f64,
}

/// A validated accumulation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccumulateCycle {
    /// Exposures summed per frame.
    pub frames: u32,
    /// Requested interval between exposures, seconds.
    pub interval_s: f64,
}

/// A validated kinetic series cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KineticCycle {
    /// Frames in the series.
    pub frames: u32,
    /// Requested interval between frames, seconds.
    pub interval_s: f64,
}

/// Identifies one field of the snapshot, for cascade reporting and apply
/// results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingField {
    /// Vertical shift speed.
    VsSpeed,
    /// Vertical clock amplitude.
    VsAmplitude,
    /// AD converter channel.
    AdConverter,
    /// Output amplifier.
    OutputAmplifier,
    /// Horizontal shift speed.
    HsSpeed,
    /// Pre-amp gain.
    PreAmpGain,
    /// EM gain factor.
    EmGain,
    /// Acquisition mode.
    AcquisitionMode,
    /// Readout mode.
    ReadoutMode,
    /// Trigger mode.
    TriggerMode,
    /// Exposure time.
    ExposureTime,
    /// Image area and binning.
    ImageArea,
    /// Accumulation cycle.
    AccumulateCycle,
    /// Kinetic series cycle.
    KineticCycle,
}

impl SettingField {
    /// Label used in errors, logs, and apply reports.
    pub fn label(&self) -> &'static str {
        match self {
            SettingField::VsSpeed => "vertical shift speed",
            SettingField::VsAmplitude => "vertical clock amplitude",
            SettingField::AdConverter => "AD converter",
            SettingField::OutputAmplifier => "output amplifier",
            SettingField::HsSpeed => "horizontal shift speed",
            SettingField::PreAmpGain => "pre-amp gain",
            SettingField::EmGain => "EM gain",
            SettingField::AcquisitionMode => "acquisition mode",
            SettingField::ReadoutMode => "readout mode",
            SettingField::TriggerMode => "trigger mode",
            SettingField::ExposureTime => "exposure time",
            SettingField::ImageArea => "image area",
            SettingField::AccumulateCycle => "accumulate cycle",
            SettingField::KineticCycle => "kinetic cycle",
        }
    }
}

/// All validated parameter selections, each absent until set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSnapshot {
    /// Vertical shift speed.
    pub vs_speed: Option<VsSpeed>,
    /// Vertical clock amplitude step.
    pub vs_amplitude: Option<u8>,
    /// AD converter channel.
    pub ad_converter: Option<AdConverter>,
    /// Output amplifier.
    pub output_amplifier: Option<OutputAmplifier>,
    /// Horizontal shift speed.
    pub hs_speed: Option<HsSpeed>,
    /// Pre-amp gain.
    pub preamp_gain: Option<PreAmpGain>,
    /// EM gain factor.
    pub em_gain: Option<i32>,
    /// Acquisition mode.
    pub acquisition_mode: Option<AcqMode>,
    /// Readout mode.
    pub readout_mode: Option<RdMode>,
    /// Trigger mode.
    pub trigger_mode: Option<TrgMode>,
    /// Requested exposure time, seconds.
    pub exposure_s: Option<f64>,
    /// Readout region and binning.
    pub image_area: Option<ImageArea>,
    /// Accumulation cycle.
    pub accumulate_cycle: Option<AccumulateCycle>,
    /// Kinetic series cycle.
    pub kinetic_cycle: Option<KineticCycle>,
}

impl SettingsSnapshot {
    /// Invalidate every selection whose validity depended on `changed`.
    ///
    /// Dependency table:
    /// - AD converter governs the horizontal speed and pre-amp gain tables.
    /// - Output amplifier governs horizontal speed, pre-amp gain, and whether
    ///   EM gain applies at all.
    /// - Horizontal speed governs pre-amp gain availability.
    ///
    /// Clearing is recursive through the table; the returned slice lists the
    /// fields that were reset so callers can log or surface them.
    pub fn clear_dependents(&mut self, changed: SettingField) -> &'static [SettingField] {
        let cleared: &'static [SettingField] = match changed {
            SettingField::AdConverter => {
                &[SettingField::HsSpeed, SettingField::PreAmpGain]
            }
            SettingField::OutputAmplifier => &[
                SettingField::HsSpeed,
                SettingField::PreAmpGain,
                SettingField::EmGain,
            ],
            SettingField::HsSpeed => &[SettingField::PreAmpGain],
            _ => &[],
        };
        for field in cleared {
            match field {
                SettingField::HsSpeed => self.hs_speed = None,
                SettingField::PreAmpGain => self.preamp_gain = None,
                SettingField::EmGain => self.em_gain = None,
                _ => {}
            }
        }
        cleared
    }

    /// Whether the selected amplifier is an EM stage.
    pub fn em_amplifier_selected(&self) -> bool {
        self.output_amplifier
            .as_ref()
            .map(|a| a.kind == AmplifierKind::ElectronMultiplying)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> SettingsSnapshot {
        SettingsSnapshot {
            ad_converter: Some(AdConverter {
                index: 0,
                bit_depth: 16,
            }),
            output_amplifier: Some(OutputAmplifier {
                index: 0,
                kind: AmplifierKind::ElectronMultiplying,
                name: "EM Port".into(),
            }),
            hs_speed: Some(HsSpeed {
                index: 0,
                speed_mhz: 30.0,
            }),
            preamp_gain: Some(PreAmpGain {
                index: 1,
                factor: 2.4,
            }),
            em_gain: Some(100),
            exposure_s: Some(0.5),
            ..SettingsSnapshot::default()
        }
    }

    #[test]
    fn ad_converter_change_clears_speed_and_gain() {
        let mut snap = populated();
        let cleared = snap.clear_dependents(SettingField::AdConverter);
        assert_eq!(cleared, &[SettingField::HsSpeed, SettingField::PreAmpGain]);
        assert!(snap.hs_speed.is_none());
        assert!(snap.preamp_gain.is_none());
        // EM gain and unrelated fields survive.
        assert_eq!(snap.em_gain, Some(100));
        assert_eq!(snap.exposure_s, Some(0.5));
    }

    #[test]
    fn amplifier_change_clears_em_gain_too() {
        let mut snap = populated();
        snap.clear_dependents(SettingField::OutputAmplifier);
        assert!(snap.hs_speed.is_none());
        assert!(snap.preamp_gain.is_none());
        assert!(snap.em_gain.is_none());
        assert!(snap.output_amplifier.is_some());
    }

    #[test]
    fn hs_speed_change_clears_only_gain() {
        let mut snap = populated();
        snap.clear_dependents(SettingField::HsSpeed);
        assert!(snap.hs_speed.is_some());
        assert!(snap.preamp_gain.is_none());
        assert_eq!(snap.em_gain, Some(100));
    }

    #[test]
    fn independent_change_clears_nothing() {
        let mut snap = populated();
        let cleared = snap.clear_dependents(SettingField::ExposureTime);
        assert!(cleared.is_empty());
        assert_eq!(snap, populated());
    }
}
