//! The settings dependency graph.
//!
//! [`SettingsGraph`] owns a [`SettingsSnapshot`] and mediates every parameter
//! change: capability check, range/membership validation against the device
//! tables, then store-and-cascade. Nothing is written to hardware until
//! [`SettingsGraph::apply`] pushes the whole snapshot in one fixed-order
//! batch and reads back the timings the device will actually use.

use crate::settings::snapshot::{
    AccumulateCycle, AdConverter, HsSpeed, KineticCycle, OutputAmplifier, PreAmpGain,
    SettingField, SettingsSnapshot, VsSpeed,
};
use camdaq_core::capabilities::{AcquisitionMode, Feature, ReadoutMode, TriggerMode};
use camdaq_core::error::{CamError, CamResult, SdkError};
use camdaq_core::frame::ImageArea;
use camdaq_core::sdk::{AcquisitionTimings, CameraSdk, HardwareStatus};
use std::sync::Arc;

/// Outcome of writing one snapshot field to the device during apply.
#[derive(Debug)]
pub struct ParameterResult {
    /// The field that was written.
    pub field: SettingField,
    /// Success, or the SDK status the write failed with.
    pub outcome: Result<(), SdkError>,
}

/// Per-parameter outcomes of an apply pass plus the timings readback.
///
/// Apply is best-effort across parameters: one rejected write does not stop
/// the batch, and the report carries every outcome so the caller can present
/// exactly which settings took effect.
#[derive(Debug)]
pub struct ApplyReport {
    /// One entry per field that was present in the snapshot, in write order.
    pub results: Vec<ParameterResult>,
    /// Timings read back after the batch. The device rounds requests to what
    /// its clocks can do, so these supersede the requested values.
    pub timings: AcquisitionTimings,
}

impl ApplyReport {
    /// True if every parameter write succeeded.
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }

    /// Fields whose writes failed, with their SDK statuses.
    pub fn failures(&self) -> impl Iterator<Item = (&SettingField, &SdkError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (&r.field, e)))
    }
}

/// Validating front end for camera parameters.
pub struct SettingsGraph {
    sdk: Arc<dyn CameraSdk>,
    snapshot: SettingsSnapshot,
}

impl SettingsGraph {
    /// Wrap an SDK handle with an empty snapshot.
    pub fn new(sdk: Arc<dyn CameraSdk>) -> Self {
        Self {
            sdk,
            snapshot: SettingsSnapshot::default(),
        }
    }

    /// The current validated snapshot.
    pub fn snapshot(&self) -> &SettingsSnapshot {
        &self.snapshot
    }

    fn require_settable(&self, feature: Feature) -> CamResult<()> {
        if self.sdk.capabilities().can_set(feature) {
            Ok(())
        } else {
            Err(CamError::UnsupportedOperation(feature.label().into()))
        }
    }

    /// Hardware parameters only change between sessions. Every path that
    /// writes to the device goes through this gate first.
    async fn require_device_idle(&self) -> CamResult<()> {
        let status = self.sdk.status().await?;
        if status != HardwareStatus::Idle {
            return Err(CamError::AcquisitionInProgress);
        }
        Ok(())
    }

    fn cascade(&mut self, field: SettingField) {
        let cleared = self.snapshot.clear_dependents(field);
        if !cleared.is_empty() {
            tracing::debug!(
                changed = field.label(),
                cleared = ?cleared.iter().map(|f| f.label()).collect::<Vec<_>>(),
                "dependent settings invalidated"
            );
        }
    }

    /// Select a vertical shift speed by table index.
    pub async fn set_vs_speed(&mut self, index: u8) -> CamResult<()> {
        self.require_settable(Feature::VsSpeed)?;
        let props = self.sdk.properties();
        let speed_us = props
            .vertical_speeds_us
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                CamError::Configuration(format!(
                    "vertical shift speed index {} out of range (0..{})",
                    index,
                    props.vertical_speeds_us.len()
                ))
            })?;
        self.snapshot.vs_speed = Some(VsSpeed { index, speed_us });
        self.cascade(SettingField::VsSpeed);
        Ok(())
    }

    /// Select a vertical clock amplitude step.
    pub async fn set_vs_amplitude(&mut self, amplitude: u8) -> CamResult<()> {
        self.require_settable(Feature::VsAmplitude)?;
        let props = self.sdk.properties();
        if !props.vertical_amplitudes.contains(&amplitude) {
            return Err(CamError::Configuration(format!(
                "vertical clock amplitude {} is not offered by this device",
                amplitude
            )));
        }
        self.snapshot.vs_amplitude = Some(amplitude);
        self.cascade(SettingField::VsAmplitude);
        Ok(())
    }

    /// Select an AD converter channel. Invalidates horizontal speed and
    /// pre-amp gain.
    pub async fn set_ad_converter(&mut self, index: u8) -> CamResult<()> {
        self.require_settable(Feature::AdConverter)?;
        let props = self.sdk.properties();
        let bit_depth = props
            .ad_bit_depths
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                CamError::Configuration(format!(
                    "AD converter index {} out of range (0..{})",
                    index,
                    props.ad_bit_depths.len()
                ))
            })?;
        self.snapshot.ad_converter = Some(AdConverter { index, bit_depth });
        self.cascade(SettingField::AdConverter);
        Ok(())
    }

    /// Select an output amplifier. Invalidates horizontal speed, pre-amp
    /// gain, and EM gain.
    pub async fn set_output_amplifier(&mut self, index: u8) -> CamResult<()> {
        self.require_settable(Feature::OutputAmplifier)?;
        let props = self.sdk.properties();
        let info = props
            .amplifiers
            .iter()
            .find(|a| a.index == index)
            .ok_or_else(|| {
                CamError::Configuration(format!(
                    "output amplifier index {} is not offered by this device",
                    index
                ))
            })?;
        self.snapshot.output_amplifier = Some(OutputAmplifier {
            index: info.index,
            kind: info.kind,
            name: info.name.clone(),
        });
        self.cascade(SettingField::OutputAmplifier);
        Ok(())
    }

    /// Select a horizontal shift speed. Requires an AD converter and an
    /// output amplifier to already be selected, because the speed table is
    /// specific to that pair. Invalidates pre-amp gain.
    pub async fn set_hs_speed(&mut self, index: u32) -> CamResult<()> {
        self.require_settable(Feature::HsSpeed)?;
        let adc = self
            .snapshot
            .ad_converter
            .ok_or(CamError::MissingSetting("AD converter"))?;
        let amp = self
            .snapshot
            .output_amplifier
            .clone()
            .ok_or(CamError::MissingSetting("output amplifier"))?;
        let count = self.sdk.hs_speed_count(adc.index, amp.index).await?;
        if index >= count {
            return Err(CamError::Configuration(format!(
                "horizontal speed index {} out of range (0..{}) for AD converter {} / amplifier {}",
                index, count, adc.index, amp.index
            )));
        }
        let speed_mhz = self.sdk.hs_speed(adc.index, amp.index, index).await?;
        self.snapshot.hs_speed = Some(HsSpeed { index, speed_mhz });
        self.cascade(SettingField::HsSpeed);
        Ok(())
    }

    /// Select a pre-amp gain. Requires AD converter, amplifier, and
    /// horizontal speed, and checks the gain is usable with that trio.
    pub async fn set_preamp_gain(&mut self, index: u8) -> CamResult<()> {
        self.require_settable(Feature::PreAmpGain)?;
        let adc = self
            .snapshot
            .ad_converter
            .ok_or(CamError::MissingSetting("AD converter"))?;
        let amp = self
            .snapshot
            .output_amplifier
            .clone()
            .ok_or(CamError::MissingSetting("output amplifier"))?;
        let hs = self
            .snapshot
            .hs_speed
            .ok_or(CamError::MissingSetting("horizontal shift speed"))?;
        let props = self.sdk.properties();
        let info = props
            .preamp_gains
            .iter()
            .find(|g| g.index == index)
            .copied()
            .ok_or_else(|| {
                CamError::Configuration(format!("pre-amp gain index {} out of range", index))
            })?;
        let available = self
            .sdk
            .preamp_gain_available(adc.index, amp.index, hs.index, index)
            .await?;
        if !available {
            return Err(CamError::Configuration(format!(
                "pre-amp gain {} is not available with AD converter {} / amplifier {} / speed index {}",
                index, adc.index, amp.index, hs.index
            )));
        }
        self.snapshot.preamp_gain = Some(PreAmpGain {
            index: info.index,
            factor: info.factor,
        });
        self.cascade(SettingField::PreAmpGain);
        Ok(())
    }

    /// Set the EM gain factor. Only valid while the EM amplifier is selected;
    /// the range is re-read from the device because it shifts with sensor
    /// temperature.
    pub async fn set_em_gain(&mut self, gain: i32) -> CamResult<()> {
        self.require_settable(Feature::EmGain)?;
        if !self.snapshot.em_amplifier_selected() {
            return Err(CamError::Configuration(
                "EM gain requires the electron-multiplying amplifier to be selected".into(),
            ));
        }
        let (low, high) = self.sdk.em_gain_range().await?;
        if gain < low || gain > high {
            return Err(CamError::Configuration(format!(
                "EM gain {} outside the current range {}..={}",
                gain, low, high
            )));
        }
        self.snapshot.em_gain = Some(gain);
        self.cascade(SettingField::EmGain);
        Ok(())
    }

    /// Select the acquisition mode.
    pub async fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> CamResult<()> {
        self.require_settable(Feature::AcquisitionMode)?;
        if !self.sdk.capabilities().supports_acquisition_mode(mode) {
            return Err(CamError::Configuration(format!(
                "acquisition mode {:?} is not supported by this device",
                mode
            )));
        }
        self.snapshot.acquisition_mode = Some(mode);
        self.cascade(SettingField::AcquisitionMode);
        Ok(())
    }

    /// Select the readout mode.
    pub async fn set_readout_mode(&mut self, mode: ReadoutMode) -> CamResult<()> {
        self.require_settable(Feature::ReadoutMode)?;
        if !self.sdk.capabilities().supports_readout_mode(mode) {
            return Err(CamError::Configuration(format!(
                "readout mode {:?} is not supported by this device",
                mode
            )));
        }
        self.snapshot.readout_mode = Some(mode);
        self.cascade(SettingField::ReadoutMode);
        Ok(())
    }

    /// Select the trigger mode.
    pub async fn set_trigger_mode(&mut self, mode: TriggerMode) -> CamResult<()> {
        self.require_settable(Feature::TriggerMode)?;
        if !self.sdk.capabilities().supports_trigger_mode(mode) {
            return Err(CamError::Configuration(format!(
                "trigger mode {:?} is not supported by this device",
                mode
            )));
        }
        self.snapshot.trigger_mode = Some(mode);
        self.cascade(SettingField::TriggerMode);
        Ok(())
    }

    /// Set the requested exposure time in seconds.
    pub async fn set_exposure_time(&mut self, seconds: f64) -> CamResult<()> {
        self.require_settable(Feature::ExposureTime)?;
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(CamError::Configuration(format!(
                "exposure time {} must be a positive number of seconds",
                seconds
            )));
        }
        self.snapshot.exposure_s = Some(seconds);
        self.cascade(SettingField::ExposureTime);
        Ok(())
    }

    /// Set the readout region and binning.
    pub async fn set_image_area(&mut self, area: ImageArea) -> CamResult<()> {
        self.require_settable(Feature::ImageArea)?;
        area.validate(self.sdk.properties().detector)
            .map_err(CamError::Configuration)?;
        self.snapshot.image_area = Some(area);
        self.cascade(SettingField::ImageArea);
        Ok(())
    }

    /// Configure the accumulation cycle.
    pub async fn set_accumulate_cycle(&mut self, frames: u32, interval_s: f64) -> CamResult<()> {
        self.require_settable(Feature::AccumulateCycle)?;
        if frames == 0 {
            return Err(CamError::Configuration(
                "accumulate cycle needs at least one exposure".into(),
            ));
        }
        if !(interval_s.is_finite() && interval_s >= 0.0) {
            return Err(CamError::Configuration(format!(
                "accumulate interval {} must be non-negative",
                interval_s
            )));
        }
        self.snapshot.accumulate_cycle = Some(AccumulateCycle { frames, interval_s });
        self.cascade(SettingField::AccumulateCycle);
        Ok(())
    }

    /// Configure the kinetic series cycle.
    pub async fn set_kinetic_cycle(&mut self, frames: u32, interval_s: f64) -> CamResult<()> {
        self.require_settable(Feature::KineticCycle)?;
        if frames == 0 {
            return Err(CamError::Configuration(
                "kinetic cycle needs at least one frame".into(),
            ));
        }
        if !(interval_s.is_finite() && interval_s >= 0.0) {
            return Err(CamError::Configuration(format!(
                "kinetic interval {} must be non-negative",
                interval_s
            )));
        }
        self.snapshot.kinetic_cycle = Some(KineticCycle { frames, interval_s });
        self.cascade(SettingField::KineticCycle);
        Ok(())
    }

    // --- discovery probes ---------------------------------------------------

    /// Enumerate the horizontal speeds valid for an (AD converter, amplifier)
    /// pair, without touching the snapshot.
    pub async fn available_hs_speeds(&self, adc: u8, amplifier: u8) -> CamResult<Vec<HsSpeed>> {
        let count = self.sdk.hs_speed_count(adc, amplifier).await?;
        let mut speeds = Vec::with_capacity(count as usize);
        for index in 0..count {
            let speed_mhz = self.sdk.hs_speed(adc, amplifier, index).await?;
            speeds.push(HsSpeed { index, speed_mhz });
        }
        Ok(speeds)
    }

    /// Whether a horizontal speed index exists for the given pair. An
    /// out-of-range index is a `false` result, not an error.
    pub async fn is_hs_speed_supported(
        &self,
        adc: u8,
        amplifier: u8,
        index: u32,
    ) -> CamResult<bool> {
        let count = self.sdk.hs_speed_count(adc, amplifier).await?;
        Ok(index < count)
    }

    /// Enumerate the pre-amp gains usable with the given AD converter,
    /// amplifier, and horizontal speed. An empty result means no gain works
    /// with that combination; it is not an error.
    pub async fn available_preamp_gains(
        &self,
        adc: u8,
        amplifier: u8,
        hs_index: u32,
    ) -> CamResult<Vec<PreAmpGain>> {
        let props = self.sdk.properties();
        let mut gains = Vec::new();
        for info in &props.preamp_gains {
            if self
                .sdk
                .preamp_gain_available(adc, amplifier, hs_index, info.index)
                .await?
            {
                gains.push(PreAmpGain {
                    index: info.index,
                    factor: info.factor,
                });
            }
        }
        Ok(gains)
    }

    /// Query the EM gain range. The device only reports the range for the
    /// currently selected amplifier, so this temporarily selects the EM stage
    /// and restores the prior selection afterwards; with nothing selected yet
    /// the power-on default (amplifier 0) is written back. Exclusive access
    /// via `&mut self` keeps the bracket atomic with respect to other
    /// setters, and the probe is refused while a session is live.
    pub async fn em_gain_range(&mut self) -> CamResult<(i32, i32)> {
        let props = self.sdk.properties();
        let em = props
            .em_amplifier()
            .ok_or_else(|| {
                CamError::UnsupportedOperation("electron-multiplying amplifier".into())
            })?
            .index;
        self.require_device_idle().await?;
        let restore = self
            .snapshot
            .output_amplifier
            .as_ref()
            .map(|a| a.index)
            .unwrap_or(0);

        self.sdk.set_output_amplifier(em).await?;
        let range = self.sdk.em_gain_range().await;

        // Restore the prior (or default) selection even if the probe failed.
        // A restore failure is logged and swallowed; the snapshot still
        // records what the caller intends, and apply() rewrites it.
        if restore != em {
            if let Err(err) = self.sdk.set_output_amplifier(restore).await {
                tracing::warn!(error = %err, amplifier = restore, "amplifier restore failed after EM range probe");
            }
        }

        Ok(range?)
    }

    // --- apply --------------------------------------------------------------

    /// Push the snapshot to the device and read back achieved timings.
    ///
    /// Mandatory settings (acquisition mode, readout mode, trigger mode,
    /// exposure time, and the cycles the chosen mode requires) must be
    /// present; optional ones are written only if set. Writes continue past
    /// individual failures and every outcome lands in the report.
    ///
    /// Refused with [`CamError::AcquisitionInProgress`] while the device is
    /// acquiring: snapshot edits are local, but nothing reaches the hardware
    /// under a live session.
    pub async fn apply(&mut self) -> CamResult<ApplyReport> {
        let mode = self
            .snapshot
            .acquisition_mode
            .ok_or(CamError::MissingSetting("acquisition mode"))?;
        if self.snapshot.readout_mode.is_none() {
            return Err(CamError::MissingSetting("readout mode"));
        }
        if self.snapshot.trigger_mode.is_none() {
            return Err(CamError::MissingSetting("trigger mode"));
        }
        if self.snapshot.exposure_s.is_none() {
            return Err(CamError::MissingSetting("exposure time"));
        }
        if mode.requires_accumulate_cycle() && self.snapshot.accumulate_cycle.is_none() {
            return Err(CamError::MissingSetting("accumulate cycle"));
        }
        if mode.requires_kinetic_cycle() && self.snapshot.kinetic_cycle.is_none() {
            return Err(CamError::MissingSetting("kinetic cycle"));
        }

        self.sdk.ensure_current().await?;
        self.require_device_idle().await?;

        let mut results = Vec::new();
        // Fixed write order: structural selections first, then gains that
        // depend on them, then timing.
        if let Some(vs) = self.snapshot.vs_speed {
            let outcome = self.sdk.set_vs_speed(vs.index).await;
            self.record(&mut results, SettingField::VsSpeed, outcome);
        }
        if let Some(amplitude) = self.snapshot.vs_amplitude {
            let outcome = self.sdk.set_vs_amplitude(amplitude).await;
            self.record(&mut results, SettingField::VsAmplitude, outcome);
        }
        if let Some(adc) = self.snapshot.ad_converter {
            let outcome = self.sdk.set_ad_converter(adc.index).await;
            self.record(&mut results, SettingField::AdConverter, outcome);
        }
        if let Some(amp) = self.snapshot.output_amplifier.clone() {
            let outcome = self.sdk.set_output_amplifier(amp.index).await;
            self.record(&mut results, SettingField::OutputAmplifier, outcome);
        }
        if let Some(hs) = self.snapshot.hs_speed {
            let amp_index = self
                .snapshot
                .output_amplifier
                .as_ref()
                .map(|a| a.index)
                .unwrap_or(0);
            let outcome = self.sdk.set_hs_speed(amp_index, hs.index).await;
            self.record(&mut results, SettingField::HsSpeed, outcome);
        }
        if let Some(gain) = self.snapshot.preamp_gain {
            let outcome = self.sdk.set_preamp_gain(gain.index).await;
            self.record(&mut results, SettingField::PreAmpGain, outcome);
        }
        if let Some(gain) = self.snapshot.em_gain {
            let outcome = self.sdk.set_em_gain(gain).await;
            self.record(&mut results, SettingField::EmGain, outcome);
        }
        let outcome = self.sdk.set_acquisition_mode(mode).await;
        self.record(&mut results, SettingField::AcquisitionMode, outcome);
        if let Some(readout) = self.snapshot.readout_mode {
            let outcome = self.sdk.set_readout_mode(readout).await;
            self.record(&mut results, SettingField::ReadoutMode, outcome);
        }
        if let Some(trigger) = self.snapshot.trigger_mode {
            let outcome = self.sdk.set_trigger_mode(trigger).await;
            self.record(&mut results, SettingField::TriggerMode, outcome);
        }
        if let Some(area) = self.snapshot.image_area {
            let outcome = self.sdk.set_image_area(area).await;
            self.record(&mut results, SettingField::ImageArea, outcome);
        }
        if let Some(exposure) = self.snapshot.exposure_s {
            let outcome = self.sdk.set_exposure_time(exposure).await;
            self.record(&mut results, SettingField::ExposureTime, outcome);
        }
        if let Some(cycle) = self.snapshot.accumulate_cycle {
            let outcome = self
                .sdk
                .set_accumulate_cycle(cycle.frames, cycle.interval_s)
                .await;
            self.record(&mut results, SettingField::AccumulateCycle, outcome);
        }
        if let Some(cycle) = self.snapshot.kinetic_cycle {
            let outcome = self
                .sdk
                .set_kinetic_cycle(cycle.frames, cycle.interval_s)
                .await;
            self.record(&mut results, SettingField::KineticCycle, outcome);
        }

        let timings = self.sdk.acquisition_timings().await?;
        tracing::info!(
            exposure_s = timings.exposure_s,
            kinetic_cycle_s = timings.kinetic_cycle_s,
            failures = results.iter().filter(|r| r.outcome.is_err()).count(),
            "settings applied"
        );
        Ok(ApplyReport { results, timings })
    }

    fn record(
        &self,
        results: &mut Vec<ParameterResult>,
        field: SettingField,
        outcome: Result<(), SdkError>,
    ) {
        if let Err(err) = &outcome {
            tracing::warn!(field = field.label(), error = %err, "parameter write rejected");
        } else {
            tracing::trace!(field = field.label(), "parameter written");
        }
        results.push(ParameterResult { field, outcome });
    }
}
