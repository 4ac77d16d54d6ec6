//! Validated camera settings: the snapshot, its dependency cascade, and the
//! graph that mediates changes and pushes them to hardware.

pub mod graph;
pub mod snapshot;

pub use graph::{ApplyReport, ParameterResult, SettingsGraph};
pub use snapshot::{
    AccumulateCycle, AdConverter, HsSpeed, KineticCycle, OutputAmplifier, PreAmpGain,
    SettingField, SettingsSnapshot, VsSpeed,
};
