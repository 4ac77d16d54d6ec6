//! `camdaq-core`
//!
//! Core types shared across the camdaq workspace: the typed error hierarchy,
//! frame and pixel-buffer representations, the immutable capability/property
//! model discovered at connect time, session event payloads, and the
//! [`sdk::CameraSdk`] trait that is the single boundary to the vendor driver.
//!
//! Controller, mock, and storage crates all depend on this crate and nothing
//! else in the workspace, so the hardware boundary stays cycle-free.

pub mod capabilities;
pub mod error;
pub mod events;
pub mod frame;
pub mod sdk;

pub use capabilities::{
    AcquisitionMode, AmplifierInfo, AmplifierKind, CapabilitySet, DeviceProperties, Feature,
    PreAmpGainInfo, ReadoutMode, TriggerMode,
};
pub use error::{CamError, CamResult, SdkError, Severity};
pub use events::{AcquisitionEvent, SaveEvent};
pub use frame::{Frame, ImageArea, PixelBuffer, PixelFormat};
pub use sdk::{AcquisitionTimings, CameraSdk, CycleProgress, HardwareStatus, SdkResult};
