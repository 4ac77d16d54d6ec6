//! `camdaq-ctrl`
//!
//! The controller layer: a validating settings dependency graph over the
//! [`camdaq_core::CameraSdk`] boundary, and an acquisition engine that runs
//! one monitored session at a time, streaming frames and events to
//! subscribers.
//!
//! Typical flow: build a [`settings::SettingsGraph`], choose values, call
//! [`settings::SettingsGraph::apply`], then hand the achieved timings to
//! [`acquisition::AcquisitionEngine::start`].

pub mod acquisition;
pub mod config;
pub mod settings;

pub use acquisition::{AcquisitionEngine, AcquisitionPlan, EngineState, SessionHandle};
pub use config::EngineConfig;
pub use settings::{ApplyReport, SettingsGraph, SettingsSnapshot};
