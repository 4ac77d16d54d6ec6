//! `camdaq-storage`
//!
//! Persistence for acquired frames: pluggable per-frame writers and an
//! asynchronous, ordered, best-effort sink that consumes a session's frame
//! stream without ever blocking the acquisition monitor.

pub mod sink;
#[cfg(feature = "storage_tiff")]
pub mod tiff;
pub mod writer;

pub use sink::{FrameSink, SinkStats};
#[cfg(feature = "storage_tiff")]
pub use tiff::TiffWriter;
pub use writer::{FrameWriter, RawWriter};
