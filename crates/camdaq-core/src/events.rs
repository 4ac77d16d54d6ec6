//! Session event payloads delivered to observers over broadcast channels.

use crate::sdk::{CycleProgress, HardwareStatus};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Events emitted by the acquisition engine over its broadcast channel.
///
/// `Finished` fires exactly once per session, after any `Aborted` or
/// `Faulted` for that session.
#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    /// A session entered the Acquiring state.
    Started {
        /// Hardware status at start.
        status: HardwareStatus,
    },
    /// One monitor tick completed its status query.
    StatusChecked {
        /// Hardware status at the tick.
        status: HardwareStatus,
        /// Wall-clock time of the tick.
        time: DateTime<Utc>,
        /// Cycle progress counters at the tick.
        progress: CycleProgress,
    },
    /// A frame became available and was pulled from the ring buffer.
    NewFrameAvailable {
        /// 1-based acquisition index.
        index: u64,
        /// Hardware-stamped or extrapolated acquisition time.
        timestamp: DateTime<Utc>,
    },
    /// The session was cancelled and the hardware abort completed.
    Aborted {
        /// Hardware status after the abort.
        status: HardwareStatus,
    },
    /// The session reached a terminal state. Always the last event.
    Finished {
        /// Final hardware status.
        status: HardwareStatus,
    },
    /// The monitor loop hit an unexpected failure.
    Faulted {
        /// Description of the failure.
        error: String,
    },
}

/// Events emitted by the persistence sink.
#[derive(Debug, Clone)]
pub enum SaveEvent {
    /// A frame was written to storage.
    FrameSaved {
        /// Path of the written file.
        path: PathBuf,
        /// Acquisition index of the saved frame.
        index: u64,
    },
}
