//! Acquisition sessions: the engine state machine, monitor strategies, the
//! ring-buffer reader, and cooperative cancellation.

pub mod engine;
pub mod monitor;
pub mod reader;
pub mod session;

pub use engine::{AcquisitionEngine, AcquisitionPlan, EngineState};
pub use monitor::{choose, EventDrivenMonitor, MonitorStrategy, PollingMonitor};
pub use reader::FrameBufferReader;
pub use session::{CancelFlag, SessionHandle};
