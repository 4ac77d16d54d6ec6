//! Error types for camera configuration and acquisition.
//!
//! Expected outcomes (unsupported feature, missing setting, session already
//! running, no data yet) are discriminated variants of [`CamError`] rather
//! than panics or catch-all strings. Hardware statuses cross the SDK boundary
//! as [`SdkError`] and are wrapped in [`CamError::DeviceCommunication`] when
//! they surface to callers.

use thiserror::Error;

/// How a failed SDK call should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Retry or reconfigure may succeed; the device is still usable.
    Recoverable,
    /// The device or session is in an unusable state.
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Recoverable => write!(f, "recoverable"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A non-success status returned by a vendor SDK call.
///
/// `call` names the logical operation (not the native function), `code` is
/// the raw vendor status for diagnostics.
#[derive(Error, Debug, Clone)]
#[error("SDK call '{call}' failed with status {code} ({severity})")]
pub struct SdkError {
    /// Logical name of the failed operation.
    pub call: &'static str,
    /// Raw vendor status code.
    pub code: u32,
    /// Whether the failure is recoverable at the call site.
    pub severity: Severity,
}

impl SdkError {
    /// Construct a recoverable SDK error.
    pub fn recoverable(call: &'static str, code: u32) -> Self {
        Self {
            call,
            code,
            severity: Severity::Recoverable,
        }
    }

    /// Construct a fatal SDK error.
    pub fn fatal(call: &'static str, code: u32) -> Self {
        Self {
            call,
            code,
            severity: Severity::Fatal,
        }
    }
}

/// Convenience alias for results using the camdaq error type.
pub type CamResult<T> = std::result::Result<T, CamError>;

/// Primary error type for settings and acquisition operations.
#[derive(Error, Debug)]
pub enum CamError {
    /// A setter was rejected by a range or membership check.
    ///
    /// The settings snapshot is left unchanged. Recoverable: pick a value the
    /// device actually supports.
    #[error("Configuration rejected: {0}")]
    Configuration(String),

    /// The requested feature is absent from the device capability set.
    ///
    /// Recoverable/informational: the caller asked a question this hardware
    /// cannot answer.
    #[error("Operation not supported by this device: {0}")]
    UnsupportedOperation(String),

    /// `apply()` was called with a mandatory setting unset.
    ///
    /// Recoverable: set the named parameter and retry.
    #[error("Required setting '{0}' is not set")]
    MissingSetting(&'static str),

    /// A hardware call returned a non-success status.
    ///
    /// Recoverable at the call site, except during session teardown where it
    /// is logged and swallowed so teardown always completes.
    #[error("Device communication failed: {0}")]
    DeviceCommunication(#[from] SdkError),

    /// A state-changing call was issued while a session is active.
    ///
    /// Recoverable: wait for the session to finish or cancel it.
    #[error("An acquisition session is already in progress")]
    AcquisitionInProgress,

    /// The hardware is not in the state the operation requires.
    #[error("Invalid device state for this operation: {actual}")]
    InvalidState {
        /// Human-readable description of the state the device reported.
        actual: String,
    },

    /// Unexpected failure inside the monitor loop.
    ///
    /// Drives the session to Faulted; surfaced asynchronously via the
    /// `AcquisitionFaulted` event, always followed by `AcquisitionFinished`.
    #[error("Acquisition fault: {0}")]
    AcquisitionFault(String),

    /// A pixel format outside the hardware-supported encodings was requested.
    #[error("Pixel format {0} is not a supported ring-buffer encoding")]
    UnsupportedFormat(crate::frame::PixelFormat),

    /// The operation was cancelled cooperatively before completion.
    ///
    /// Bulk retrieval surfaces this rather than returning a silently partial
    /// result.
    #[error("Operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdk_error_display() {
        let err = SdkError::recoverable("start_acquisition", 20013);
        assert_eq!(
            err.to_string(),
            "SDK call 'start_acquisition' failed with status 20013 (recoverable)"
        );
    }

    #[test]
    fn missing_setting_display() {
        let err = CamError::MissingSetting("exposure time");
        assert_eq!(err.to_string(), "Required setting 'exposure time' is not set");
    }

    #[test]
    fn device_communication_wraps_sdk_error() {
        let err: CamError = SdkError::fatal("prepare_acquisition", 20002).into();
        assert!(err.to_string().contains("prepare_acquisition"));
    }
}
