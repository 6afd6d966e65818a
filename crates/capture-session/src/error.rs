use crate::SessionState;
use phoxi_device::{DeviceError, FrameId, SettingGroup, TriggerMode};
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Fatal session errors. Anything recoverable is reported as a [`crate::Warning`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("control service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("connection to device {target} failed")]
    Connection { target: String },
    #[error("{group} could not be applied: {source}")]
    SettingsApply {
        group: SettingGroup,
        source: DeviceError,
    },
    #[error("switching to {mode} trigger mode failed: {source}")]
    TriggerMode {
        mode: TriggerMode,
        source: DeviceError,
    },
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("session cancelled")]
    Cancelled,
    #[error("operation requires {expected} session, current state is {found}")]
    InvalidState {
        expected: &'static str,
        found: SessionState,
    },
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("starting acquisition failed: {0}")]
    Start(DeviceError),
    #[error("stopping acquisition failed: {0}")]
    Stop(DeviceError),
    #[error("device not ready for trigger (mode {mode}, acquiring {acquiring})")]
    NotReady { mode: TriggerMode, acquiring: bool },
    #[error("trigger was unsuccessful (device returned {0})")]
    TriggerRejected(i32),
    #[error("frame {0} could not be retrieved")]
    FrameUnavailable(FrameId),
    #[error("frame {0} does not exist or has no content")]
    EmptyFrame(FrameId),
    #[error("frame {stale} is no longer valid")]
    StaleFrame { stale: FrameId },
}
