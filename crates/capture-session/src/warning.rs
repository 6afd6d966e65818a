use crate::OutputFormat;
use core::fmt;
use phoxi_device::{GroupGates, OptionalField, SettingGroup};
use std::path::PathBuf;
use tracing::warn;

/// Non-fatal condition accumulated over a session.
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    /// A group reported a closed gate; the write is still attempted.
    GroupGatesClosed {
        group: SettingGroup,
        gates: GroupGates,
    },
    CapabilityUnavailable {
        field: OptionalField,
    },
    InvalidResolutionIndex {
        requested: usize,
        available: usize,
    },
    /// An optional group could not be read or written.
    GroupSkipped {
        group: SettingGroup,
        message: String,
    },
    StopAcquisition {
        message: String,
    },
    SaveSkipped {
        format: OutputFormat,
        reason: &'static str,
    },
    SaveFailed {
        format: OutputFormat,
        path: PathBuf,
        message: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::GroupGatesClosed { group, gates } => write!(
                f,
                "{group} gates not open (enabled={}, can_get={}, can_set={})",
                gates.enabled, gates.can_get, gates.can_set
            ),
            Warning::CapabilityUnavailable { field } => {
                write!(f, "{field} is not supported by this device, left unchanged")
            }
            Warning::InvalidResolutionIndex {
                requested,
                available,
            } => write!(
                f,
                "invalid resolution index {requested} ({available} capturing modes supported), keeping current resolution"
            ),
            Warning::GroupSkipped { group, message } => {
                write!(f, "{group} not applied: {message}")
            }
            Warning::StopAcquisition { message } => {
                write!(f, "stopping acquisition failed: {message}")
            }
            Warning::SaveSkipped { format, reason } => {
                write!(f, "{format} output skipped: {reason}")
            }
            Warning::SaveFailed {
                format,
                path,
                message,
            } => write!(
                f,
                "could not save frame as {format} to {}: {message}",
                path.display()
            ),
        }
    }
}

/// Log and keep a warning.
pub(crate) fn record(warnings: &mut Vec<Warning>, warning: Warning) {
    warn!("{warning}");
    warnings.push(warning);
}
