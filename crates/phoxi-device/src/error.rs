use thiserror::Error;

pub type Result<T, E = DeviceError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device is not connected")]
    NotConnected,
    #[error("operation not supported on this device: {0}")]
    Unsupported(&'static str),
    #[error("device rejected operation: {0}")]
    Rejected(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
