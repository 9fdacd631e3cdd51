use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no device at path '{}'", path.display())]
    DeviceNotFound { path: PathBuf },

    #[error("permission denied opening device '{}'", path.display())]
    DeviceAccessDenied { path: PathBuf },

    /// The physical display geometry could not be determined.
    #[error("failed to query display geometry: {0}")]
    DeviceQueryFailed(String),

    /// Caller handed a buffer that does not match the negotiated context.
    #[error("invalid buffer size, expected {expected} bytes but got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("touch input is not calibrated")]
    NotCalibrated,

    #[error("touch calibration was interrupted before it completed")]
    CalibrationIncomplete,

    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("window system error: {0}")]
    Window(String),

    #[error("invalid configuration in '{}': {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("image error: {0}")]
    Image(String),

    #[error("font error: {0}")]
    Font(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Classifies an `open(2)` failure on a device node.
    pub fn from_open(path: impl Into<PathBuf>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::DeviceNotFound { path: path.into() },
            io::ErrorKind::PermissionDenied => Error::DeviceAccessDenied { path: path.into() },
            _ => Error::Io(err),
        }
    }
}
