use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the spectrometer tool
#[derive(Error, Debug)]
pub enum SpectrometerError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sensor profile error: {0}")]
    Profile(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Data source disconnected: {0}")]
    Disconnected(String),

    #[error("No valid spectrum received within {0:?}")]
    CaptureTimeout(Duration),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Capture not saved: {0}")]
    Export(String),

    #[error("Invalid spectrum file {path:?}: {reason}")]
    SpectrumFile { path: PathBuf, reason: String },

    #[error("Aggregation error: {0}")]
    Aggregation(String),
}

/// Failure reported by a byte-stream source while reading a line
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// The source stops producing lines after a fatal error.
    pub fatal: bool,
}

impl TransportError {
    #[cfg(test)]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    /// Classify an I/O error raised by a blocking line read.
    ///
    /// Returns `None` for the kinds that only mean "nothing arrived yet".
    pub fn from_read_error(err: &std::io::Error) -> Option<Self> {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => None,
            _ => Some(Self::fatal(err.to_string())),
        }
    }
}
