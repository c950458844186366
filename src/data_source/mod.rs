pub mod playback;
pub mod serial;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{SpectrometerError, TransportError};
use crate::protocol::RawLine;

/// Capacity of the channel between a reader task and the acquisition loop
pub const CHANNEL_CAPACITY: usize = 32;

/// What a byte-stream source delivers to the acquisition loop
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// One newline-delimited record, not yet decoded
    Line(RawLine),
    /// A read failed; fatal errors are the last event before the channel closes
    Error(TransportError),
}

/// Trait for abstracting line sources (real hardware vs playback)
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Start the data source and return a channel receiver for its lines
    async fn start(&mut self) -> Result<mpsc::Receiver<SourceEvent>, SpectrometerError>;

    /// Stop the data source and release the underlying device or file
    async fn stop(&mut self) -> Result<(), SpectrometerError>;

    /// Check if data source is active
    fn is_active(&self) -> bool;

    /// Get the name of this data source for logging
    fn name(&self) -> &str;
}

/// Configuration for creating data sources
#[derive(Debug, Clone, PartialEq)]
pub enum DataSourceConfig {
    /// Real serial port connection
    Serial {
        port: String,
        baud_rate: u32,
        settle: Duration,
    },
    /// Recorded log playback
    Playback {
        log_file: PathBuf,
        speed_multiplier: f64,
        loop_playback: bool,
        line_interval: Duration,
    },
}

impl DataSourceConfig {
    /// Create a data source from this configuration
    pub fn create_source(&self) -> Box<dyn DataSource> {
        match self {
            DataSourceConfig::Serial {
                port,
                baud_rate,
                settle,
            } => Box::new(serial::SerialDataSource::new(port.clone(), *baud_rate, *settle)),
            DataSourceConfig::Playback {
                log_file,
                speed_multiplier,
                loop_playback,
                line_interval,
            } => Box::new(playback::PlaybackDataSource::new(
                log_file.clone(),
                *speed_multiplier,
                *loop_playback,
                *line_interval,
            )),
        }
    }
}
