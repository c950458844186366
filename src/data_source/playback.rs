use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep, sleep_until};

use super::{CHANNEL_CAPACITY, DataSource, SourceEvent};
use crate::error::{SpectrometerError, TransportError};
use crate::protocol::RawLine;

// ISO8601 timestamp at start of line, with optional timezone (Z or +HH:MM)
static TIMESTAMP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?)\s+(.*)$")
        .unwrap()
});

/// A line from the log file with its timestamp
#[derive(Debug, Clone)]
struct TimestampedLine {
    timestamp: DateTime<Utc>,
    content: String,
}

/// Data source replaying a recorded serial log
///
/// Lines prefixed with an ISO8601 timestamp keep their recorded spacing;
/// bare lines, as dumped straight from the port, are spaced by a fixed
/// interval. Both are scaled by the speed multiplier.
pub struct PlaybackDataSource {
    log_file: PathBuf,
    speed_multiplier: f64,
    loop_playback: bool,
    line_interval: Duration,
    is_active: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
}

impl PlaybackDataSource {
    pub fn new(
        log_file: PathBuf,
        speed_multiplier: f64,
        loop_playback: bool,
        line_interval: Duration,
    ) -> Self {
        Self {
            log_file,
            speed_multiplier: speed_multiplier.max(0.1), // Minimum 0.1x speed
            loop_playback,
            line_interval,
            is_active: Arc::new(AtomicBool::new(false)),
            reader_task: None,
        }
    }

    /// Parse a timestamped line from the log file
    /// Format: "2025-01-15T10:30:00.123 130,131,129,..."
    fn parse_timestamped_line(line: &str) -> Option<TimestampedLine> {
        let caps = TIMESTAMP_REGEX.captures(line.trim())?;
        let timestamp_str = caps.get(1)?.as_str();
        let content = caps.get(2)?.as_str();

        // Try parsing with timezone
        let timestamp = DateTime::parse_from_rfc3339(timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                // Try without timezone, assume UTC
                NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|ndt| ndt.and_utc())
            })
            .or_else(|_| {
                // Try without milliseconds
                NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%dT%H:%M:%S")
                    .map(|ndt| ndt.and_utc())
            })
            .ok()?;

        Some(TimestampedLine {
            timestamp,
            content: content.to_string(),
        })
    }
}

/// Replay the file once; returns false when the receiver went away.
async fn replay_once(
    log_file: &Path,
    speed_multiplier: f64,
    line_interval: Duration,
    is_active: &AtomicBool,
    line_tx: &mpsc::Sender<SourceEvent>,
) -> Result<bool, std::io::Error> {
    let file = File::open(log_file).await?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let playback_start = Instant::now();
    let mut log_start: Option<DateTime<Utc>> = None;
    let bare_interval = line_interval.div_f64(speed_multiplier);

    while is_active.load(Ordering::SeqCst) {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let text = RawLine::new(buf.clone()).text();
        if text.is_empty() {
            continue;
        }

        let line = match PlaybackDataSource::parse_timestamped_line(&text) {
            Some(timestamped) => {
                let start = *log_start.get_or_insert(timestamped.timestamp);
                let log_elapsed = (timestamped.timestamp - start)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                sleep_until(playback_start + log_elapsed.div_f64(speed_multiplier)).await;
                RawLine::with_timestamp(timestamped.content.into_bytes(), timestamped.timestamp)
            }
            None => {
                sleep(bare_interval).await;
                RawLine::new(buf.clone())
            }
        };

        if line_tx.send(SourceEvent::Line(line)).await.is_err() {
            tracing::warn!("Line receiver dropped, stopping playback");
            return Ok(false);
        }
    }

    Ok(true)
}

#[async_trait]
impl DataSource for PlaybackDataSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<SourceEvent>, SpectrometerError> {
        // Fail early on a missing file
        File::open(&self.log_file).await?;

        let (line_tx, line_rx) = mpsc::channel(CHANNEL_CAPACITY);

        self.is_active.store(true, Ordering::SeqCst);
        let is_active = self.is_active.clone();
        let speed_multiplier = self.speed_multiplier;
        let loop_playback = self.loop_playback;
        let line_interval = self.line_interval;
        let log_file = self.log_file.clone();

        let reader_handle = tokio::spawn(async move {
            tracing::info!(
                "Playback started from {:?} at {}x speed",
                log_file,
                speed_multiplier
            );

            loop {
                match replay_once(&log_file, speed_multiplier, line_interval, &is_active, &line_tx)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        tracing::error!("Error reading log file: {}", e);
                        let _ = line_tx
                            .send(SourceEvent::Error(TransportError::fatal(e.to_string())))
                            .await;
                        break;
                    }
                }

                if !loop_playback || !is_active.load(Ordering::SeqCst) {
                    break;
                }

                tracing::info!("Looping playback from start");
            }

            is_active.store(false, Ordering::SeqCst);
            tracing::info!("Playback finished");
        });

        self.reader_task = Some(reader_handle);

        Ok(line_rx)
    }

    async fn stop(&mut self) -> Result<(), SpectrometerError> {
        self.is_active.store(false, Ordering::SeqCst);

        if let Some(handle) = self.reader_task.take() {
            handle.abort();
            let _ = handle.await;
        }

        tracing::info!("Playback data source stopped");

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        self.log_file.to_str().unwrap_or("playback")
    }
}
