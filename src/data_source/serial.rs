use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{CHANNEL_CAPACITY, DataSource, SourceEvent};
use crate::error::{SpectrometerError, TransportError};
use crate::protocol::RawLine;

/// Upper bound on a single blocking read
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between polls while no bytes are waiting
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Longest partial line kept while waiting for its line break
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Data source for the spectrometer board on a serial port
pub struct SerialDataSource {
    port_name: String,
    baud_rate: u32,
    settle: Duration,
    is_active: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
}

impl SerialDataSource {
    pub fn new(port_name: String, baud_rate: u32, settle: Duration) -> Self {
        Self {
            port_name,
            baud_rate,
            settle,
            is_active: Arc::new(AtomicBool::new(false)),
            reader_task: None,
        }
    }

    /// List available serial ports (helper for CLI)
    pub fn list_available_ports() -> Result<Vec<serialport::SerialPortInfo>, SpectrometerError> {
        serialport::available_ports().map_err(SpectrometerError::SerialPort)
    }
}

/// Blocking read loop, owns the device until it returns.
///
/// `bytes_waiting` reports how many bytes the device holds, so the loop
/// only blocks in a read once something has arrived. Returns after a fatal
/// error, when the receiver is dropped, or when `is_active` is cleared.
fn read_lines<R, W>(
    device: R,
    mut bytes_waiting: W,
    is_active: &AtomicBool,
    line_tx: &mpsc::Sender<SourceEvent>,
) where
    R: Read,
    W: FnMut(&R) -> Result<u32, TransportError>,
{
    let mut reader = BufReader::new(device);
    // Survives read timeouts so a line split across reads is reassembled.
    let mut line_buf = Vec::new();
    let mut overflowing = false;

    while is_active.load(Ordering::SeqCst) {
        if reader.buffer().is_empty() {
            match bytes_waiting(reader.get_ref()) {
                Ok(0) => {
                    std::thread::sleep(IDLE_POLL);
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!("Serial port status error: {}", err);
                    let _ = line_tx.blocking_send(SourceEvent::Error(err));
                    break;
                }
            }
        }

        if line_buf.len() >= MAX_LINE_BYTES {
            if !overflowing {
                tracing::warn!(
                    "No line break within {} bytes, discarding partial line",
                    MAX_LINE_BYTES
                );
                overflowing = true;
            }
            line_buf.clear();
        }
        let room = (MAX_LINE_BYTES - line_buf.len()) as u64;

        match (&mut reader).take(room).read_until(b'\n', &mut line_buf) {
            Ok(0) => continue,
            Ok(_) if !line_buf.ends_with(b"\n") => continue,
            Ok(_) => {
                overflowing = false;
                let line = RawLine::new(std::mem::take(&mut line_buf));
                if line_tx.blocking_send(SourceEvent::Line(line)).is_err() {
                    tracing::warn!("Line receiver dropped, stopping reader");
                    break;
                }
            }
            Err(e) => match TransportError::from_read_error(&e) {
                None => continue,
                Some(err) => {
                    tracing::error!("Serial read error: {}", err);
                    let _ = line_tx.blocking_send(SourceEvent::Error(err));
                    break;
                }
            },
        }
    }
}

#[async_trait]
impl DataSource for SerialDataSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<SourceEvent>, SpectrometerError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;

        tracing::info!(
            "Connected to {} at {} baud, waiting {:?} for the sensor",
            self.port_name,
            self.baud_rate,
            self.settle
        );

        // The board resets when the port opens
        tokio::time::sleep(self.settle).await;

        let (line_tx, line_rx) = mpsc::channel(CHANNEL_CAPACITY);

        self.is_active.store(true, Ordering::SeqCst);
        let is_active = self.is_active.clone();
        let port_name = self.port_name.clone();

        let reader_handle = tokio::task::spawn_blocking(move || {
            tracing::info!("Serial reader started on {}", port_name);
            read_lines(
                port,
                |port| {
                    port.bytes_to_read()
                        .map_err(|e| TransportError::fatal(e.to_string()))
                },
                &is_active,
                &line_tx,
            );
            is_active.store(false, Ordering::SeqCst);
            tracing::info!("Serial reader stopped, {} released", port_name);
        });

        self.reader_task = Some(reader_handle);

        Ok(line_rx)
    }

    async fn stop(&mut self) -> Result<(), SpectrometerError> {
        self.is_active.store(false, Ordering::SeqCst);

        if let Some(handle) = self.reader_task.take() {
            handle
                .await
                .map_err(|e| SpectrometerError::DataSource(format!("reader task failed: {}", e)))?;
        }

        tracing::info!("Serial data source stopped");

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for SerialDataSource {
    fn drop(&mut self) {
        // Lets a detached reader thread exit and close the port
        self.is_active.store(false, Ordering::SeqCst);
    }
}
