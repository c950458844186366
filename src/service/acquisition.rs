use std::path::Path;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout, timeout_at};

use super::pipeline::{Capture, CycleOutcome, Pipeline};
use super::stop::StopToken;
use crate::config::AcquisitionSettings;
use crate::data_source::SourceEvent;
use crate::error::SpectrometerError;
use crate::export::{CaptureSession, ExportReport, export_capture};
use crate::render::{PlotFrame, PlotRenderer, RenderSink};

/// Why continuous acquisition ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    StopRequested,
    SourceClosed,
}

/// Counters of one continuous session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSummary {
    pub frames: u64,
    pub rejected: u64,
    pub transport_errors: u64,
    pub render_errors: u64,
    pub end: EndReason,
}

/// Drives the pipeline from a source channel in single-shot or continuous mode
pub struct AcquisitionLoop {
    pipeline: Pipeline,
    settings: AcquisitionSettings,
}

impl AcquisitionLoop {
    pub fn new(pipeline: Pipeline, settings: AcquisitionSettings) -> Self {
        Self { pipeline, settings }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Wait for the first valid frame
    ///
    /// Rejected lines and transient transport errors keep waiting. Fails with
    /// `CaptureTimeout` once the deadline passes, with `Disconnected` if the
    /// source closes first, or with the transport error if it is fatal.
    pub async fn capture_single(
        &self,
        events: &mut mpsc::Receiver<SourceEvent>,
    ) -> Result<Capture, SpectrometerError> {
        let limit = self.settings.capture_timeout;
        let deadline = Instant::now() + limit;
        let mut rejected = 0u64;

        tracing::info!("Waiting up to {:?} for a spectrum", limit);

        loop {
            let event = match timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(SpectrometerError::Disconnected(
                        "source closed before a valid spectrum arrived".to_string(),
                    ));
                }
                Err(_) => {
                    tracing::warn!(
                        "No valid spectrum within {:?} ({} lines rejected)",
                        limit,
                        rejected
                    );
                    return Err(SpectrometerError::CaptureTimeout(limit));
                }
            };

            match self.pipeline.process(event) {
                CycleOutcome::Frame(capture) => {
                    tracing::info!(
                        "Spectrum received after {} rejected lines (line time {}): {}",
                        rejected,
                        capture.received_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                        capture.peak.title()
                    );
                    return Ok(capture);
                }
                CycleOutcome::Rejected => {
                    rejected += 1;
                    tracing::trace!("Line rejected");
                }
                CycleOutcome::Transport(e) if e.fatal => {
                    tracing::error!("Source failed: {}", e);
                    return Err(e.into());
                }
                CycleOutcome::Transport(e) => {
                    tracing::warn!("Transient read error: {}", e);
                }
            }
        }
    }

    /// Everything the export step needs about one capture
    ///
    /// Stamped with the local wall-clock time of acceptance, never with a
    /// time recorded in a replayed log.
    pub fn session(&self, capture: Capture) -> CaptureSession {
        let profile = self.pipeline.profile();
        CaptureSession {
            timestamp: Local::now(),
            sensor_name: profile.sensor_name.clone(),
            offset: profile.offset,
            axis: self.pipeline.axis().clone(),
            calibrated: capture.calibrated,
            peak: capture.peak,
        }
    }

    /// Single-shot mode: capture one frame, then write its image and table
    ///
    /// Nothing is written when no frame arrives.
    pub async fn capture_and_export(
        &self,
        events: &mut mpsc::Receiver<SourceEvent>,
        data_dir: &Path,
        dpi: u32,
    ) -> Result<ExportReport, SpectrometerError> {
        let capture = self.capture_single(events).await?;
        let session = self.session(capture);

        let mut plot = PlotRenderer::new(
            self.pipeline.axis().clone(),
            self.pipeline.colors().clone(),
            self.pipeline.calibrator().y_max(),
        );
        plot.update(&PlotFrame::with_peak(&session.calibrated, &session.peak))?;

        export_capture(&session, data_dir, &plot, dpi)
    }

    /// Continuous mode: redraw `sink` for every frame until `stop` is
    /// requested or the source closes
    pub async fn run_continuous<S: RenderSink + ?Sized>(
        &self,
        events: &mut mpsc::Receiver<SourceEvent>,
        sink: &mut S,
        stop: &StopToken,
    ) -> Result<LiveSummary, SpectrometerError> {
        let mut summary = LiveSummary {
            frames: 0,
            rejected: 0,
            transport_errors: 0,
            render_errors: 0,
            end: EndReason::StopRequested,
        };

        tracing::info!("Continuous acquisition started on {} sink", sink.name());

        while !stop.is_requested() {
            let event = match timeout(self.settings.poll_interval, events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    tracing::info!("Source closed");
                    summary.end = EndReason::SourceClosed;
                    break;
                }
                Err(_) => continue,
            };

            match self.pipeline.process(event) {
                CycleOutcome::Frame(capture) => {
                    let frame = PlotFrame::with_peak(&capture.calibrated, &capture.peak);
                    match sink.update(&frame) {
                        Ok(()) => {
                            summary.frames += 1;
                            tracing::debug!("{}", frame.title);
                        }
                        Err(e) => {
                            summary.render_errors += 1;
                            tracing::warn!("Failed to redraw: {}", e);
                        }
                    }
                }
                CycleOutcome::Rejected => {
                    summary.rejected += 1;
                    tracing::trace!("Line rejected");
                }
                CycleOutcome::Transport(e) if e.fatal => {
                    tracing::error!(
                        "Source failed after {} frames: {}",
                        summary.frames,
                        e
                    );
                    return Err(e.into());
                }
                CycleOutcome::Transport(e) => {
                    summary.transport_errors += 1;
                    tracing::warn!("Transient read error: {}", e);
                }
            }
        }

        tracing::info!(
            "Continuous acquisition finished: {} frames, {} rejected, {} transport errors",
            summary.frames,
            summary.rejected,
            summary.transport_errors
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use chrono::Timelike;

    use crate::config::SensorProfile;
    use crate::data_source::DataSource;
    use crate::data_source::playback::PlaybackDataSource;
    use crate::error::TransportError;
    use crate::export::read_spectrum_file;
    use crate::protocol::RawLine;

    fn acquisition(capture_timeout: Duration) -> AcquisitionLoop {
        AcquisitionLoop::new(
            Pipeline::new(SensorProfile::default()),
            AcquisitionSettings {
                capture_timeout,
                poll_interval: Duration::from_millis(5),
            },
        )
    }

    fn line(text: &str) -> SourceEvent {
        SourceEvent::Line(RawLine::new(text.as_bytes().to_vec()))
    }

    fn flat_frame(count: u32) -> SourceEvent {
        line(&vec![count.to_string(); 288].join(","))
    }

    #[derive(Default)]
    struct RecordingSink {
        titles: Vec<String>,
        stop_after: Option<(usize, StopToken)>,
        fail: bool,
    }

    impl RenderSink for RecordingSink {
        fn update(&mut self, frame: &PlotFrame<'_>) -> Result<(), SpectrometerError> {
            if self.fail {
                return Err(SpectrometerError::Render("window closed".to_string()));
            }
            self.titles.push(frame.title.clone());
            if let Some((limit, stop)) = &self.stop_after {
                if self.titles.len() >= *limit {
                    stop.request();
                }
            }
            Ok(())
        }

        fn save(&self, _path: &Path, _dpi: u32) -> Result<(), SpectrometerError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), SpectrometerError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_capture_skips_rejected_and_transient() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(line("12,34,abc,56")).await.unwrap();
        tx.send(SourceEvent::Error(TransportError::transient("parity")))
            .await
            .unwrap();
        tx.send(flat_frame(130)).await.unwrap();

        let capture = acquisition(Duration::from_secs(1))
            .capture_single(&mut rx)
            .await
            .unwrap();

        assert!(capture.calibrated.values().iter().all(|&v| v == 3));
        assert_eq!(capture.peak.index, 0);
    }

    #[tokio::test]
    async fn test_capture_timeout_writes_nothing() {
        let (_tx, mut rx) = mpsc::channel::<SourceEvent>(8);
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("datos");

        let result = acquisition(Duration::from_millis(50))
            .capture_and_export(&mut rx, &data_dir, 20)
            .await;

        assert!(matches!(result, Err(SpectrometerError::CaptureTimeout(_))));
        assert!(!data_dir.exists());
    }

    #[tokio::test]
    async fn test_capture_times_out_on_garbage_only() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(line("not,a,spectrum")).await.unwrap();

        let result = acquisition(Duration::from_millis(50))
            .capture_single(&mut rx)
            .await;

        assert!(matches!(result, Err(SpectrometerError::CaptureTimeout(_))));
        drop(tx);
    }

    #[tokio::test]
    async fn test_capture_source_closed() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(line("1,2,3")).await.unwrap();
        drop(tx);

        let result = acquisition(Duration::from_secs(1))
            .capture_single(&mut rx)
            .await;

        assert!(matches!(result, Err(SpectrometerError::Disconnected(_))));
    }

    #[tokio::test]
    async fn test_capture_fatal_transport() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(SourceEvent::Error(TransportError::fatal("device unplugged")))
            .await
            .unwrap();
        tx.send(flat_frame(130)).await.unwrap();

        let result = acquisition(Duration::from_secs(1))
            .capture_single(&mut rx)
            .await;

        assert_err!(&result);
        assert!(matches!(result, Err(SpectrometerError::Transport(e)) if e.fatal));
    }

    #[tokio::test]
    async fn test_capture_and_export_writes_both_artifacts() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(flat_frame(130)).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("datos");

        let report = acquisition(Duration::from_secs(1))
            .capture_and_export(&mut rx, &data_dir, 20)
            .await
            .unwrap();

        let image = assert_ok!(report.image);
        let table = assert_ok!(report.table);
        assert!(image.exists());
        let name = table.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Espectro_Captura_"));
        assert!(name.ends_with(".txt"));

        let saved = read_spectrum_file(&table).unwrap();
        assert_eq!(saved.intensities, vec![3.0; 288]);
        assert_eq!(std::fs::read_dir(&data_dir).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_capture_from_timestamped_log_uses_wall_clock() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("session.log");
        let samples = vec!["130"; 288].join(",");
        std::fs::write(&log, format!("2025-01-15T10:30:00.000 {}\n", samples)).unwrap();
        let data_dir = dir.path().join("datos");

        let mut source =
            PlaybackDataSource::new(log, 1.0, false, Duration::from_millis(1));
        let mut events = source.start().await.unwrap();

        let before = Local::now();
        let report = acquisition(Duration::from_secs(2))
            .capture_and_export(&mut events, &data_dir, 20)
            .await
            .unwrap();
        let after = Local::now();
        drop(events);
        source.stop().await.unwrap();

        let table = assert_ok!(report.table);
        let name = table.file_name().unwrap().to_string_lossy().into_owned();
        assert!(!name.contains("20250115"), "stamped with the log time: {}", name);

        let stamp = name
            .trim_start_matches("Espectro_Captura_")
            .trim_end_matches(".txt");
        let stamped = chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").unwrap();
        let floor = |t: chrono::DateTime<Local>| {
            t.naive_local().with_nanosecond(0).unwrap()
        };
        assert!(floor(before) <= stamped && stamped <= floor(after));
    }

    #[tokio::test]
    async fn test_continuous_until_source_closes() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(flat_frame(130)).await.unwrap();
        tx.send(line("")).await.unwrap();
        tx.send(SourceEvent::Error(TransportError::transient("framing")))
            .await
            .unwrap();
        tx.send(flat_frame(500)).await.unwrap();
        drop(tx);
        let mut sink = RecordingSink::default();

        let summary = acquisition(Duration::from_secs(1))
            .run_continuous(&mut rx, &mut sink, &StopToken::new())
            .await
            .unwrap();

        assert_eq!(
            summary,
            LiveSummary {
                frames: 2,
                rejected: 1,
                transport_errors: 1,
                render_errors: 0,
                end: EndReason::SourceClosed,
            }
        );
        assert_eq!(sink.titles.len(), 2);
        assert!(sink.titles[1].ends_with("Intensity: 373"));
    }

    #[tokio::test]
    async fn test_continuous_stops_on_request() {
        let (tx, mut rx) = mpsc::channel(8);
        for _ in 0..5 {
            tx.send(flat_frame(130)).await.unwrap();
        }
        let stop = StopToken::new();
        let mut sink = RecordingSink {
            stop_after: Some((2, stop.clone())),
            ..RecordingSink::default()
        };

        let summary = acquisition(Duration::from_secs(1))
            .run_continuous(&mut rx, &mut sink, &stop)
            .await
            .unwrap();

        assert_eq!(summary.frames, 2);
        assert_eq!(summary.end, EndReason::StopRequested);
        drop(tx);
    }

    #[tokio::test]
    async fn test_continuous_with_stop_already_requested() {
        let (_tx, mut rx) = mpsc::channel::<SourceEvent>(8);
        let stop = StopToken::new();
        stop.request();

        let summary = acquisition(Duration::from_secs(1))
            .run_continuous(&mut rx, &mut RecordingSink::default(), &stop)
            .await
            .unwrap();

        assert_eq!(summary.frames, 0);
        assert_eq!(summary.end, EndReason::StopRequested);
    }

    #[tokio::test]
    async fn test_continuous_survives_render_errors() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(flat_frame(130)).await.unwrap();
        tx.send(flat_frame(130)).await.unwrap();
        drop(tx);
        let mut sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };

        let summary = acquisition(Duration::from_secs(1))
            .run_continuous(&mut rx, &mut sink, &StopToken::new())
            .await
            .unwrap();

        assert_eq!(summary.frames, 0);
        assert_eq!(summary.render_errors, 2);
        assert_eq!(summary.end, EndReason::SourceClosed);
    }

    #[tokio::test]
    async fn test_continuous_fatal_transport() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(flat_frame(130)).await.unwrap();
        tx.send(SourceEvent::Error(TransportError::fatal("port vanished")))
            .await
            .unwrap();
        let mut sink = RecordingSink::default();

        let result = acquisition(Duration::from_secs(1))
            .run_continuous(&mut rx, &mut sink, &StopToken::new())
            .await;

        assert!(matches!(result, Err(SpectrometerError::Transport(_))));
        assert_eq!(sink.titles.len(), 1);
        drop(tx);
    }
}
