pub mod spectrum_file;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

pub use spectrum_file::{SpectrumFile, read_spectrum_file, save_spectrum_table};

use crate::error::SpectrometerError;
use crate::processing::PeakResult;
use crate::protocol::{CalibratedVector, WavelengthAxis};
use crate::render::RenderSink;

/// File name prefix of single-shot capture artifacts
pub const CAPTURE_PREFIX: &str = "Espectro_Captura_";

/// A successful single-shot capture, ready to be written out
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSession {
    pub timestamp: DateTime<Local>,
    pub sensor_name: String,
    pub offset: u32,
    pub axis: WavelengthAxis,
    pub calibrated: CalibratedVector,
    pub peak: PeakResult,
}

/// Where the two artifacts of one capture go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub image: PathBuf,
    pub table: PathBuf,
}

impl ArtifactPaths {
    pub fn for_capture(data_dir: &Path, timestamp: &DateTime<Local>) -> Self {
        let base = format!("{}{}", CAPTURE_PREFIX, timestamp.format("%Y%m%d_%H%M%S"));
        Self {
            image: data_dir.join(format!("{}.png", base)),
            table: data_dir.join(format!("{}.txt", base)),
        }
    }
}

/// Outcome of each artifact; one failing never undoes the other
#[derive(Debug)]
pub struct ExportReport {
    pub image: Result<PathBuf, SpectrometerError>,
    pub table: Result<PathBuf, SpectrometerError>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.image.is_ok() && self.table.is_ok()
    }

    /// Fails when neither the image nor the table was written
    pub fn ensure_saved(&self) -> Result<(), SpectrometerError> {
        match (&self.image, &self.table) {
            (Err(image), Err(table)) => Err(SpectrometerError::Export(format!(
                "image: {}; table: {}",
                image, table
            ))),
            _ => Ok(()),
        }
    }
}

/// Write the plot image and the data table of a capture into `data_dir`
///
/// The directory is created first; if that fails nothing is written.
pub fn export_capture(
    session: &CaptureSession,
    data_dir: &Path,
    sink: &dyn RenderSink,
    dpi: u32,
) -> Result<ExportReport, SpectrometerError> {
    std::fs::create_dir_all(data_dir)?;
    tracing::debug!("Data directory {:?} ready", data_dir);

    let paths = ArtifactPaths::for_capture(data_dir, &session.timestamp);

    let image = sink.save(&paths.image, dpi).map(|_| paths.image.clone());
    match &image {
        Ok(path) => tracing::info!("Image saved to {:?}", path),
        Err(e) => tracing::error!("Failed to save image {:?}: {}", paths.image, e),
    }

    let table = save_spectrum_table(&paths.table, session).map(|_| paths.table.clone());
    match &table {
        Ok(path) => tracing::info!("Data saved to {:?}", path),
        Err(e) => tracing::error!("Failed to save data {:?}: {}", paths.table, e),
    }

    Ok(ExportReport { image, table })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::processing::{ColorTable, extract_peak};
    use crate::render::{PlotFrame, PlotRenderer};

    struct FailingSink;

    impl RenderSink for FailingSink {
        fn update(&mut self, _frame: &PlotFrame<'_>) -> Result<(), SpectrometerError> {
            Ok(())
        }
        fn save(&self, _path: &Path, _dpi: u32) -> Result<(), SpectrometerError> {
            Err(SpectrometerError::Render("disk full".to_string()))
        }
        fn close(&mut self) -> Result<(), SpectrometerError> {
            Ok(())
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    fn session() -> CaptureSession {
        let axis = WavelengthAxis::linspace(380.0, 850.0, 288);
        let colors = ColorTable::for_axis(&axis);
        let calibrated = CalibratedVector::from_calibrated(vec![3; 288]);
        let peak = extract_peak(&calibrated, &axis, &colors);
        CaptureSession {
            timestamp: Local.with_ymd_and_hms(2026, 10, 19, 14, 5, 9).unwrap(),
            sensor_name: "C12880MA".to_string(),
            offset: 127,
            axis,
            calibrated,
            peak,
        }
    }

    #[test]
    fn test_artifact_paths() {
        let paths = ArtifactPaths::for_capture(Path::new("datos"), &session().timestamp);

        assert_eq!(paths.image, PathBuf::from("datos/Espectro_Captura_20261019_140509.png"));
        assert_eq!(paths.table, PathBuf::from("datos/Espectro_Captura_20261019_140509.txt"));
    }

    #[test]
    fn test_export_creates_directory_and_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("datos").join("laser_verde");
        let session = session();
        let colors = ColorTable::for_axis(&session.axis);
        let mut plot = PlotRenderer::new(session.axis.clone(), colors, 873);
        plot.update(&PlotFrame::with_peak(&session.calibrated, &session.peak))
            .unwrap();

        let report = export_capture(&session, &data_dir, &plot, 20).unwrap();

        assert!(report.is_complete());
        assert!(report.image.unwrap().exists());
        let table = read_spectrum_file(&report.table.unwrap()).unwrap();
        assert_eq!(table.intensities, vec![3.0; 288]);
    }

    #[test]
    fn test_image_failure_keeps_table() {
        let dir = tempfile::tempdir().unwrap();

        let report = export_capture(&session(), dir.path(), &FailingSink, 20).unwrap();

        assert!(!report.is_complete());
        assert!(report.ensure_saved().is_ok());
        assert!(report.image.is_err());
        assert!(report.table.unwrap().exists());
    }

    #[test]
    fn test_both_artifacts_failing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = session();
        let paths = ArtifactPaths::for_capture(dir.path(), &session.timestamp);
        // A directory where the table should go makes the table write fail
        std::fs::create_dir(&paths.table).unwrap();

        let report = export_capture(&session, dir.path(), &FailingSink, 20).unwrap();

        assert!(report.image.is_err());
        assert!(report.table.is_err());
        let err = report.ensure_saved().unwrap_err();
        assert!(matches!(err, SpectrometerError::Export(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_unwritable_directory_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, "a file, not a directory").unwrap();

        let result = export_capture(&session(), &blocker.join("datos"), &FailingSink, 20);

        assert!(matches!(result, Err(SpectrometerError::Io(_))));
    }
}
