use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::CaptureSession;
use crate::error::SpectrometerError;
use crate::protocol::WavelengthAxis;

/// Number of comment lines preceding the data rows
pub const HEADER_LINES: usize = 3;

/// A saved capture as read back from its text table
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFile {
    pub path: PathBuf,
    pub axis: WavelengthAxis,
    pub intensities: Vec<f64>,
}

/// Write the tab-delimited table: three `# ` header lines, then one
/// `wavelength<TAB>intensity` row per pixel in ascending wavelength order.
pub fn write_spectrum_table<W: Write>(
    mut writer: W,
    session: &CaptureSession,
) -> Result<(), SpectrometerError> {
    writeln!(
        writer,
        "# Spectrum {} - captured {}",
        session.sensor_name,
        session.timestamp.format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(writer, "# Offset subtracted: {}", session.offset)?;
    writeln!(writer, "# Wavelength (nm)\tIntensity (ADC)")?;

    for (wavelength, intensity) in session
        .axis
        .points()
        .iter()
        .zip(session.calibrated.values())
    {
        writeln!(writer, "{:.4}\t{}", wavelength, intensity)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn save_spectrum_table(path: &Path, session: &CaptureSession) -> Result<(), SpectrometerError> {
    let file = File::create(path)?;
    write_spectrum_table(BufWriter::new(file), session)
}

fn invalid(path: &Path, reason: impl Into<String>) -> SpectrometerError {
    SpectrometerError::SpectrumFile {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse a spectrum table from any reader
///
/// The first three lines are skipped unconditionally; later blank lines and
/// `#` comments are ignored. Every data row needs a wavelength and an
/// intensity column.
pub fn parse_spectrum_table<R: BufRead>(
    reader: R,
    path: &Path,
) -> Result<SpectrumFile, SpectrometerError> {
    let mut wavelengths = Vec::new();
    let mut intensities = Vec::new();

    for (number, line) in reader.lines().enumerate().skip(HEADER_LINES) {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut columns = trimmed.split_whitespace();
        let (Some(wl), Some(intensity)) = (columns.next(), columns.next()) else {
            return Err(invalid(path, format!("line {} has fewer than 2 columns", number + 1)));
        };

        let wl: f64 = wl
            .parse()
            .map_err(|_| invalid(path, format!("line {}: bad wavelength {:?}", number + 1, wl)))?;
        let intensity: f64 = intensity.parse().map_err(|_| {
            invalid(path, format!("line {}: bad intensity {:?}", number + 1, intensity))
        })?;

        wavelengths.push(wl);
        intensities.push(intensity);
    }

    if wavelengths.is_empty() {
        return Err(invalid(path, "no data rows"));
    }

    Ok(SpectrumFile {
        path: path.to_path_buf(),
        axis: WavelengthAxis::from_points(wavelengths),
        intensities,
    })
}

pub fn read_spectrum_file(path: &Path) -> Result<SpectrumFile, SpectrometerError> {
    let file = File::open(path)?;
    parse_spectrum_table(BufReader::new(file), path)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::processing::{Calibrator, ColorTable, extract_peak};
    use crate::protocol::parser::parse_samples;

    fn session() -> CaptureSession {
        let axis = WavelengthAxis::linspace(380.0, 850.0, 288);
        let colors = ColorTable::for_axis(&axis);
        let line = (0..288u32)
            .map(|i| (100 + i * 3).to_string())
            .collect::<Vec<_>>()
            .join(",");
        let sample = parse_samples(&line, 288).unwrap();
        let calibrated = Calibrator::new(127, 873).calibrate(&sample);
        let peak = extract_peak(&calibrated, &axis, &colors);

        CaptureSession {
            timestamp: Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            sensor_name: "C12880MA".to_string(),
            offset: 127,
            axis,
            calibrated,
            peak,
        }
    }

    fn render(session: &CaptureSession) -> String {
        let mut buf = Vec::new();
        write_spectrum_table(&mut buf, session).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_header_lines() {
        let text = render(&session());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "# Spectrum C12880MA - captured 2026-03-14 09:26:53");
        assert_eq!(lines[1], "# Offset subtracted: 127");
        assert_eq!(lines[2], "# Wavelength (nm)\tIntensity (ADC)");
        assert_eq!(lines.len(), HEADER_LINES + 288);
    }

    #[test]
    fn test_row_format() {
        let text = render(&session());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[3], "380.0000\t0");
        assert_eq!(lines[290], "850.0000\t834");
    }

    #[test]
    fn test_round_trip() {
        let session = session();
        let text = render(&session);

        let file = parse_spectrum_table(text.as_bytes(), Path::new("mem.txt")).unwrap();

        assert_eq!(file.intensities.len(), 288);
        for i in 0..288 {
            assert_relative_eq!(file.axis.points()[i], session.axis.points()[i], epsilon = 1e-4);
            assert_eq!(file.intensities[i], session.calibrated.values()[i] as f64);
        }
    }

    #[test]
    fn test_save_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Espectro_Captura_20260314_092653.txt");
        let session = session();

        save_spectrum_table(&path, &session).unwrap();
        let file = read_spectrum_file(&path).unwrap();

        assert_eq!(file.path, path);
        assert!(file.axis.matches(&session.axis, 1e-4));
    }

    #[test]
    fn test_skips_exactly_three_lines() {
        let text = "header\nheader\nheader\n400.0 5\n401.0 6\n";
        let file = parse_spectrum_table(text.as_bytes(), Path::new("x.txt")).unwrap();
        assert_eq!(file.intensities, vec![5.0, 6.0]);
    }

    #[test]
    fn test_rejects_missing_column() {
        let text = "#\n#\n#\n400.0 5\n401.0\n";
        let err = parse_spectrum_table(text.as_bytes(), Path::new("bad.txt")).unwrap_err();
        assert!(matches!(err, SpectrometerError::SpectrumFile { .. }));
        assert!(err.to_string().contains("line 5"));
    }

    #[test]
    fn test_rejects_non_numeric() {
        let text = "#\n#\n#\n400.0 lots\n";
        assert!(parse_spectrum_table(text.as_bytes(), Path::new("bad.txt")).is_err());
    }

    #[test]
    fn test_rejects_header_only() {
        let text = "#\n#\n#\n";
        assert!(parse_spectrum_table(text.as_bytes(), Path::new("empty.txt")).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_spectrum_file(Path::new("/nonexistent/espectro.txt")).unwrap_err();
        assert!(matches!(err, SpectrometerError::Io(_)));
    }
}
