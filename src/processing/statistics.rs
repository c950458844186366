use std::path::{Path, PathBuf};

use statrs::statistics::Statistics;

use crate::error::SpectrometerError;
use crate::export::{SpectrumFile, read_spectrum_file};
use crate::protocol::WavelengthAxis;

/// Axes from different files count as equal within this many nm
const AXIS_TOLERANCE_NM: f64 = 1e-3;

/// Extension of saved capture tables
pub const TABLE_EXTENSION: &str = "txt";

/// A file left out of an aggregation, and why
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Intensities of many captures sharing one wavelength axis,
/// indexed `[capture][pixel]`
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumStack {
    axis: WavelengthAxis,
    paths: Vec<PathBuf>,
    rows: Vec<Vec<f64>>,
}

/// Result of loading a directory of captures
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub stack: SpectrumStack,
    pub skipped: Vec<SkippedFile>,
}

/// Per-pixel mean and population standard deviation
#[derive(Debug, Clone, PartialEq)]
pub struct BinStatistics {
    pub mean: Vec<f64>,
    pub std_dev: Vec<f64>,
}

/// Spread of the brightest pixel of the mean spectrum across captures
#[derive(Debug, Clone, PartialEq)]
pub struct PeakFocus {
    pub index: usize,
    pub wavelength: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Coefficient of variation in percent, `None` when the mean is zero
    pub relative_error: Option<f64>,
    pub values: Vec<f64>,
}

/// Equal-width histogram
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `counts.len() + 1` bin edges, ascending
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl SpectrumStack {
    pub fn new(first: SpectrumFile) -> Self {
        Self {
            axis: first.axis,
            paths: vec![first.path],
            rows: vec![first.intensities],
        }
    }

    /// Add a capture; it must share the stack's wavelength axis.
    pub fn push(&mut self, file: SpectrumFile) -> Result<(), SkippedFile> {
        if !self.axis.matches(&file.axis, AXIS_TOLERANCE_NM) {
            return Err(SkippedFile {
                reason: format!(
                    "wavelength axis differs ({} points, expected {})",
                    file.axis.len(),
                    self.axis.len()
                ),
                path: file.path,
            });
        }
        self.paths.push(file.path);
        self.rows.push(file.intensities);
        Ok(())
    }

    /// Load every `.txt` capture table in `dir`, in file name order
    ///
    /// Unreadable, malformed and axis-mismatched files are skipped and
    /// reported; the call fails only when nothing could be loaded.
    pub fn load_dir(dir: &Path) -> Result<LoadReport, SpectrometerError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(TABLE_EXTENSION)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(SpectrometerError::Aggregation(format!(
                "no .{} files found in {:?}",
                TABLE_EXTENSION, dir
            )));
        }

        tracing::info!("Found {} capture files in {:?}", paths.len(), dir);

        let mut stack: Option<SpectrumStack> = None;
        let mut skipped = Vec::new();

        for path in paths {
            let file = match read_spectrum_file(&path) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", path, e);
                    skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match stack.as_mut() {
                None => stack = Some(SpectrumStack::new(file)),
                Some(stack) => {
                    if let Err(skip) = stack.push(file) {
                        tracing::warn!("Skipping {:?}: {}", skip.path, skip.reason);
                        skipped.push(skip);
                    }
                }
            }
        }

        let stack = stack.ok_or_else(|| {
            SpectrometerError::Aggregation(format!("no readable capture files in {:?}", dir))
        })?;

        Ok(LoadReport { stack, skipped })
    }

    pub fn axis(&self) -> &WavelengthAxis {
        &self.axis
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn captures(&self) -> usize {
        self.rows.len()
    }

    /// Intensities of one pixel across every capture
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[index]).collect()
    }

    pub fn max_intensity(&self) -> f64 {
        self.rows
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn bin_statistics(&self) -> BinStatistics {
        let (mean, std_dev) = (0..self.axis.len())
            .map(|index| {
                let column = self.column(index);
                (column.iter().mean(), column.iter().population_std_dev())
            })
            .unzip();
        BinStatistics { mean, std_dev }
    }

    /// Statistics of the pixel where the mean spectrum peaks (first on ties)
    pub fn peak_focus(&self, stats: &BinStatistics) -> PeakFocus {
        let mut index = 0;
        for (i, &value) in stats.mean.iter().enumerate() {
            if value > stats.mean[index] {
                index = i;
            }
        }

        let mean = stats.mean[index];
        let std_dev = stats.std_dev[index];
        let relative_error = (mean != 0.0).then(|| std_dev / mean * 100.0);

        PeakFocus {
            index,
            wavelength: self.axis.points()[index],
            mean,
            std_dev,
            relative_error,
            values: self.column(index),
        }
    }
}

/// Bin `values` into `bins` equal-width bins spanning their min..max
///
/// The last bin includes its upper edge. A zero-width range is widened by
/// half a unit on each side.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    let (mut low, mut high) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if !low.is_finite() || !high.is_finite() {
        low = 0.0;
        high = 1.0;
    } else {
        // Spans below the float resolution of the values cannot be split into bins
        let center = low / 2.0 + high / 2.0;
        if high - low <= center.abs() * 1e-9 {
            let half = (center.abs() * 1e-6).max(0.5);
            low = center - half;
            high = center + half;
        }
    }

    let width = (high - low) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| low + width * i as f64).collect();

    let mut counts = vec![0; bins];
    for &value in values {
        let slot = (((value - low) / width).floor() as usize).min(bins - 1);
        counts[slot] += 1;
    }

    Histogram { edges, counts }
}
