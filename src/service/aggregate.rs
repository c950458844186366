//! Batch analysis of a directory of saved captures.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::error::SpectrometerError;
use crate::processing::statistics::SkippedFile;
use crate::processing::{Histogram, PeakFocus, SpectrumStack, histogram};
use crate::render::charts::{render_histogram, render_overlay};

/// Image written next to the captures by `run_stats`
pub const HISTOGRAM_FILE: &str = "Analisis_Histograma_Foco.png";
pub const OVERLAY_PREFIX: &str = "Superposicion_";

// Whitespace and path separators cannot appear in the overlay file name
static FILE_NAME_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s/\\]").unwrap());

/// Overlay image name for `title` at `timestamp`
pub fn overlay_file_name(title: &str, timestamp: &DateTime<Local>) -> String {
    format!(
        "{}{}_{}.png",
        OVERLAY_PREFIX,
        FILE_NAME_UNSAFE.replace_all(title, "_"),
        timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Outcome of `run_stats`
#[derive(Debug, Clone)]
pub struct StatsReport {
    pub captures: usize,
    pub skipped: Vec<SkippedFile>,
    pub focus: PeakFocus,
    pub histogram: Histogram,
    pub image: PathBuf,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Statistical error at the peak ---")?;
        writeln!(f, "Captures analysed: {} ({} skipped)", self.captures, self.skipped.len())?;
        writeln!(f, "Peak wavelength: {:.2} nm", self.focus.wavelength)?;
        writeln!(f, "Mean intensity at peak: {:.2} ADC", self.focus.mean)?;
        writeln!(f, "Standard deviation (error): {:.2} ADC", self.focus.std_dev)?;
        match self.focus.relative_error {
            Some(error) => write!(f, "Relative error (coefficient of variation): {:.2} %", error),
            None => write!(f, "Relative error (coefficient of variation): undefined, zero mean"),
        }
    }
}

/// Outcome of `run_overlay`
#[derive(Debug, Clone)]
pub struct OverlayReport {
    pub captures: usize,
    /// Plotted files in legend order (`e1` first)
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
    pub image: PathBuf,
}

/// Per-pixel statistics over every capture in `dir`, plus a histogram of the
/// peak pixel saved as [`HISTOGRAM_FILE`] in the same directory
pub fn run_stats(dir: &Path, bins: usize, dpi: u32) -> Result<StatsReport, SpectrometerError> {
    let loaded = SpectrumStack::load_dir(dir)?;
    let stack = loaded.stack;

    let stats = stack.bin_statistics();
    let focus = stack.peak_focus(&stats);
    let histogram = histogram(&focus.values, bins);

    tracing::info!(
        "Peak of the mean spectrum at {:.2} nm over {} captures: mean {:.2}, std {:.2}",
        focus.wavelength,
        stack.captures(),
        focus.mean,
        focus.std_dev
    );

    let image = dir.join(HISTOGRAM_FILE);
    render_histogram(&histogram, &focus, &image, dpi)?;
    tracing::info!("Histogram saved to {:?}", image);

    Ok(StatsReport {
        captures: stack.captures(),
        skipped: loaded.skipped,
        focus,
        histogram,
        image,
    })
}

/// Draw every capture in `dir` on one plot, saved in the same directory
pub fn run_overlay(dir: &Path, title: &str, dpi: u32) -> Result<OverlayReport, SpectrometerError> {
    let loaded = SpectrumStack::load_dir(dir)?;

    let image = dir.join(overlay_file_name(title, &Local::now()));
    render_overlay(&loaded.stack, title, &image, dpi)?;
    tracing::info!(
        "Overlay of {} captures of '{}' saved to {:?}",
        loaded.stack.captures(),
        title,
        image
    );

    Ok(OverlayReport {
        captures: loaded.stack.captures(),
        files: loaded.stack.paths().to_vec(),
        skipped: loaded.skipped,
        image,
    })
}
