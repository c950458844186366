pub mod charts;
pub mod live;
pub mod plot;

use std::path::Path;

pub use live::LiveView;
pub use plot::PlotRenderer;

use crate::error::SpectrometerError;
use crate::processing::{PeakResult, Rgb};
use crate::protocol::CalibratedVector;

/// One redraw of the spectrum: new line data and a new title
#[derive(Debug, Clone, PartialEq)]
pub struct PlotFrame<'a> {
    pub vector: &'a CalibratedVector,
    pub title: String,
    pub title_color: Rgb,
    /// Pixel index highlighted as the peak
    pub marker: Option<usize>,
}

impl<'a> PlotFrame<'a> {
    pub fn with_peak(vector: &'a CalibratedVector, peak: &PeakResult) -> Self {
        Self {
            vector,
            title: peak.title(),
            title_color: peak.color,
            marker: Some(peak.index),
        }
    }
}

/// Destination for rendered spectra
///
/// Construction takes the static wavelength axis and colors; `update` redraws
/// in place on the same axes.
pub trait RenderSink {
    fn update(&mut self, frame: &PlotFrame<'_>) -> Result<(), SpectrometerError>;

    /// Rasterize the current frame to an image file
    fn save(&self, path: &Path, dpi: u32) -> Result<(), SpectrometerError>;

    fn close(&mut self) -> Result<(), SpectrometerError>;

    fn name(&self) -> &str;
}

pub(crate) fn render_error(err: impl std::fmt::Display) -> SpectrometerError {
    SpectrometerError::Render(err.to_string())
}
