use super::color::{ColorTable, Rgb};
use crate::protocol::{CalibratedVector, WavelengthAxis};

/// Brightest pixel of a calibrated frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakResult {
    pub index: usize,
    pub wavelength: f64,
    pub intensity: u32,
    pub color: Rgb,
}

impl PeakResult {
    /// Plot title shown above the spectrum
    pub fn title(&self) -> String {
        format!(
            "Spectrometer | Peak: {:.1} nm | Intensity: {}",
            self.wavelength, self.intensity
        )
    }
}

/// Locate the maximum intensity; the first pixel wins ties.
///
/// Panics when the vector, axis and color table lengths differ or are empty,
/// since the pipeline always builds them from the same sensor profile.
pub fn extract_peak(
    vector: &CalibratedVector,
    axis: &WavelengthAxis,
    colors: &ColorTable,
) -> PeakResult {
    assert_eq!(vector.len(), axis.len(), "calibrated vector and axis differ in length");
    assert_eq!(axis.len(), colors.len(), "axis and color table differ in length");
    assert!(!vector.values().is_empty(), "cannot extract a peak from an empty frame");

    let values = vector.values();
    let mut index = 0;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value > values[index] {
            index = i;
        }
    }

    PeakResult {
        index,
        wavelength: axis.points()[index],
        intensity: values[index],
        color: colors.colors()[index],
    }
}
