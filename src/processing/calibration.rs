use crate::protocol::{CalibratedVector, RawAdcValue, SampleVector};

/// Calibration processor for converting raw ADC counts to bounded intensities
///
/// Formula: clamp(sample - offset, 0, y_max)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibrator {
    offset: RawAdcValue,
    y_max: u32,
}

impl Calibrator {
    pub fn new(offset: RawAdcValue, y_max: u32) -> Self {
        Self { offset, y_max }
    }

    pub fn y_max(&self) -> u32 {
        self.y_max
    }

    /// Calibrate a single count
    ///
    /// Counts below the offset floor at 0, counts above `offset + y_max` saturate.
    pub fn calibrate_value(&self, raw: RawAdcValue) -> u32 {
        raw.saturating_sub(self.offset).min(self.y_max)
    }

    /// Calibrate a whole frame, pixel by pixel
    pub fn calibrate(&self, sample: &SampleVector) -> CalibratedVector {
        CalibratedVector::from_calibrated(
            sample
                .values()
                .iter()
                .map(|&raw| self.calibrate_value(raw))
                .collect(),
        )
    }
}
