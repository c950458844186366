use chrono::{DateTime, Utc};

/// Raw ADC count from the sensor (10-bit board ADC, nominal full scale 1000)
pub type RawAdcValue = u32;

/// A single newline-delimited record as received from the byte stream
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub bytes: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl RawLine {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self::with_timestamp(bytes, Utc::now())
    }

    pub fn with_timestamp(bytes: Vec<u8>, received_at: DateTime<Utc>) -> Self {
        Self { bytes, received_at }
    }

    /// Decode the line as UTF-8, dropping invalid sequences, and trim it.
    pub fn text(&self) -> String {
        let mut decoded = String::with_capacity(self.bytes.len());
        for chunk in self.bytes.utf8_chunks() {
            decoded.push_str(chunk.valid());
        }
        decoded.trim().to_string()
    }
}

/// One frame of raw sensor readings, one count per pixel
///
/// Only the line parser builds these, so the length always matches the
/// sensor profile's sample count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleVector(Vec<RawAdcValue>);

impl SampleVector {
    pub(crate) fn from_parsed(values: Vec<RawAdcValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[RawAdcValue] {
        &self.0
    }
}

/// Offset-subtracted, clipped intensities in `[0, y_max]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibratedVector(Vec<u32>);

impl CalibratedVector {
    pub(crate) fn from_calibrated(values: Vec<u32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Wavelength in nm of every sensor pixel, ascending
#[derive(Debug, Clone, PartialEq)]
pub struct WavelengthAxis(Vec<f64>);

impl WavelengthAxis {
    /// `count` points linearly spaced from `start` to `end`, both inclusive.
    pub fn linspace(start: f64, end: f64, count: usize) -> Self {
        let points = match count {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (end - start) / (count - 1) as f64;
                (0..count)
                    .map(|i| {
                        // Pin the last point so rounding never drifts past `end`.
                        if i == count - 1 {
                            end
                        } else {
                            start + step * i as f64
                        }
                    })
                    .collect()
            }
        };
        Self(points)
    }

    pub fn from_points(points: Vec<f64>) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<f64> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.0.last().copied()
    }

    /// Whether two axes agree point by point within `tolerance` nm.
    pub fn matches(&self, other: &WavelengthAxis, tolerance: f64) -> bool {
        self.len() == other.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}
