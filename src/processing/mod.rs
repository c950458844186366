pub mod calibration;
pub mod color;
pub mod peak;
pub mod statistics;

pub use calibration::Calibrator;
pub use color::{ColorTable, Rgb};
pub use peak::{PeakResult, extract_peak};
pub use statistics::{Histogram, PeakFocus, SpectrumStack, histogram};
