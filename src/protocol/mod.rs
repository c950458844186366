pub mod parser;
pub mod types;

pub use parser::parse_line;
pub use types::{CalibratedVector, RawAdcValue, RawLine, SampleVector, WavelengthAxis};
