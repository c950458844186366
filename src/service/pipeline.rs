use chrono::{DateTime, Utc};

use crate::config::SensorProfile;
use crate::data_source::SourceEvent;
use crate::error::TransportError;
use crate::processing::{Calibrator, ColorTable, PeakResult, extract_peak};
use crate::protocol::{CalibratedVector, RawLine, WavelengthAxis, parse_line};

/// A line that parsed into a full frame, calibrated and analysed
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub calibrated: CalibratedVector,
    pub peak: PeakResult,
    pub received_at: DateTime<Utc>,
}

/// Result of one acquisition cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Frame(Capture),
    /// The line was not a frame: wrong count, empty or non-numeric
    Rejected,
    Transport(TransportError),
}

/// Parse, calibrate and locate the peak, shared by single-shot and
/// continuous acquisition
#[derive(Debug, Clone)]
pub struct Pipeline {
    profile: SensorProfile,
    axis: WavelengthAxis,
    colors: ColorTable,
    calibrator: Calibrator,
}

impl Pipeline {
    pub fn new(profile: SensorProfile) -> Self {
        let axis = WavelengthAxis::linspace(
            profile.wavelength_min,
            profile.wavelength_max,
            profile.sample_count,
        );
        let colors = ColorTable::for_axis(&axis);
        let calibrator = Calibrator::new(profile.offset, profile.y_max());
        Self {
            profile,
            axis,
            colors,
            calibrator,
        }
    }

    pub fn profile(&self) -> &SensorProfile {
        &self.profile
    }

    pub fn axis(&self) -> &WavelengthAxis {
        &self.axis
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn process_line(&self, line: &RawLine) -> Option<Capture> {
        let samples = parse_line(line, self.profile.sample_count)?;
        let calibrated = self.calibrator.calibrate(&samples);
        let peak = extract_peak(&calibrated, &self.axis, &self.colors);
        Some(Capture {
            calibrated,
            peak,
            received_at: line.received_at,
        })
    }

    pub fn process(&self, event: SourceEvent) -> CycleOutcome {
        match event {
            SourceEvent::Line(line) => match self.process_line(&line) {
                Some(capture) => CycleOutcome::Frame(capture),
                None => CycleOutcome::Rejected,
            },
            SourceEvent::Error(e) => CycleOutcome::Transport(e),
        }
    }
}
