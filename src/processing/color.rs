use crate::protocol::WavelengthAxis;

/// Shortest and longest wavelengths of the visible-light color model, in nm
pub const VISIBLE_MIN_NM: f64 = 380.0;
pub const VISIBLE_MAX_NM: f64 = 780.0;

const GAMMA: f64 = 1.0;

/// Normalized RGB color, each channel in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);

    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Scale to 8-bit channels for raster and terminal output
    pub fn to_rgb8(self) -> (u8, u8, u8) {
        let scale = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        (scale(self.r), scale(self.g), scale(self.b))
    }
}

/// Approximate the perceived color of a wavelength
///
/// Wavelengths outside the visible model are pinned to its 380 nm or 780 nm
/// edge, so the 780-850 nm tail of the sensor draws in the 780 nm color.
pub fn wavelength_to_rgb(wavelength_nm: f64) -> Rgb {
    if wavelength_nm.is_nan() {
        return Rgb::BLACK;
    }
    let wl = if wavelength_nm < VISIBLE_MIN_NM {
        VISIBLE_MIN_NM
    } else if wavelength_nm > VISIBLE_MAX_NM {
        VISIBLE_MAX_NM
    } else {
        wavelength_nm
    };

    let (r, g, b) = if (380.0..440.0).contains(&wl) {
        (-(wl - 440.0) / (440.0 - 380.0), 0.0, 1.0)
    } else if (440.0..490.0).contains(&wl) {
        (0.0, (wl - 440.0) / (490.0 - 440.0), 1.0)
    } else if (490.0..510.0).contains(&wl) {
        (0.0, 1.0, -(wl - 510.0) / (510.0 - 490.0))
    } else if (510.0..580.0).contains(&wl) {
        ((wl - 510.0) / (580.0 - 510.0), 1.0, 0.0)
    } else if (580.0..645.0).contains(&wl) {
        (1.0, -(wl - 645.0) / (645.0 - 580.0), 0.0)
    } else if (645.0..=780.0).contains(&wl) {
        (1.0, 0.0, 0.0)
    } else {
        (0.0, 0.0, 0.0)
    };

    // Dim towards the edges of human vision
    let factor = if (380.0..420.0).contains(&wl) {
        0.3 + 0.7 * (wl - 380.0) / (420.0 - 380.0)
    } else if (700.0..=780.0).contains(&wl) {
        0.3 + 0.7 * (780.0 - wl) / (780.0 - 700.0)
    } else {
        1.0
    };

    let adjust = |channel: f64| (channel * factor).powf(GAMMA).clamp(0.0, 1.0);

    Rgb::new(adjust(r), adjust(g), adjust(b))
}

/// Precomputed color of every pixel on a wavelength axis
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable(Vec<Rgb>);

impl ColorTable {
    pub fn for_axis(axis: &WavelengthAxis) -> Self {
        Self(axis.points().iter().map(|&wl| wavelength_to_rgb(wl)).collect())
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
