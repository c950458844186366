//! Static spectrum plots rasterized with plotters and encoded as PNG.

use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;

use plotters::coord::Shift;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};

use super::{PlotFrame, RenderSink, render_error};
use crate::error::SpectrometerError;
use crate::processing::{ColorTable, Rgb};
use crate::protocol::WavelengthAxis;

/// Figure size in inches; pixel size is this times the dpi.
pub const FIGURE_WIDTH_IN: f64 = 14.0;
pub const FIGURE_HEIGHT_IN: f64 = 7.0;

const MIN_DPI: u32 = 10;
const MAX_DPI: u32 = 600;

pub(crate) const FONT_FAMILY: &str = "sans-serif";
static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
static FONT_LOADED: OnceLock<bool> = OnceLock::new();

pub(crate) const GRID_COLOR: RGBColor = RGBColor(215, 215, 215);
pub(crate) const FRAME_COLOR: RGBColor = RGBColor(40, 40, 40);

const DEFAULT_CAPTION: &str = "Spectrometer";

pub(crate) type Chart<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Pixel dimensions of a figure at `dpi`, clamped to a sane range
pub fn figure_pixels(dpi: u32) -> (u32, u32) {
    let dpi = dpi.clamp(MIN_DPI, MAX_DPI) as f64;
    (
        (FIGURE_WIDTH_IN * dpi).round() as u32,
        (FIGURE_HEIGHT_IN * dpi).round() as u32,
    )
}

/// Size in pixels of `pt` typographic points at `dpi`
pub(crate) fn points(pt: f64, dpi: u32) -> u32 {
    ((pt * dpi.clamp(MIN_DPI, MAX_DPI) as f64 / 72.0).round() as u32).max(1)
}

/// Line width in pixels for a 2 pt stroke
pub(crate) fn stroke_pixels(dpi: u32) -> u32 {
    points(2.0, dpi)
}

pub(crate) fn to_plot_color(color: Rgb) -> RGBColor {
    let (r, g, b) = color.to_rgb8();
    RGBColor(r, g, b)
}

/// Make the embedded sans-serif face available to plotters.
///
/// Registration happens once per process; later calls only report the result.
pub(crate) fn load_fonts() -> Result<(), SpectrometerError> {
    let loaded = *FONT_LOADED
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT_DATA).is_ok());
    if loaded {
        Ok(())
    } else {
        Err(SpectrometerError::Render(
            "embedded font is not a valid TrueType file".to_string(),
        ))
    }
}

/// Text placed around a chart
pub(crate) struct ChartText<'t> {
    pub caption: &'t str,
    pub caption_color: RGBColor,
    pub x_desc: &'t str,
    pub y_desc: &'t str,
}

/// Captioned chart with labelled axes and a light grid
pub(crate) fn build_chart<'a, 'b>(
    root: &'a DrawingArea<BitMapBackend<'b>, Shift>,
    text: &ChartText<'_>,
    x: Range<f64>,
    y: Range<f64>,
    dpi: u32,
) -> Result<Chart<'a, 'b>, SpectrometerError> {
    let mut chart = ChartBuilder::on(root)
        .caption(
            text.caption,
            (FONT_FAMILY, points(14.0, dpi))
                .into_font()
                .color(&text.caption_color),
        )
        .margin(points(10.0, dpi))
        .x_label_area_size(points(32.0, dpi))
        .y_label_area_size(points(48.0, dpi))
        .build_cartesian_2d(x, y)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .light_line_style(GRID_COLOR.mix(0.5))
        .bold_line_style(GRID_COLOR)
        .axis_style(FRAME_COLOR)
        .x_desc(text.x_desc)
        .y_desc(text.y_desc)
        .label_style((FONT_FAMILY, points(10.0, dpi)))
        .axis_desc_style((FONT_FAMILY, points(12.0, dpi)))
        .draw()
        .map_err(render_error)?;

    Ok(chart)
}

pub(crate) fn save_rgb_png(
    path: &Path,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<(), SpectrometerError> {
    image::save_buffer(path, buf, width, height, image::ColorType::Rgb8).map_err(render_error)
}

#[derive(Debug, Clone)]
struct FrameData {
    values: Vec<u32>,
    title: String,
    title_color: Rgb,
    marker: Option<usize>,
}

/// Off-screen spectrum plot
///
/// Each segment between neighbouring pixels takes the color of its left
/// pixel. The caption is the frame title drawn in the peak color.
pub struct PlotRenderer {
    axis: WavelengthAxis,
    colors: ColorTable,
    y_max: u32,
    frame: Option<FrameData>,
}

impl PlotRenderer {
    pub fn new(axis: WavelengthAxis, colors: ColorTable, y_max: u32) -> Self {
        assert_eq!(axis.len(), colors.len(), "axis and color table differ in length");
        Self {
            axis,
            colors,
            y_max,
            frame: None,
        }
    }

    /// Rasterize the current frame into an RGB8 buffer
    pub fn render_rgb(&self, dpi: u32) -> Result<(Vec<u8>, u32, u32), SpectrometerError> {
        load_fonts()?;
        let (width, height) = figure_pixels(dpi);
        let mut buf = vec![0u8; (width * height * 3) as usize];

        let x_min = self.axis.first().unwrap_or(0.0);
        let x_max = self.axis.last().unwrap_or(1.0);
        let y_max = self.y_max.max(1) as f64;
        let stroke = stroke_pixels(dpi);

        let (caption, caption_color) = match &self.frame {
            Some(frame) => (frame.title.as_str(), to_plot_color(frame.title_color)),
            None => (DEFAULT_CAPTION, FRAME_COLOR),
        };

        {
            let root = BitMapBackend::with_buffer(&mut buf, (width, height)).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;

            let text = ChartText {
                caption,
                caption_color,
                x_desc: "Wavelength (nm)",
                y_desc: "Intensity (ADC)",
            };
            let mut chart = build_chart(&root, &text, x_min..x_max, 0f64..y_max, dpi)?;

            if let Some(frame) = &self.frame {
                let wavelengths = self.axis.points();
                let colors = self.colors.colors();
                let segments = (1..frame.values.len().min(wavelengths.len())).map(|i| {
                    PathElement::new(
                        vec![
                            (wavelengths[i - 1], frame.values[i - 1] as f64),
                            (wavelengths[i], frame.values[i] as f64),
                        ],
                        to_plot_color(colors[i - 1]).stroke_width(stroke),
                    )
                });
                chart.draw_series(segments).map_err(render_error)?;

                if let Some(index) = frame.marker.filter(|&i| i < wavelengths.len()) {
                    let x = wavelengths[index];
                    chart
                        .draw_series(std::iter::once(PathElement::new(
                            vec![(x, 0.0), (x, y_max)],
                            to_plot_color(frame.title_color).mix(0.5).stroke_width(1),
                        )))
                        .map_err(render_error)?;
                }
            }

            root.present().map_err(render_error)?;
        }

        Ok((buf, width, height))
    }
}

impl RenderSink for PlotRenderer {
    fn update(&mut self, frame: &PlotFrame<'_>) -> Result<(), SpectrometerError> {
        self.frame = Some(FrameData {
            values: frame.vector.values().to_vec(),
            title: frame.title.clone(),
            title_color: frame.title_color,
            marker: frame.marker,
        });
        Ok(())
    }

    fn save(&self, path: &Path, dpi: u32) -> Result<(), SpectrometerError> {
        let (buf, width, height) = self.render_rgb(dpi)?;
        save_rgb_png(path, &buf, width, height)?;
        tracing::debug!("Saved {}x{} plot to {:?}", width, height, path);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SpectrometerError> {
        self.frame = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "png"
    }
}
