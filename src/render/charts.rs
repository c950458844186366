//! Aggregate charts over a directory of saved captures.

use std::path::Path;

use plotters::prelude::*;

use super::plot::{
    Chart, ChartText, FONT_FAMILY, FRAME_COLOR, build_chart, figure_pixels, load_fonts, points,
    save_rgb_png, stroke_pixels,
};
use super::render_error;
use crate::error::SpectrometerError;
use crate::processing::{Histogram, PeakFocus, SpectrumStack};

const BAR_COLOR: RGBColor = RGBColor(0, 100, 0);
const MEAN_COLOR: RGBColor = RGBColor(220, 20, 20);
const SIGMA_COLOR: RGBColor = RGBColor(255, 140, 0);

/// x range of an overlay: 99% of the first wavelength to 101% of the last
pub fn overlay_x_range(stack: &SpectrumStack) -> (f64, f64) {
    let first = stack.axis().first().unwrap_or(0.0);
    let last = stack.axis().last().unwrap_or(1.0);
    (first * 0.99, last * 1.01)
}

/// y range of an overlay: zero to 110% of the brightest sample
pub fn overlay_y_range(stack: &SpectrumStack) -> (f64, f64) {
    let max = stack.max_intensity();
    if max.is_finite() && max > 0.0 {
        (0.0, max * 1.1)
    } else {
        (0.0, 1.0)
    }
}

/// Draw every capture of the stack on one set of axes and save as PNG.
///
/// Captures are labelled `e1`, `e2`, ... in load order.
pub fn render_overlay(
    stack: &SpectrumStack,
    title: &str,
    path: &Path,
    dpi: u32,
) -> Result<(), SpectrometerError> {
    load_fonts()?;
    let (width, height) = figure_pixels(dpi);
    let mut buf = vec![0u8; (width * height * 3) as usize];
    let (x_min, x_max) = overlay_x_range(stack);
    let (y_min, y_max) = overlay_y_range(stack);
    let line_style = BLACK.mix(0.7).stroke_width(stroke_pixels(dpi).div_ceil(2));
    let caption = format!("Overlay of spectra: {}", title);

    {
        let root = BitMapBackend::with_buffer(&mut buf, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let text = ChartText {
            caption: &caption,
            caption_color: BLACK,
            x_desc: "Wavelength (nm)",
            y_desc: "Intensity (ADC, offset subtracted)",
        };
        let mut chart = build_chart(&root, &text, x_min..x_max, y_min..y_max, dpi)?;

        let legend_len = points(18.0, dpi) as i32;
        for (i, row) in stack.rows().iter().enumerate() {
            let series = stack.axis().points().iter().copied().zip(row.iter().copied());
            chart
                .draw_series(LineSeries::new(series, line_style))
                .map_err(render_error)?
                .label(format!("e{}", i + 1))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + legend_len, y)], line_style));
        }

        draw_legend(&mut chart, dpi)?;
        root.present().map_err(render_error)?;
    }

    save_rgb_png(path, &buf, width, height)?;
    tracing::debug!("Overlay of {} captures saved to {:?}", stack.captures(), path);
    Ok(())
}

/// Draw the peak-pixel histogram with its mean and one-sigma band edges
pub fn render_histogram(
    histogram: &Histogram,
    focus: &PeakFocus,
    path: &Path,
    dpi: u32,
) -> Result<(), SpectrometerError> {
    load_fonts()?;
    let (width, height) = figure_pixels(dpi);
    let mut buf = vec![0u8; (width * height * 3) as usize];

    let mut x_min = histogram.edges.first().copied().unwrap_or(0.0);
    let mut x_max = histogram.edges.last().copied().unwrap_or(1.0);
    x_min = x_min.min(focus.mean - focus.std_dev);
    x_max = x_max.max(focus.mean + focus.std_dev);
    let pad = (x_max - x_min) * 0.05;
    let (x_min, x_max) = (x_min - pad, x_max + pad);

    let tallest = histogram.counts.iter().copied().max().unwrap_or(0).max(1);
    let (y_min, y_max) = (0.0, tallest as f64 * 1.1);
    let stroke = stroke_pixels(dpi);

    let caption = match focus.relative_error {
        Some(error) => format!(
            "Intensity distribution at the peak ({:.2} nm), relative error {:.2} %",
            focus.wavelength, error
        ),
        None => format!(
            "Intensity distribution at the peak ({:.2} nm), relative error undefined",
            focus.wavelength
        ),
    };

    {
        let root = BitMapBackend::with_buffer(&mut buf, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let text = ChartText {
            caption: &caption,
            caption_color: BLACK,
            x_desc: "Intensity (ADC, offset subtracted)",
            y_desc: "Frequency (spectra)",
        };
        let mut chart = build_chart(&root, &text, x_min..x_max, y_min..y_max, dpi)?;

        let filled = histogram
            .counts
            .iter()
            .zip(histogram.edges.windows(2))
            .filter(|(count, _)| **count > 0);
        chart
            .draw_series(filled.clone().map(|(&count, edge)| {
                Rectangle::new([(edge[0], 0.0), (edge[1], count as f64)], BAR_COLOR.mix(0.7).filled())
            }))
            .map_err(render_error)?;
        chart
            .draw_series(filled.map(|(&count, edge)| {
                Rectangle::new([(edge[0], 0.0), (edge[1], count as f64)], FRAME_COLOR.stroke_width(1))
            }))
            .map_err(render_error)?;

        let legend_len = points(18.0, dpi) as i32;
        let markers = [
            (focus.mean, MEAN_COLOR, format!("Mean: {:.2}", focus.mean)),
            (focus.mean + focus.std_dev, SIGMA_COLOR, "+1 σ".to_string()),
            (focus.mean - focus.std_dev, SIGMA_COLOR, "-1 σ".to_string()),
        ];
        for (x, color, label) in markers {
            let style = color.stroke_width(stroke);
            chart
                .draw_series(std::iter::once(PathElement::new(vec![(x, y_min), (x, y_max)], style)))
                .map_err(render_error)?
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + legend_len, y)], style));
        }

        draw_legend(&mut chart, dpi)?;
        root.present().map_err(render_error)?;
    }

    save_rgb_png(path, &buf, width, height)?;
    tracing::debug!("Histogram of pixel {} saved to {:?}", focus.index, path);
    Ok(())
}

fn draw_legend<'a, 'b: 'a>(chart: &mut Chart<'a, 'b>, dpi: u32) -> Result<(), SpectrometerError> {
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(FRAME_COLOR)
        .label_font((FONT_FAMILY, points(10.0, dpi)))
        .draw()
        .map_err(render_error)
}
