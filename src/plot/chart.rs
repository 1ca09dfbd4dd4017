//! Plotters-powered SVG chart: one panel per scenario.
//!
//! Each panel shows the samples as markers with vertical error bars, the fitted
//! curve across the fit domain, and an optional legend. All styling comes from
//! the `ChartStyle` and the panel itself; there is no global style state.

use std::error::Error;
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::domain::{FitResult, PlotColor, Sample};
use crate::error::AppError;

/// Figure-wide styling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
    /// Marker radius in pixels.
    pub marker_size: u32,
    pub line_color: PlotColor,
    pub show_legend: bool,
    /// Panels per row.
    pub columns: usize,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            marker_size: 3,
            line_color: PlotColor::Red,
            show_legend: true,
            columns: 2,
        }
    }
}

/// Render-only description of one panel.
///
/// All series and labels are computed up front, so drawing needs nothing else.
#[derive(Debug, Clone)]
pub struct ChartPanel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub samples: Vec<Sample>,
    pub marker: PlotColor,
    /// Fitted curve; empty when there is no fit to draw.
    pub curve: Vec<(f64, f64)>,
    pub fit_label: String,
}

impl ChartPanel {
    /// Sample the fit over its domain (clipped to the data) at `n` points.
    pub fn curve_from_fit(fit: &FitResult, samples: &[Sample], n: usize) -> Vec<(f64, f64)> {
        let Some((lo, hi)) = fit.domain.clip_to(samples) else {
            return Vec::new();
        };
        let n = n.max(2);
        (0..n)
            .map(|i| {
                let x = lo + (hi - lo) * i as f64 / (n as f64 - 1.0);
                (x, fit.predict(x))
            })
            .filter(|(_, y)| y.is_finite())
            .collect()
    }
}

/// Write all panels into one SVG file laid out on a grid.
pub fn render_svg(path: &Path, panels: &[ChartPanel], style: &ChartStyle) -> Result<(), AppError> {
    if panels.is_empty() {
        return Err(AppError::new(4, "Nothing to draw: no scenario produced a fit."));
    }
    draw_figure(path, panels, style)
        .map_err(|e| AppError::new(4, format!("Failed to render SVG '{}': {e}", path.display())))
}

fn draw_figure(path: &Path, panels: &[ChartPanel], style: &ChartStyle) -> Result<(), Box<dyn Error>> {
    let columns = style.columns.clamp(1, panels.len());
    let rows = panels.len().div_ceil(columns);

    let root = SVGBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let areas = root.split_evenly((rows, columns));
    for (area, panel) in areas.iter().zip(panels) {
        draw_panel(area, panel, style)?;
    }

    root.present()?;
    Ok(())
}

fn draw_panel(area: &DrawingArea<SVGBackend<'_>, Shift>, panel: &ChartPanel, style: &ChartStyle) -> Result<(), Box<dyn Error>> {
    let (x0, x1) = bounds(panel.samples.iter().map(|s| s.x).chain(panel.curve.iter().map(|&(x, _)| x)));
    let (y0, y1) = bounds(
        panel
            .samples
            .iter()
            .flat_map(|s| [s.y - s.sigma_y, s.y + s.sigma_y])
            .chain(panel.curve.iter().map(|&(_, y)| y)),
    );

    let mut chart = ChartBuilder::on(area)
        .caption(panel.title.as_str(), ("sans-serif", 18))
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .x_desc(panel.x_label.as_str())
        .y_desc(panel.y_label.as_str())
        .x_labels(6)
        .y_labels(6)
        .draw()?;

    let marker = rgb(panel.marker);
    let size = style.marker_size;
    let points: Vec<&Sample> = panel.samples.iter().filter(|s| s.x.is_finite() && s.y.is_finite()).collect();

    chart.draw_series(points.iter().map(|s| {
        ErrorBar::new_vertical(s.x, s.y - s.sigma_y, s.y, s.y + s.sigma_y, marker.filled(), size * 2)
    }))?;
    chart
        .draw_series(points.iter().map(|s| Circle::new((s.x, s.y), size, marker.filled())))?
        .label("dati")
        .legend(move |(x, y)| Circle::new((x + 10, y), 3, marker.filled()));

    if !panel.curve.is_empty() {
        let line = rgb(style.line_color);
        chart
            .draw_series(LineSeries::new(panel.curve.iter().copied(), line.stroke_width(2)))?
            .label(panel.fit_label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line));
    }

    if style.show_legend {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    Ok(())
}

fn rgb(color: PlotColor) -> RGBColor {
    match color {
        PlotColor::Blue => BLUE,
        PlotColor::Green => RGBColor(0, 160, 0),
        PlotColor::Red => RED,
    }
}

/// Finite min/max padded by 5%; `(0, 1)` when there is nothing to bound.
fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-12 * lo.abs().max(1.0));
    (lo - pad, hi + pad)
}
