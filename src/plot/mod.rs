//! Plotting
//!
//! Every plot is split in two steps: a pure composition that decides what
//! goes where, and a rasterization of that composition onto a [`Figure`].
pub mod dependence;
pub mod figure;
pub mod summary;

pub use dependence::{DependencePlot, Interaction};
pub use figure::Figure;
pub use summary::{SummaryPlot, SummaryPlotType};

use crate::constants::AXIS_PADDING;
use crate::errors::RenderError;
use crate::utils::{finite_range, quantile_sorted, sorted_finite};
use plotters::coord::Shift;
use plotters::prelude::*;

/// Low end of the red-blue diverging map.
pub const BLUE: RGBColor = RGBColor(0, 139, 251);
/// High end of the red-blue diverging map.
pub const RED: RGBColor = RGBColor(255, 0, 81);
/// Points without a value to color by.
pub const MISSING_GREY: RGBColor = RGBColor(119, 119, 119);
/// Single color used when nothing drives the point colors.
pub const DEFAULT_POINT: RGBColor = RGBColor(30, 136, 229);
pub const HISTOGRAM_GREY: RGBColor = RGBColor(128, 128, 128);

pub(crate) const COLORBAR_WIDTH: u32 = 140;

pub(crate) fn backend_error<E: std::fmt::Display>(what: &str) -> impl FnOnce(E) -> RenderError + '_ {
    move |e| RenderError::Backend(what.to_string(), e.to_string())
}

/// Interpolate the red-blue map, `t = 0` is blue and `t = 1` red.
pub fn red_blue(t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(lerp(BLUE.0, RED.0), lerp(BLUE.1, RED.1), lerp(BLUE.2, RED.2))
}

/// Maps values onto the red-blue map, saturating outside the 5th to 95th
/// percentile so outliers do not wash out the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorNorm {
    pub low: f64,
    pub high: f64,
}

impl ColorNorm {
    /// `None` when there are no finite values.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let sorted = sorted_finite(values);
        if sorted.is_empty() {
            return None;
        }
        let mut low = quantile_sorted(&sorted, 0.05);
        let mut high = quantile_sorted(&sorted, 0.95);
        if low == high {
            low = sorted[0];
            high = sorted[sorted.len() - 1];
        }
        Some(ColorNorm { low, high })
    }

    pub fn color(&self, v: f64) -> RGBColor {
        if !v.is_finite() {
            return MISSING_GREY;
        }
        if self.high == self.low {
            return red_blue(0.5);
        }
        red_blue((v - self.low) / (self.high - self.low))
    }
}

/// A vertical color bar drawn to the right of the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBar {
    pub label: String,
    pub norm: ColorNorm,
    /// Tick text shown at the low and high ends.
    pub low_text: String,
    pub high_text: String,
}

/// Auto-scaled axis range over the finite values, padded on both sides.
pub(crate) fn padded_range(values: &[f64]) -> Option<(f64, f64)> {
    let (lo, hi) = finite_range(values)?;
    let span = hi - lo;
    let pad = if span > 0.0 { span * AXIS_PADDING } else { (lo.abs() * AXIS_PADDING).max(0.5) };
    Some((lo - pad, hi + pad))
}

/// Check a user supplied axis limit.
pub(crate) fn check_limit(name: &str, limit: Option<(f64, f64)>) -> Result<(), RenderError> {
    match limit {
        Some((lo, hi)) if !(lo.is_finite() && hi.is_finite() && lo < hi) => Err(RenderError::InvalidParameter(
            name.to_string(),
            "finite bounds with lower < upper".to_string(),
            format!("[{}, {}]", lo, hi),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    bar: &ColorBar,
) -> Result<(), RenderError> {
    let (w, h) = area.dim_in_pixel();
    let top = (h as i32) / 8;
    let bottom = (h as i32) * 7 / 8;
    let left = 20;
    let right = left + (w as i32 / 6).max(12);
    let steps = (bottom - top).max(1);
    for i in 0..steps {
        let t = 1.0 - i as f64 / steps as f64;
        area.draw(&Rectangle::new(
            [(left, top + i), (right, top + i + 1)],
            red_blue(t).filled(),
        ))
        .map_err(backend_error("color bar"))?;
    }
    let font = ("sans-serif", 16).into_font();
    area.draw(&Text::new(bar.high_text.clone(), (right + 6, top - 8), font.clone()))
        .map_err(backend_error("color bar"))?;
    area.draw(&Text::new(bar.low_text.clone(), (right + 6, bottom - 8), font.clone()))
        .map_err(backend_error("color bar"))?;
    area.draw(&Text::new(bar.label.clone(), (left, bottom + 16), font))
        .map_err(backend_error("color bar"))?;
    Ok(())
}
