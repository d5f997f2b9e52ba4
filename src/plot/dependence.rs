//! Dependence Plot Renderer
//!
//! Scatter of a feature's attributions against its values, colored by a
//! segment column or an interaction feature, with optional median lines and a
//! background histogram on a secondary axis.
use super::figure::Figure;
use super::{
    backend_error, check_limit, draw_colorbar, padded_range, ColorBar, ColorNorm, COLORBAR_WIDTH, DEFAULT_POINT,
    HISTOGRAM_GREY, MISSING_GREY,
};
use crate::constants::{AUTO_INTERACTION, DEFAULT_HISTOGRAM_BINS, DOT_SIZE, HISTOGRAM_ALPHA, SCATTER_ALPHA};
use crate::data::{AttributionMatrix, Column, Dataset, Scalar};
use crate::errors::RenderError;
use crate::interaction::select_interaction;
use crate::median::compute_median_by;
use crate::segment::{assign_colors, segment_labels, SegmentLabel};
use crate::utils::{finite_range, precision_round};
use hashbrown::HashMap;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::HashSet;

/// Line color of the median when no segment is given.
const MEDIAN_LINE: RGBColor = RGBColor(31, 119, 180);
const PLOT: &str = "dependence plot";

/// Which feature, if any, drives the point colors when no segment is given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Interaction {
    #[default]
    None,
    /// Pick the feature with the strongest approximate interaction.
    Auto,
    Column(String),
}

impl Interaction {
    /// Parse a control value: empty or `none` for no interaction, `auto`, or a column name.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Interaction::None,
            Some(v) if v.eq_ignore_ascii_case("none") => Interaction::None,
            Some(v) if v == AUTO_INTERACTION => Interaction::Auto,
            Some(v) => Interaction::Column(v.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencePlot {
    pub feature: String,
    pub interaction: Interaction,
    /// Segment column. Takes precedence over `interaction`.
    pub segment: Option<String>,
    /// Continuous columns, segmented by quartile bins.
    pub numeric_cols: HashSet<String>,
    pub show_median: bool,
    pub xlim: Option<(f64, f64)>,
    pub ylim: Option<(f64, f64)>,
    pub show_histogram: bool,
    pub bins: usize,
    pub target_var: String,
}

impl DependencePlot {
    pub fn new<S: Into<String>>(feature: S) -> Self {
        DependencePlot {
            feature: feature.into(),
            interaction: Interaction::None,
            segment: None,
            numeric_cols: HashSet::new(),
            show_median: false,
            xlim: None,
            ylim: None,
            show_histogram: true,
            bins: DEFAULT_HISTOGRAM_BINS,
            target_var: "target variable".to_string(),
        }
    }

    pub fn interaction(mut self, interaction: Interaction) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn segment<S: Into<String>>(mut self, segment: Option<S>) -> Self {
        self.segment = segment.map(Into::into);
        self
    }

    pub fn numeric_cols(mut self, numeric_cols: HashSet<String>) -> Self {
        self.numeric_cols = numeric_cols;
        self
    }

    pub fn median(mut self, show_median: bool) -> Self {
        self.show_median = show_median;
        self
    }

    pub fn xlim(mut self, xlim: Option<(f64, f64)>) -> Self {
        self.xlim = xlim;
        self
    }

    pub fn ylim(mut self, ylim: Option<(f64, f64)>) -> Self {
        self.ylim = ylim;
        self
    }

    pub fn histogram(mut self, show_histogram: bool) -> Self {
        self.show_histogram = show_histogram;
        self
    }

    pub fn bins(mut self, bins: usize) -> Self {
        self.bins = bins;
        self
    }

    pub fn target<S: Into<String>>(mut self, target_var: S) -> Self {
        self.target_var = target_var.into();
        self
    }

    /// Draw the plot into `figure`.
    ///
    /// Everything is validated before drawing starts. On error the figure is
    /// left blank.
    pub fn render(
        &self,
        figure: &mut Figure,
        dataset: &Dataset,
        attributions: &AttributionMatrix,
    ) -> Result<(), RenderError> {
        let layout = match self.compose(dataset, attributions) {
            Ok(layout) => layout,
            Err(e) => {
                figure.clear();
                return Err(e);
            }
        };
        figure.draw(|root| rasterize(root, &layout))
    }

    pub(crate) fn compose(
        &self,
        dataset: &Dataset,
        attributions: &AttributionMatrix,
    ) -> Result<DependenceLayout, RenderError> {
        check_limit("xlim", self.xlim)?;
        check_limit("ylim", self.ylim)?;
        if self.show_histogram && self.bins == 0 {
            return Err(RenderError::InvalidParameter(
                "bins".to_string(),
                "a positive number of bins".to_string(),
                "0".to_string(),
            ));
        }

        let feature = self.feature.as_str();
        let ys = attributions.column(feature)?;
        let column = dataset.require(feature)?;
        if column.len() != ys.len() {
            return Err(RenderError::RowMismatch(feature.to_string(), column.len(), ys.len()));
        }
        let xs = column.to_numeric();
        if finite_range(&xs).is_none() {
            return Err(RenderError::EmptyColumn(feature.to_string()));
        }
        let categories = categories(column);

        let mut colors = vec![DEFAULT_POINT; xs.len()];
        let mut legend = Vec::new();
        let mut colorbar = None;
        let mut labels: Option<Vec<SegmentLabel>> = None;
        let mut segment_colors = None;

        if let Some(segment) = &self.segment {
            let seg = segment_labels(dataset, segment, &self.numeric_cols)?;
            // Unbinnable rows are drawn grey and get neither a palette slot nor a legend patch.
            let binned: Vec<SegmentLabel> = seg.iter().filter(|l| **l != SegmentLabel::Missing).cloned().collect();
            let assignment = assign_colors(&binned);
            legend = assignment
                .mapping
                .iter()
                .map(|(label, color)| LegendEntry {
                    label: format!("{}: {}", segment, label),
                    color: *color,
                })
                .collect();
            colors = seg
                .iter()
                .map(|l| assignment.color_of(l).unwrap_or(MISSING_GREY))
                .collect();
            labels = Some(seg);
            segment_colors = Some(assignment);
        } else if let Some(name) = self.resolve_interaction(dataset, attributions)? {
            let values = dataset.require(&name)?.to_numeric();
            if values.len() != xs.len() {
                return Err(RenderError::RowMismatch(name, xs.len(), values.len()));
            }
            if let Some(norm) = ColorNorm::from_values(&values) {
                colors = values.iter().map(|v| norm.color(*v)).collect();
                colorbar = Some(ColorBar {
                    label: name,
                    norm,
                    low_text: format_value(norm.low),
                    high_text: format_value(norm.high),
                });
            }
        }

        let mut median_lines = Vec::new();
        if self.show_median {
            let table = compute_median_by(feature, dataset, attributions, labels.as_deref())?;
            let codes = category_codes(categories.as_deref());
            for line in table.lines() {
                let (label, color) = match (&line.segment, &self.segment, &segment_colors) {
                    (Some(seg), Some(col), Some(assignment)) => (
                        format!("Median Contribution for {}=={}", col, seg),
                        assignment.color_of(seg).unwrap_or(MEDIAN_LINE),
                    ),
                    _ => (format!("Median Contribution for {}", feature), MEDIAN_LINE),
                };
                let mut points: Vec<(f64, f64)> = line
                    .points
                    .iter()
                    .filter_map(|(value, m)| scalar_x(value, &codes).map(|x| (x, *m)))
                    .filter(|(x, m)| x.is_finite() && m.is_finite())
                    .collect();
                // Category codes follow first appearance, not the table's text order.
                points.sort_by(|a, b| a.0.total_cmp(&b.0));
                median_lines.push(LineLayer { label, color, points });
            }
        }

        let x_range = match self.xlim {
            Some(lim) => lim,
            None => padded_range(&xs).ok_or_else(|| RenderError::EmptyColumn(feature.to_string()))?,
        };
        let y_range = match self.ylim {
            Some(lim) => lim,
            None => {
                let mut all: Vec<f64> = ys.to_vec();
                all.extend(median_lines.iter().flat_map(|l| l.points.iter().map(|p| p.1)));
                padded_range(&all).unwrap_or((-1.0, 1.0))
            }
        };
        let inside = |x: f64, y: f64| x >= x_range.0 && x <= x_range.1 && y >= y_range.0 && y <= y_range.1;

        let points = xs
            .iter()
            .zip(ys.iter())
            .zip(colors)
            .filter(|((x, y), _)| x.is_finite() && y.is_finite() && inside(**x, **y))
            .map(|((x, y), color)| ScatterPoint { x: *x, y: *y, color })
            .collect();
        for line in median_lines.iter_mut() {
            line.points.retain(|(x, y)| inside(*x, *y));
        }

        let histogram = if self.show_histogram {
            Some(histogram(&xs, self.bins, x_range))
        } else {
            None
        };

        Ok(DependenceLayout {
            title: format!("{} Contribution to {}", feature, self.target_var),
            x_label: format!("Feature: {}", feature),
            y_label: "SHAP value".to_string(),
            x_range,
            y_range,
            x_categories: categories,
            points,
            legend,
            median_lines,
            colorbar,
            histogram,
        })
    }

    fn resolve_interaction(
        &self,
        dataset: &Dataset,
        attributions: &AttributionMatrix,
    ) -> Result<Option<String>, RenderError> {
        let name = match &self.interaction {
            Interaction::None => None,
            Interaction::Auto => select_interaction(&self.feature, dataset, attributions)?,
            Interaction::Column(name) => Some(name.clone()),
        };
        Ok(name.filter(|n| *n != self.feature))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub color: RGBColor,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LegendEntry {
    pub label: String,
    pub color: RGBColor,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LineLayer {
    pub label: String,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HistogramLayer {
    /// `(lower edge, upper edge, count)` per bin, clipped to the x range.
    pub bars: Vec<(f64, f64, usize)>,
    pub y_max: f64,
}

/// Everything the rasterizer needs, decided up front.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DependenceLayout {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    /// Tick labels for a categorical feature, indexed by code.
    pub x_categories: Option<Vec<String>>,
    pub points: Vec<ScatterPoint>,
    /// Segment patches.
    pub legend: Vec<LegendEntry>,
    pub median_lines: Vec<LineLayer>,
    pub colorbar: Option<ColorBar>,
    pub histogram: Option<HistogramLayer>,
}

impl DependenceLayout {
    pub fn has_legend(&self) -> bool {
        !self.legend.is_empty() || !self.median_lines.is_empty() || self.histogram.is_some()
    }
}

/// Distinct values of a categorical column in first-seen order, matching
/// the codes of [`Column::to_numeric`].
fn categories(column: &Column) -> Option<Vec<String>> {
    match column {
        Column::Numeric(_) => None,
        Column::Categorical(values) => {
            let mut seen = HashSet::new();
            Some(values.iter().filter(|v| seen.insert(v.as_str())).cloned().collect())
        }
    }
}

fn category_codes(categories: Option<&[String]>) -> HashMap<String, f64> {
    categories
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, c)| (c.clone(), i as f64))
        .collect()
}

fn scalar_x(value: &Scalar, codes: &HashMap<String, f64>) -> Option<f64> {
    match value {
        Scalar::Number(v) => Some(v.into_inner()),
        Scalar::Text(s) => codes.get(s).copied(),
    }
}

fn format_value(v: f64) -> String {
    format!("{}", precision_round(v, 3))
}

/// Equal width bins over the data range, clipped to `x_range`.
fn histogram(xs: &[f64], bins: usize, x_range: (f64, f64)) -> HistogramLayer {
    let (lo, hi) = finite_range(xs).unwrap_or((0.0, 1.0));
    let (lo, hi) = if lo == hi { (lo - 0.5, hi + 0.5) } else { (lo, hi) };
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for x in xs.iter().filter(|x| x.is_finite()) {
        let i = (((x - lo) / width).floor() as usize).min(bins - 1);
        counts[i] += 1;
    }
    let y_max = counts.iter().copied().max().unwrap_or(0).max(1) as f64 * 1.05;
    let bars = counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + i as f64 * width, lo + (i + 1) as f64 * width, c))
        .filter(|(a, b, _)| *b > x_range.0 && *a < x_range.1)
        .map(|(a, b, c)| (a.max(x_range.0), b.min(x_range.1), c))
        .collect();
    HistogramLayer { bars, y_max }
}

fn rasterize<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, layout: &DependenceLayout) -> Result<(), RenderError> {
    root.fill(&WHITE).map_err(backend_error(PLOT))?;
    let (width, _) = root.dim_in_pixel();
    let bar_width = if layout.colorbar.is_some() { COLORBAR_WIDTH } else { 0 };
    let (chart_area, bar_area) = root.split_horizontally(width.saturating_sub(bar_width) as i32);

    let mut builder = ChartBuilder::on(&chart_area);
    builder
        .caption(&layout.title, ("sans-serif", 30).into_font())
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80);
    if layout.histogram.is_some() {
        builder.right_y_label_area_size(80);
    }
    let (x0, x1) = layout.x_range;
    let (y0, y1) = layout.y_range;
    let hist_max = layout.histogram.as_ref().map_or(1.0, |h| h.y_max);
    let mut chart = builder
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(backend_error(PLOT))?
        .set_secondary_coord(x0..x1, 0.0..hist_max);

    let categories = layout.x_categories.clone().unwrap_or_default();
    let category_label = |x: &f64| {
        let r = x.round();
        if (x - r).abs() < 1e-6 && r >= 0.0 {
            categories.get(r as usize).cloned().unwrap_or_default()
        } else {
            String::new()
        }
    };
    let mut mesh = chart.configure_mesh();
    mesh.x_desc(layout.x_label.as_str())
        .y_desc(layout.y_label.as_str())
        .axis_desc_style(("sans-serif", 20).into_font());
    if layout.x_categories.is_some() {
        mesh.x_label_formatter(&category_label);
    }
    mesh.draw().map_err(backend_error(PLOT))?;

    if let Some(hist) = &layout.histogram {
        let style = HISTOGRAM_GREY.mix(HISTOGRAM_ALPHA).filled();
        chart
            .configure_secondary_axes()
            .y_desc("Histogram Count")
            .draw()
            .map_err(backend_error(PLOT))?;
        chart
            .draw_secondary_series(
                hist.bars
                    .iter()
                    .map(move |(a, b, c)| Rectangle::new([(*a, 0.0), (*b, *c as f64)], style)),
            )
            .map_err(backend_error(PLOT))?
            .label("Histogram Count")
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], style));
    }

    chart
        .draw_series(
            layout
                .points
                .iter()
                .map(|p| Circle::new((p.x, p.y), DOT_SIZE, p.color.mix(SCATTER_ALPHA).filled())),
        )
        .map_err(backend_error(PLOT))?;

    for entry in &layout.legend {
        let color = entry.color;
        chart
            .draw_series(std::iter::empty::<Circle<(f64, f64), u32>>())
            .map_err(backend_error(PLOT))?
            .label(entry.label.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    for line in &layout.median_lines {
        let color = line.color;
        chart
            .draw_series(LineSeries::new(line.points.iter().copied(), color.stroke_width(2)))
            .map_err(backend_error(PLOT))?
            .label(line.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    if layout.has_legend() {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(backend_error(PLOT))?;
    }

    if let Some(bar) = &layout.colorbar {
        draw_colorbar(&bar_area, bar)?;
    }
    Ok(())
}
