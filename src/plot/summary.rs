//! Summary Plot Renderer
//!
//! Global feature importance: mean absolute attribution per feature as bars,
//! or every attribution as a beeswarm colored by the feature's value.
use super::figure::Figure;
use super::{backend_error, draw_colorbar, padded_range, ColorBar, ColorNorm, COLORBAR_WIDTH, DEFAULT_POINT};
use crate::constants::{DOT_SIZE, MAX_SUMMARY_FEATURES};
use crate::data::{AttributionMatrix, Dataset};
use crate::errors::RenderError;
use crate::utils::items_to_strings;
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

const PLOT: &str = "summary plot";
const ROW_HEIGHT: f64 = 0.4;
const SWARM_BINS: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPlotType {
    Dot,
    #[default]
    Bar,
}

impl FromStr for SummaryPlotType {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dot" => Ok(SummaryPlotType::Dot),
            "bar" => Ok(SummaryPlotType::Bar),
            _ => Err(RenderError::InvalidParameter(
                "plot_type".to_string(),
                items_to_strings(&["dot", "bar"]),
                s.to_string(),
            )),
        }
    }
}

impl Display for SummaryPlotType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SummaryPlotType::Dot => write!(f, "dot"),
            SummaryPlotType::Bar => write!(f, "bar"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryPlot {
    pub plot_type: SummaryPlotType,
    /// Only the most important features are shown.
    pub max_display: usize,
}

impl Default for SummaryPlot {
    fn default() -> Self {
        SummaryPlot {
            plot_type: SummaryPlotType::Bar,
            max_display: MAX_SUMMARY_FEATURES,
        }
    }
}

impl SummaryPlot {
    pub fn new(plot_type: SummaryPlotType) -> Self {
        SummaryPlot {
            plot_type,
            ..Default::default()
        }
    }

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

    pub(crate) fn compose(&self, dataset: &Dataset, attributions: &AttributionMatrix) -> Result<SummaryLayout, RenderError> {
        if attributions.cols() == 0 {
            return Err(RenderError::InvalidParameter(
                "attributions".to_string(),
                "at least one feature".to_string(),
                "none".to_string(),
            ));
        }
        if self.max_display == 0 {
            return Err(RenderError::InvalidParameter(
                "max_display".to_string(),
                "a positive number of features".to_string(),
                "0".to_string(),
            ));
        }
        let importance = attributions.mean_abs();
        let mut order: Vec<usize> = (0..importance.len()).collect();
        order.sort_by(|a, b| importance[*b].total_cmp(&importance[*a]));
        order.truncate(self.max_display);
        let features: Vec<String> = order.iter().map(|i| attributions.feature_names()[*i].clone()).collect();
        let n = features.len();

        match self.plot_type {
            SummaryPlotType::Bar => {
                let bars: Vec<f64> = order.iter().map(|i| importance[*i]).collect();
                let max = bars.iter().copied().fold(0.0, f64::max);
                Ok(SummaryLayout {
                    features,
                    x_label: "mean(|SHAP value|) (average impact on model output magnitude)".to_string(),
                    x_range: (0.0, if max > 0.0 { max * 1.1 } else { 1.0 }),
                    bars,
                    dots: Vec::new(),
                    colorbar: None,
                })
            }
            SummaryPlotType::Dot => {
                let mut dots = Vec::new();
                let mut all = Vec::new();
                for (rank, name) in features.iter().enumerate() {
                    let shap = attributions.column(name)?;
                    let values = dataset.require(name)?.to_numeric();
                    if values.len() != shap.len() {
                        return Err(RenderError::RowMismatch(name.clone(), values.len(), shap.len()));
                    }
                    let norm = ColorNorm::from_values(&values);
                    let row = (n - 1 - rank) as f64;
                    for (i, offset) in swarm_offsets(shap).into_iter().enumerate() {
                        if !shap[i].is_finite() {
                            continue;
                        }
                        let color = norm.map_or(DEFAULT_POINT, |norm| norm.color(values[i]));
                        dots.push(Dot {
                            x: shap[i],
                            y: row + offset,
                            color,
                        });
                    }
                    all.extend_from_slice(shap);
                }
                Ok(SummaryLayout {
                    features,
                    x_label: "SHAP value (impact on model output)".to_string(),
                    x_range: padded_range(&all).unwrap_or((-1.0, 1.0)),
                    bars: Vec::new(),
                    dots,
                    colorbar: Some(ColorBar {
                        label: "Feature value".to_string(),
                        norm: ColorNorm { low: 0.0, high: 1.0 },
                        low_text: "Low".to_string(),
                        high_text: "High".to_string(),
                    }),
                })
            }
        }
    }
}

/// Vertical offsets that stack points sharing a value bin outwards from the
/// row center, alternating above and below.
pub(crate) fn swarm_offsets(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let quant: Vec<f64> = values
        .iter()
        .map(|v| {
            if v.is_finite() {
                (SWARM_BINS * (v - lo) / (hi - lo + 1e-8)).round()
            } else {
                f64::NAN
            }
        })
        .collect();
    let mut order: Vec<usize> = (0..values.len()).filter(|i| !quant[*i].is_nan()).collect();
    order.sort_by(|a, b| quant[*a].total_cmp(&quant[*b]));

    let mut offsets = vec![0.0; values.len()];
    let mut layer = 0usize;
    let mut last_bin = f64::NAN;
    for i in order {
        if quant[i] != last_bin {
            layer = 0;
        }
        let sign = if layer % 2 == 1 { 1.0 } else { -1.0 };
        offsets[i] = (layer as f64 / 2.0).ceil() * sign;
        layer += 1;
        last_bin = quant[i];
    }
    let max = offsets.iter().fold(0.0_f64, |m, o| m.max(*o + 1.0));
    offsets.iter_mut().for_each(|o| *o *= 0.9 * (ROW_HEIGHT / max));
    offsets
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Dot {
    pub x: f64,
    pub y: f64,
    pub color: RGBColor,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SummaryLayout {
    /// Most important first; drawn top to bottom.
    pub features: Vec<String>,
    pub x_label: String,
    pub x_range: (f64, f64),
    /// Mean absolute attribution, aligned with `features`.
    pub bars: Vec<f64>,
    pub dots: Vec<Dot>,
    pub colorbar: Option<ColorBar>,
}

fn rasterize<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, layout: &SummaryLayout) -> Result<(), RenderError> {
    root.fill(&WHITE).map_err(backend_error(PLOT))?;
    let (width, _) = root.dim_in_pixel();
    let bar_width = if layout.colorbar.is_some() { COLORBAR_WIDTH } else { 0 };
    let (chart_area, bar_area) = root.split_horizontally(width.saturating_sub(bar_width) as i32);

    let n = layout.features.len();
    let (x0, x1) = layout.x_range;
    let mut chart = ChartBuilder::on(&chart_area)
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(200)
        .build_cartesian_2d(x0..x1, -0.5..(n as f64 - 0.5))
        .map_err(backend_error(PLOT))?;

    let row_label = |y: &f64| {
        let r = y.round();
        if (y - r).abs() < 1e-6 && r >= 0.0 && (r as usize) < n {
            layout.features[n - 1 - r as usize].clone()
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n.max(2))
        .y_label_formatter(&row_label)
        .x_desc(layout.x_label.as_str())
        .axis_desc_style(("sans-serif", 20).into_font())
        .draw()
        .map_err(backend_error(PLOT))?;

    if !layout.bars.is_empty() {
        chart
            .draw_series(layout.bars.iter().enumerate().map(|(rank, v)| {
                let y = (n - 1 - rank) as f64;
                Rectangle::new([(0.0, y - ROW_HEIGHT), (*v, y + ROW_HEIGHT)], DEFAULT_POINT.filled())
            }))
            .map_err(backend_error(PLOT))?;
    }
    if !layout.dots.is_empty() {
        chart
            .draw_series(
                layout
                    .dots
                    .iter()
                    .map(|d| Circle::new((d.x, d.y), DOT_SIZE, d.color.filled())),
            )
            .map_err(backend_error(PLOT))?;
    }

    if let Some(bar) = &layout.colorbar {
        draw_colorbar(&bar_area, bar)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn sample() -> (Dataset, AttributionMatrix) {
        let ds = Dataset::from_columns(vec![
            ("a", Column::Numeric(vec![1., 2., 3., 4.])),
            ("b", Column::Numeric(vec![4., 3., 2., 1.])),
            ("c", Column::Categorical(vec!["x".into(), "y".into(), "x".into(), "y".into()])),
        ])
        .unwrap();
        let shap = AttributionMatrix::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![
                vec![0.1, -0.1, 0.1, -0.1],
                vec![2.0, -2.0, 1.0, -1.0],
                vec![0.5, 0.5, -0.5, -0.5],
            ],
        )
        .unwrap();
        (ds, shap)
    }

    #[test]
    fn test_plot_type_parse() {
        assert_eq!("dot".parse::<SummaryPlotType>().unwrap(), SummaryPlotType::Dot);
        assert_eq!("bar".parse::<SummaryPlotType>().unwrap(), SummaryPlotType::Bar);
        assert!("violin".parse::<SummaryPlotType>().is_err());
        assert_eq!(SummaryPlotType::default(), SummaryPlotType::Bar);
        assert_eq!(SummaryPlotType::Dot.to_string(), "dot");
    }

    #[test]
    fn test_bar_layout_orders_by_importance() {
        let (ds, shap) = sample();
        let layout = SummaryPlot::new(SummaryPlotType::Bar).compose(&ds, &shap).unwrap();
        assert_eq!(layout.features, vec!["b", "c", "a"]);
        assert_eq!(layout.bars, vec![1.5, 0.5, 0.1]);
        assert!(layout.dots.is_empty());
        assert!(layout.colorbar.is_none());
    }

    #[test]
    fn test_max_display() {
        let (ds, shap) = sample();
        let plot = SummaryPlot {
            plot_type: SummaryPlotType::Bar,
            max_display: 2,
        };
        let layout = plot.compose(&ds, &shap).unwrap();
        assert_eq!(layout.features, vec!["b", "c"]);
    }

    #[test]
    fn test_dot_layout() {
        let (ds, shap) = sample();
        let layout = SummaryPlot::new(SummaryPlotType::Dot).compose(&ds, &shap).unwrap();
        assert_eq!(layout.dots.len(), 12);
        assert!(layout.colorbar.is_some());
        // "b" is the most important feature and sits on the top row.
        let top: Vec<&Dot> = layout.dots.iter().filter(|d| (d.y - 2.0).abs() <= ROW_HEIGHT).collect();
        assert_eq!(top.len(), 4);
        assert!(top.iter().any(|d| d.x == 2.0));
    }

    #[test]
    fn test_dot_layout_requires_feature_values() {
        let (_, shap) = sample();
        let ds = Dataset::from_columns(vec![("a", Column::Numeric(vec![1., 2., 3., 4.]))]).unwrap();
        let res = SummaryPlot::new(SummaryPlotType::Dot).compose(&ds, &shap);
        assert_eq!(res, Err(RenderError::MissingColumn("b".to_string(), "dataset".to_string())));
        assert!(SummaryPlot::new(SummaryPlotType::Bar).compose(&ds, &shap).is_ok());
    }

    #[test]
    fn test_swarm_offsets_stack_ties() {
        let offsets = swarm_offsets(&[1.0, 1.0, 1.0, 5.0]);
        assert_eq!(offsets[3], 0.0);
        assert_eq!(offsets[0], 0.0);
        assert!(offsets[1] > 0.0);
        assert!(offsets[2] < 0.0);
        assert!(offsets.iter().all(|o| o.abs() < ROW_HEIGHT));
    }

    #[test]
    fn test_render_both_plot_types() {
        let (ds, shap) = sample();
        for plot_type in [SummaryPlotType::Dot, SummaryPlotType::Bar] {
            let mut fig = Figure::new(480, 320);
            SummaryPlot::new(plot_type).render(&mut fig, &ds, &shap).unwrap();
            assert!(!fig.is_blank(), "{}", plot_type);
            let png = fig.to_png().unwrap();
            assert_eq!(&png[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        }
    }
}
