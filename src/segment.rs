//! Segment Colorizer
//!
//! Turns a column into discrete segment labels and maps those labels onto a
//! fixed qualitative palette.
use crate::data::{Column, Dataset, Scalar};
use crate::errors::RenderError;
use crate::utils::{quantile_sorted, sorted_finite};
use hashbrown::HashMap;
use log::warn;
use ordered_float::OrderedFloat;
use plotters::style::RGBColor;
use std::collections::HashSet;
use std::fmt::{self, Display};
use std::hash::Hash;

/// The `Set1` qualitative palette.
pub const PALETTE: [RGBColor; 9] = [
    RGBColor(228, 26, 28),   // Red
    RGBColor(55, 126, 184),  // Blue
    RGBColor(77, 175, 74),   // Green
    RGBColor(152, 78, 163),  // Purple
    RGBColor(255, 127, 0),   // Orange
    RGBColor(255, 255, 51),  // Yellow
    RGBColor(166, 86, 40),   // Brown
    RGBColor(247, 129, 191), // Pink
    RGBColor(153, 153, 153), // Grey
];

const QUARTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// The discrete label a row falls under when segmenting by a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentLabel {
    /// The raw value of a categorical column.
    Value(Scalar),
    /// Quartile bin of a continuous column. Bin 0 is closed on both ends,
    /// the others are open on the left.
    Quartile {
        index: usize,
        lower: OrderedFloat<f64>,
        upper: OrderedFloat<f64>,
    },
    /// A continuous value that could not be binned (NaN).
    Missing,
}

impl Display for SegmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SegmentLabel::Value(v) => write!(f, "{}", v),
            SegmentLabel::Quartile { index: 0, lower, upper } => write!(f, "[{}, {}]", lower, upper),
            SegmentLabel::Quartile { lower, upper, .. } => write!(f, "({}, {}]", lower, upper),
            SegmentLabel::Missing => write!(f, "NaN"),
        }
    }
}

/// Segment labels for every row of `dataset[col]`.
///
/// Columns listed in `numeric_cols` are binned into quartiles, every other
/// column is segmented by its raw values.
pub fn segment_labels(
    dataset: &Dataset,
    col: &str,
    numeric_cols: &HashSet<String>,
) -> Result<Vec<SegmentLabel>, RenderError> {
    let column = dataset.require(col)?;
    if numeric_cols.contains(col) {
        match column {
            Column::Numeric(values) => Ok(quartile_bins(values)),
            Column::Categorical(_) => Err(RenderError::InvalidParameter(
                "segment".to_string(),
                format!("numeric values in continuous column {}", col),
                "text".to_string(),
            )),
        }
    } else {
        Ok(column.scalars().into_iter().map(SegmentLabel::Value).collect())
    }
}

/// Bin edges at the quartiles of the finite values, duplicate edges dropped.
pub fn quartile_edges(values: &[f64]) -> Vec<f64> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return Vec::new();
    }
    let mut edges: Vec<f64> = QUARTILES.iter().map(|q| quantile_sorted(&sorted, *q)).collect();
    edges.dedup();
    edges
}

/// Assign each value to its quartile bin.
///
/// At most four bins are produced. When every finite value is identical a
/// single bin covers them all.
pub fn quartile_bins(values: &[f64]) -> Vec<SegmentLabel> {
    let edges = quartile_edges(values);
    values
        .iter()
        .map(|v| {
            if !v.is_finite() || edges.is_empty() {
                return SegmentLabel::Missing;
            }
            if edges.len() == 1 {
                return SegmentLabel::Quartile {
                    index: 0,
                    lower: OrderedFloat(edges[0]),
                    upper: OrderedFloat(edges[0]),
                };
            }
            let last = edges.len() - 2;
            let index = edges[1..].iter().position(|upper| v <= upper).unwrap_or(last);
            SegmentLabel::Quartile {
                index,
                lower: OrderedFloat(edges[index]),
                upper: OrderedFloat(edges[index + 1]),
            }
        })
        .collect()
}

/// Per-row colors plus the label to color mapping, in first-seen label order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAssignment<T> {
    pub per_row: Vec<RGBColor>,
    pub mapping: Vec<(T, RGBColor)>,
}

impl<T: PartialEq> ColorAssignment<T> {
    pub fn color_of(&self, label: &T) -> Option<RGBColor> {
        self.mapping.iter().find(|(l, _)| l == label).map(|(_, c)| *c)
    }
}

/// Color each distinct label with the next palette entry, in order of first
/// appearance, and give every row its label's color.
///
/// Labels past the ninth reuse the palette from the start.
pub fn assign_colors<T: Eq + Hash + Clone>(labels: &[T]) -> ColorAssignment<T> {
    let mut index: HashMap<&T, usize> = HashMap::new();
    let mut mapping = Vec::new();
    let per_row = labels
        .iter()
        .map(|label| {
            let next = index.len();
            let i = *index.entry(label).or_insert_with(|| {
                let color = PALETTE[next % PALETTE.len()];
                mapping.push((label.clone(), color));
                next
            });
            PALETTE[i % PALETTE.len()]
        })
        .collect();
    if mapping.len() > PALETTE.len() {
        warn!(
            "{} segments exceed the {} palette colors, colors will repeat",
            mapping.len(),
            PALETTE.len()
        );
    }
    ColorAssignment { per_row, mapping }
}
