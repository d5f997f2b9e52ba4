//! Median Aggregator
//!
//! Median attribution per distinct feature value, optionally split by segment.
use crate::data::{AttributionMatrix, Dataset, Scalar};
use crate::errors::RenderError;
use crate::segment::{segment_labels, SegmentLabel};
use crate::utils::median;
use hashbrown::HashMap;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct MedianRow {
    pub feature_value: Scalar,
    pub segment: Option<SegmentLabel>,
    pub median: f64,
}

/// One row per distinct (feature value, segment) key, sorted by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MedianTable {
    pub rows: Vec<MedianRow>,
}

/// The points of one median line.
#[derive(Debug, Clone, PartialEq)]
pub struct MedianLine {
    pub segment: Option<SegmentLabel>,
    pub points: Vec<(Scalar, f64)>,
}

impl MedianTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Split the table into one line per segment, segments in order of first
    /// appearance in the table. Without segments there is a single line.
    pub fn lines(&self) -> Vec<MedianLine> {
        let mut lines: Vec<MedianLine> = Vec::new();
        for row in &self.rows {
            match lines.iter_mut().find(|l| l.segment == row.segment) {
                Some(line) => line.points.push((row.feature_value.clone(), row.median)),
                None => lines.push(MedianLine {
                    segment: row.segment.clone(),
                    points: vec![(row.feature_value.clone(), row.median)],
                }),
            }
        }
        lines
    }
}

/// Median attribution of `feature` for each distinct value of
/// `dataset[feature]`, and of `segment` when given.
///
/// A segment listed in `numeric_cols` is grouped by its quartile bin.
pub fn compute_median(
    feature: &str,
    dataset: &Dataset,
    attributions: &AttributionMatrix,
    segment: Option<&str>,
    numeric_cols: &HashSet<String>,
) -> Result<MedianTable, RenderError> {
    let labels = match segment {
        Some(col) => Some(segment_labels(dataset, col, numeric_cols)?),
        None => None,
    };
    compute_median_by(feature, dataset, attributions, labels.as_deref())
}

/// Like [`compute_median`], with the segment already resolved to one label per row.
///
/// Rows with a NaN feature value or an unbinnable segment are left out, and
/// NaN attributions are ignored within a group.
pub fn compute_median_by(
    feature: &str,
    dataset: &Dataset,
    attributions: &AttributionMatrix,
    segment: Option<&[SegmentLabel]>,
) -> Result<MedianTable, RenderError> {
    let column = dataset.require(feature)?;
    let values = attributions.column(feature)?;
    if values.len() != column.len() {
        return Err(RenderError::RowMismatch(feature.to_string(), column.len(), values.len()));
    }
    if let Some(labels) = segment {
        if labels.len() != column.len() {
            return Err(RenderError::InvalidParameter(
                "segment".to_string(),
                format!("{} segment labels", column.len()),
                labels.len().to_string(),
            ));
        }
    }

    let mut groups: HashMap<(Scalar, Option<SegmentLabel>), Vec<f64>> = HashMap::new();
    for (i, value) in values.iter().enumerate() {
        let key = column.scalar(i);
        if key.as_f64().is_some_and(f64::is_nan) {
            continue;
        }
        let label = segment.map(|labels| labels[i].clone());
        if label == Some(SegmentLabel::Missing) {
            continue;
        }
        let group = groups.entry((key, label)).or_default();
        if !value.is_nan() {
            group.push(*value);
        }
    }

    let mut rows: Vec<MedianRow> = groups
        .into_iter()
        .map(|((feature_value, segment), group)| MedianRow {
            feature_value,
            segment,
            median: median(&group),
        })
        .collect();
    rows.sort_by(|a, b| (&a.feature_value, &a.segment).cmp(&(&b.feature_value, &b.segment)));
    Ok(MedianTable { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn scenario() -> (Dataset, AttributionMatrix) {
        let ds = Dataset::from_columns(vec![
            ("x", Column::Numeric(vec![1., 1., 2.])),
            ("y", Column::Categorical(vec!["A".into(), "A".into(), "B".into()])),
        ])
        .unwrap();
        let shap = AttributionMatrix::new(vec!["x".to_string()], vec![vec![0.2, 0.4, -0.1]]).unwrap();
        (ds, shap)
    }

    #[test]
    fn test_median_by_segment() {
        let (ds, shap) = scenario();
        let table = compute_median("x", &ds, &shap, Some("y"), &HashSet::new()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].feature_value, Scalar::from(1.0));
        assert_eq!(table.rows[0].segment, Some(SegmentLabel::Value(Scalar::from("A"))));
        assert!((table.rows[0].median - 0.3).abs() < 1e-12);
        assert_eq!(table.rows[1].feature_value, Scalar::from(2.0));
        assert_eq!(table.rows[1].segment, Some(SegmentLabel::Value(Scalar::from("B"))));
        assert_eq!(table.rows[1].median, -0.1);
    }

    #[test]
    fn test_one_row_per_key() {
        let ds = Dataset::from_columns(vec![
            ("x", Column::Numeric(vec![3., 1., 3., 2., 1., 3.])),
            ("s", Column::Numeric(vec![0., 1., 0., 1., 0., 1.])),
        ])
        .unwrap();
        let shap = AttributionMatrix::new(vec!["x".to_string()], vec![vec![1., 2., 3., 4., 5., 6.]]).unwrap();

        let table = compute_median("x", &ds, &shap, None, &HashSet::new()).unwrap();
        let keys: Vec<f64> = table.rows.iter().filter_map(|r| r.feature_value.as_f64()).collect();
        assert_eq!(keys, vec![1., 2., 3.]);
        let medians: Vec<f64> = table.rows.iter().map(|r| r.median).collect();
        assert_eq!(medians, vec![3.5, 4., 3.]);

        let table = compute_median("x", &ds, &shap, Some("s"), &HashSet::new()).unwrap();
        let keys: HashSet<_> = table.rows.iter().map(|r| (r.feature_value.clone(), r.segment.clone())).collect();
        assert_eq!(keys.len(), table.len());
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_median_is_idempotent() {
        let (ds, shap) = scenario();
        let a = compute_median("x", &ds, &shap, Some("y"), &HashSet::new()).unwrap();
        let b = compute_median("x", &ds, &shap, Some("y"), &HashSet::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_median_empty_dataset() {
        let ds = Dataset::from_columns(vec![("x", Column::Numeric(vec![]))]).unwrap();
        let shap = AttributionMatrix::new(vec!["x".to_string()], vec![vec![]]).unwrap();
        let table = compute_median("x", &ds, &shap, None, &HashSet::new()).unwrap();
        assert!(table.is_empty());
        assert!(table.lines().is_empty());
    }

    #[test]
    fn test_median_errors() {
        let (ds, shap) = scenario();
        assert_eq!(
            compute_median("y", &ds, &shap, None, &HashSet::new()),
            Err(RenderError::MissingColumn("y".to_string(), "attribution matrix".to_string()))
        );
        assert_eq!(
            compute_median("x", &ds, &shap, Some("z"), &HashSet::new()),
            Err(RenderError::MissingColumn("z".to_string(), "dataset".to_string()))
        );
        let short = AttributionMatrix::new(vec!["x".to_string()], vec![vec![0.1, 0.2]]).unwrap();
        assert_eq!(
            compute_median("x", &ds, &short, None, &HashSet::new()),
            Err(RenderError::RowMismatch("x".to_string(), 3, 2))
        );
    }

    #[test]
    fn test_lines_split_by_segment() {
        let (ds, shap) = scenario();
        let table = compute_median("x", &ds, &shap, Some("y"), &HashSet::new()).unwrap();
        let lines = table.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].segment, Some(SegmentLabel::Value(Scalar::from("A"))));
        assert_eq!(lines[0].points.len(), 1);

        let table = compute_median("x", &ds, &shap, None, &HashSet::new()).unwrap();
        let lines = table.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].segment, None);
        assert_eq!(lines[0].points.len(), 2);
    }
}
