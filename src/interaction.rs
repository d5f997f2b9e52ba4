//! Interaction Selector
//!
//! Approximate interaction strength between a feature's attributions and the
//! values of every other model feature. Rows are ordered by the feature and
//! cut into small chunks; within each chunk the absolute correlation between
//! the attributions and the candidate's values is summed.
use crate::data::{AttributionMatrix, Dataset};
use crate::errors::RenderError;
use crate::utils::{nan_last, pearson};
use rayon::prelude::*;

/// Chunk size used to cut the rows ordered by the feature.
pub fn chunk_size(rows: usize) -> usize {
    (rows / 10).clamp(1, 50)
}

fn has_variance(v: &[f64]) -> bool {
    v.len() > 1 && v.iter().any(|x| *x != v[0])
}

fn chunked_correlation(shap_ref: &[f64], other: &[f64], inc: usize) -> f64 {
    if other.iter().map(|v| v.abs()).sum::<f64>() < 1e-8 {
        return 0.0;
    }
    shap_ref
        .chunks(inc)
        .zip(other.chunks(inc))
        .filter(|(s, o)| has_variance(s) && has_variance(o))
        .map(|(s, o)| pearson(s, o).abs())
        .filter(|c| c.is_finite())
        .sum()
}

/// Interaction score of every candidate with `feature`, in candidate order.
///
/// Candidates are the features of the attribution matrix. The feature
/// itself always scores zero. A candidate scores the larger of its value
/// correlation and its missing-value indicator correlation.
pub fn approximate_interactions(
    feature: &str,
    dataset: &Dataset,
    attributions: &AttributionMatrix,
) -> Result<Vec<(String, f64)>, RenderError> {
    let x = dataset.require(feature)?.to_numeric();
    let shap = attributions.column(feature)?;
    if x.len() != shap.len() {
        return Err(RenderError::RowMismatch(feature.to_string(), x.len(), shap.len()));
    }
    let mut order: Vec<usize> = (0..x.len()).collect();
    order.sort_by(|a, b| nan_last(&x[*a], &x[*b]));
    let shap_ref: Vec<f64> = order.iter().map(|i| shap[*i]).collect();
    let inc = chunk_size(x.len());

    let candidates = attributions.feature_names();
    let mut columns = Vec::with_capacity(candidates.len());
    for name in candidates {
        columns.push(dataset.require(name)?.to_numeric());
    }

    Ok(candidates
        .par_iter()
        .zip(columns.par_iter())
        .map(|(name, values)| {
            if name == feature {
                return (name.clone(), 0.0);
            }
            let sorted: Vec<f64> = order.iter().map(|i| values[*i]).collect();
            let value_score = chunked_correlation(&shap_ref, &sorted, inc);
            let missing: Vec<f64> = sorted.iter().map(|v| if v.is_nan() { 1.0 } else { 0.0 }).collect();
            let missing_score = chunked_correlation(&shap_ref, &missing, inc);
            (name.clone(), value_score.max(missing_score))
        })
        .collect())
}

/// The candidate with the strongest approximate interaction, ties going to
/// the earliest. `None` when there is no candidate besides the feature.
pub fn select_interaction(
    feature: &str,
    dataset: &Dataset,
    attributions: &AttributionMatrix,
) -> Result<Option<String>, RenderError> {
    let scores = approximate_interactions(feature, dataset, attributions)?;
    let mut best: Option<(String, f64)> = None;
    for (name, score) in scores {
        if name == feature {
            continue;
        }
        match &best {
            Some((_, s)) if *s >= score => {}
            _ => best = Some((name, score)),
        }
    }
    Ok(best.map(|(name, _)| name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn interacting() -> (Dataset, AttributionMatrix) {
        // The attribution of `a` flips sign with `b`; `c` is unrelated noise.
        let rows = 200;
        let a: Vec<f64> = (0..rows).map(|i| (i / 4) as f64).collect();
        let b: Vec<f64> = (0..rows).map(|i| (i % 2) as f64).collect();
        let c: Vec<f64> = (0..rows).map(|i| ((i * 7) % 3) as f64).collect();
        let shap_a: Vec<f64> = a.iter().zip(&b).map(|(x, s)| if *s > 0.5 { *x } else { -*x }).collect();
        let ds = Dataset::from_columns(vec![
            ("a", Column::Numeric(a)),
            ("b", Column::Numeric(b)),
            ("c", Column::Numeric(c)),
        ])
        .unwrap();
        let shap = AttributionMatrix::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![shap_a, vec![0.0; rows], vec![0.0; rows]],
        )
        .unwrap();
        (ds, shap)
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(0), 1);
        assert_eq!(chunk_size(9), 1);
        assert_eq!(chunk_size(200), 20);
        assert_eq!(chunk_size(10_000), 50);
    }

    #[test]
    fn test_select_strongest_interaction() {
        let (ds, shap) = interacting();
        let scores = approximate_interactions("a", &ds, &shap).unwrap();
        assert_eq!(scores[0], ("a".to_string(), 0.0));
        assert!(scores[1].1 > scores[2].1);
        assert_eq!(select_interaction("a", &ds, &shap).unwrap(), Some("b".to_string()));
    }

    #[test]
    fn test_select_without_candidates() {
        let ds = Dataset::from_columns(vec![("a", Column::Numeric(vec![1., 2., 3.]))]).unwrap();
        let shap = AttributionMatrix::new(vec!["a".to_string()], vec![vec![0.1, 0.2, 0.3]]).unwrap();
        assert_eq!(select_interaction("a", &ds, &shap).unwrap(), None);
    }

    #[test]
    fn test_missing_feature() {
        let (ds, shap) = interacting();
        assert!(matches!(
            select_interaction("zz", &ds, &shap),
            Err(RenderError::MissingColumn(_, _))
        ));
    }
}
