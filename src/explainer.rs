//! Tree explainer
//!
//! Exact TreeSHAP attributions for a fitted [`RandomForestRegressor`], averaged
//! over its trees the same way the forest averages its predictions.
use crate::data::{AttributionMatrix, Matrix};
use crate::errors::ShapDashError;
use crate::forest::RandomForestRegressor;
use crate::shapley::predict_contributions_row_shapley;
use rayon::prelude::*;

pub struct TreeExplainer<'a> {
    forest: &'a RandomForestRegressor,
}

impl<'a> TreeExplainer<'a> {
    pub fn new(forest: &'a RandomForestRegressor) -> Result<Self, ShapDashError> {
        if !forest.is_fitted() {
            return Err(ShapDashError::NotFitted);
        }
        Ok(TreeExplainer { forest })
    }

    /// The mean model output over the training data.
    pub fn expected_value(&self) -> f64 {
        let trees = &self.forest.trees;
        trees.iter().map(|t| t.get_average_leaf_weights(0)).sum::<f64>() / trees.len() as f64
    }

    /// Row major contributions, `data.cols + 1` values per row; the last value
    /// of each row is the expected value.
    pub fn predict_contributions(&self, data: &Matrix<f64>) -> Vec<f64> {
        let width = data.cols + 1;
        let n_trees = self.forest.trees.len() as f64;
        let mut contribs = vec![0.0; data.rows * width];
        data.index
            .par_iter()
            .zip(contribs.par_chunks_mut(width))
            .for_each(|(row, c)| {
                let r = data.get_row(*row);
                for tree in &self.forest.trees {
                    predict_contributions_row_shapley(tree, &r, c);
                }
                c.iter_mut().for_each(|v| *v /= n_trees);
            });
        contribs
    }

    /// Attribution matrix for `data`, one column per feature name.
    pub fn shap_values(&self, data: &Matrix<f64>, feature_names: &[String]) -> Result<AttributionMatrix, ShapDashError> {
        if feature_names.len() != data.cols {
            return Err(ShapDashError::Schema(format!(
                "{} feature names for {} columns",
                feature_names.len(),
                data.cols
            )));
        }
        if self.forest.n_features() > 0 && self.forest.n_features() != data.cols {
            return Err(ShapDashError::Schema(format!(
                "model was fit on {} features, data has {}",
                self.forest.n_features(),
                data.cols
            )));
        }
        let width = data.cols + 1;
        let contribs = self.predict_contributions(data);
        let values: Vec<f64> = contribs
            .chunks(width)
            .flat_map(|c| c[..data.cols].iter().copied())
            .collect();
        Ok(AttributionMatrix::from_row_major(feature_names.to_vec(), &values, data.rows)?
            .with_expected_value(self.expected_value()))
    }
}
