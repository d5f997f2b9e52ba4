//! Pipeline
//!
//! The batch workflow that feeds the dashboard: fit the model on the training
//! table, report its accuracy on the test table, and persist the model and
//! the attribution matrix of the training table.
use crate::config::ProjectConfig;
use crate::data::{AttributionMatrix, Column, Dataset, Matrix};
use crate::errors::ShapDashError;
use crate::explainer::TreeExplainer;
use crate::forest::{ForestParams, RandomForestRegressor, Regressor};
use crate::metric::{r2_score, root_mean_squared_error, rounded_accuracy};
use crate::utils::fmt_vec_output;
use log::info;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

/// Everything a run produces.
#[derive(Debug)]
pub struct PipelineOutput {
    pub model: RandomForestRegressor,
    pub predictions: Vec<f64>,
    pub accuracy: f64,
    pub shap_values: AttributionMatrix,
}

/// The first column of a target table.
pub fn load_target<P: AsRef<Path>>(path: P) -> Result<Vec<f64>, ShapDashError> {
    let path = path.as_ref();
    let ds = Dataset::from_csv_path(path)?;
    let Some((name, column)) = ds.iter().next() else {
        return Err(ShapDashError::Schema(format!("{} has no columns", path.display())));
    };
    match column {
        Column::Numeric(v) => Ok(v.clone()),
        Column::Categorical(_) => Err(ShapDashError::Schema(format!(
            "target column {} in {} is not numeric",
            name,
            path.display()
        ))),
    }
}

/// Model features: every column that is not a context column, in table order.
pub fn feature_columns(data: &Dataset, context_cols: &HashSet<String>) -> Vec<String> {
    data.column_names()
        .iter()
        .filter(|c| !context_cols.contains(*c))
        .cloned()
        .collect()
}

/// Fit a forest on every column of `train_x`.
pub fn train_model(train_x: &Dataset, train_y: &[f64], params: &ForestParams) -> Result<RandomForestRegressor, ShapDashError> {
    let data = train_x.to_column_major()?;
    let matrix = Matrix::new(&data, train_x.rows(), train_x.n_cols());
    let mut model = RandomForestRegressor::new(params.clone())?.set_feature_names(train_x.column_names().to_vec());
    model.fit(&matrix, train_y)?;
    Ok(model)
}

/// Predict `test_x`, using the columns the model was fit on. Extra columns are ignored.
pub fn predict(model: &RandomForestRegressor, test_x: &Dataset) -> Result<Vec<f64>, ShapDashError> {
    let features = test_x.select(&model.feature_names)?;
    let data = features.to_column_major()?;
    let matrix = Matrix::new(&data, features.rows(), features.n_cols());
    model.predict(&matrix)
}

/// Log how well the rounded predictions match the target, returning the accuracy.
pub fn report_accuracy(predictions: &[f64], test_y: &[f64]) -> Result<f64, ShapDashError> {
    if predictions.len() != test_y.len() {
        return Err(ShapDashError::Schema(format!(
            "{} predictions for {} targets",
            predictions.len(),
            test_y.len()
        )));
    }
    let accuracy = rounded_accuracy(test_y, predictions);
    info!("Model accuracy on test set: {:.2}%", accuracy * 100.0);
    info!(
        "Test set rmse {:.4}, r2 {:.4}",
        root_mean_squared_error(test_y, predictions),
        r2_score(test_y, predictions)
    );
    Ok(accuracy)
}

/// Attribution matrix of `train_x` with the context columns dropped.
pub fn calculate_shap(
    model: &RandomForestRegressor,
    train_x: &Dataset,
    context_cols: &HashSet<String>,
) -> Result<AttributionMatrix, ShapDashError> {
    let features = train_x.without(context_cols);
    let data = features.to_column_major()?;
    let matrix = Matrix::new(&data, features.rows(), features.n_cols());
    TreeExplainer::new(model)?.shap_values(&matrix, features.column_names())
}

pub fn run(config: &ProjectConfig) -> Result<PipelineOutput, ShapDashError> {
    let start = Instant::now();
    let paths = &config.paths;
    let train_x = Dataset::from_csv_path(&paths.train_x)?;
    let train_y = load_target(&paths.train_y)?;
    let test_x = Dataset::from_csv_path(&paths.test_x)?;
    let test_y = load_target(&paths.test_y)?;
    info!(
        "Loaded {} training and {} test rows with {} columns",
        train_x.rows(),
        test_x.rows(),
        train_x.n_cols()
    );

    let features = train_x.without(&config.context_cols);
    let model = train_model(&features, &train_y, &config.model)?;
    model.save_model(&paths.model.to_string_lossy())?;
    info!("Saved model to {}", paths.model.display());

    let predictions = predict(&model, &test_x)?;
    let accuracy = report_accuracy(&predictions, &test_y)?;

    let shap_values = calculate_shap(&model, &train_x, &config.context_cols)?;
    shap_values.to_csv_path(&paths.shap_values)?;
    info!(
        "Mean absolute attribution of {}: {}",
        shap_values.feature_names().join(", "),
        fmt_vec_output(&shap_values.mean_abs())
    );
    info!(
        "Saved {}x{} attributions to {} in {:.3}s",
        shap_values.rows(),
        shap_values.cols(),
        paths.shap_values.display(),
        start.elapsed().as_secs_f32()
    );

    Ok(PipelineOutput {
        model,
        predictions,
        accuracy,
        shap_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_config(out: &Path) -> ProjectConfig {
        let mut config = ProjectConfig::default();
        config.context_cols = ["region".to_string()].into_iter().collect();
        config.paths.train_x = PathBuf::from("resources/train_x.csv");
        config.paths.train_y = PathBuf::from("resources/train_y.csv");
        config.paths.test_x = PathBuf::from("resources/test_x.csv");
        config.paths.test_y = PathBuf::from("resources/test_y.csv");
        config.paths.model = out.join("06_models").join("model.json");
        config.paths.shap_values = out.join("08_reporting").join("shap_values.csv");
        config
    }

    #[test]
    fn test_load_target() {
        let y = load_target("resources/train_y.csv").unwrap();
        assert_eq!(y.len(), 80);

        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("labels.csv");
        std::fs::write(&text, "label\nlow\nhigh\n").unwrap();
        assert!(matches!(load_target(&text), Err(ShapDashError::Schema(_))));
        assert!(load_target(dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_feature_columns_drop_context() {
        let ds = Dataset::from_csv_path("resources/train_x.csv").unwrap();
        let context: HashSet<String> = ["region".to_string()].into_iter().collect();
        assert_eq!(feature_columns(&ds, &context), vec!["age", "income", "has_pet"]);
        assert_eq!(feature_columns(&ds, &HashSet::new()).len(), 4);
    }

    #[test]
    fn test_categorical_features_are_rejected() {
        let ds = Dataset::from_csv_path("resources/train_x.csv").unwrap();
        let y = load_target("resources/train_y.csv").unwrap();
        assert!(matches!(
            train_model(&ds, &y, &ForestParams::default()),
            Err(ShapDashError::Schema(_))
        ));
    }

    #[test]
    fn test_run_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path());
        let out = run(&config).unwrap();

        assert_eq!(out.model.feature_names, vec!["age", "income", "has_pet"]);
        assert_eq!(out.predictions.len(), 30);
        assert!((0.0..=1.0).contains(&out.accuracy));
        assert_eq!(out.shap_values.rows(), 80);
        assert_eq!(out.shap_values.feature_names(), out.model.feature_names.as_slice());

        let loaded = RandomForestRegressor::load_model(&config.paths.model.to_string_lossy()).unwrap();
        assert_eq!(loaded, out.model);
        let shap = AttributionMatrix::from_csv_path(&config.paths.shap_values).unwrap();
        assert_eq!(shap.rows(), 80);
        assert_eq!(shap.feature_names(), out.shap_values.feature_names());
    }

    #[test]
    fn test_attributions_explain_training_predictions() {
        let train_x = Dataset::from_csv_path("resources/train_x.csv").unwrap();
        let train_y = load_target("resources/train_y.csv").unwrap();
        let context: HashSet<String> = ["region".to_string()].into_iter().collect();
        let features = train_x.select(&feature_columns(&train_x, &context)).unwrap();
        let params = ForestParams {
            n_estimators: 3,
            ..ForestParams::default()
        };
        let model = train_model(&features, &train_y, &params).unwrap();
        let preds = predict(&model, &train_x).unwrap();
        let shap = calculate_shap(&model, &train_x, &context).unwrap();
        let base = shap.expected_value().unwrap();
        for (r, pred) in preds.iter().enumerate() {
            let total: f64 = shap.row(r).iter().sum::<f64>() + base;
            assert!((total - pred).abs() < 1e-8);
        }
    }

    #[test]
    fn test_report_accuracy() {
        let acc = report_accuracy(&[1.2, 2.6, 3.0], &[1., 2., 3.]).unwrap();
        assert!((acc - 2.0 / 3.0).abs() < 1e-12);
        assert!(report_accuracy(&[1.0], &[1., 2.]).is_err());
    }
}
