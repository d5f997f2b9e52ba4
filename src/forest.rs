use crate::data::Matrix;
use crate::errors::ShapDashError;
use crate::tree::{Tree, TreeParams};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Instant;

/// The model collaborator: anything that can be fit on a feature matrix and
/// then predict a target for it.
pub trait Regressor {
    fn fit(&mut self, data: &Matrix<f64>, y: &[f64]) -> Result<(), ShapDashError>;
    fn predict(&self, data: &Matrix<f64>) -> Result<Vec<f64>, ShapDashError>;
}

/// Hyperparameters of [`RandomForestRegressor`].
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees in the forest.
    pub n_estimators: usize,
    /// Maximum depth of each tree.
    pub max_depth: usize,
    /// Minimum number of samples a node needs before it is considered for splitting.
    pub min_samples_split: usize,
    /// Minimum number of samples in each leaf.
    pub min_samples_leaf: usize,
    /// Fit each tree on a bootstrap sample instead of the full data.
    pub bootstrap: bool,
    /// Integer value used to seed the bootstrap samples.
    pub seed: u64,
    /// Number of threads to use during training, all available when not set.
    pub num_threads: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_estimators: 10,
            max_depth: 6,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 0,
            num_threads: None,
        }
    }
}

/// Bagged ensemble of regression trees; predictions are the mean over trees.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RandomForestRegressor {
    pub params: ForestParams,
    /// Names of the columns the model was fit on, in matrix order.
    pub feature_names: Vec<String>,
    pub trees: Vec<Tree>,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        RandomForestRegressor {
            params: ForestParams::default(),
            feature_names: Vec::new(),
            trees: Vec::new(),
        }
    }
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams) -> Result<Self, ShapDashError> {
        let forest = RandomForestRegressor {
            params,
            feature_names: Vec::new(),
            trees: Vec::new(),
        };
        forest.validate_parameters()?;
        Ok(forest)
    }

    pub fn validate_parameters(&self) -> Result<(), ShapDashError> {
        let checks = [
            ("n_estimators", self.params.n_estimators, 1),
            ("max_depth", self.params.max_depth, 1),
            ("min_samples_split", self.params.min_samples_split, 2),
            ("min_samples_leaf", self.params.min_samples_leaf, 1),
        ];
        for (name, value, min) in checks {
            if value < min {
                return Err(ShapDashError::InvalidParameter(
                    name.to_string(),
                    format!("an integer of at least {}", min),
                    value.to_string(),
                ));
            }
        }
        if self.params.num_threads == Some(0) {
            return Err(ShapDashError::InvalidParameter(
                "num_threads".to_string(),
                "a positive number of threads".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn set_feature_names(mut self, feature_names: Vec<String>) -> Self {
        self.feature_names = feature_names;
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
        }
    }

    fn check_columns(&self, data: &Matrix<f64>) -> Result<(), ShapDashError> {
        if !self.feature_names.is_empty() && data.cols != self.feature_names.len() {
            return Err(ShapDashError::Schema(format!(
                "model was fit on {} features, data has {}",
                self.feature_names.len(),
                data.cols
            )));
        }
        Ok(())
    }

    /// Save the model as JSON.
    pub fn save_model(&self, path: &str) -> Result<(), ShapDashError> {
        let model = self.json_dump()?;
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent).map_err(|e| ShapDashError::UnableToWrite(path.to_string(), e.to_string()))?;
        }
        fs::write(path, model).map_err(|e| ShapDashError::UnableToWrite(path.to_string(), e.to_string()))
    }

    pub fn json_dump(&self) -> Result<String, ShapDashError> {
        serde_json::to_string(self).map_err(|e| ShapDashError::UnableToWrite("json".to_string(), e.to_string()))
    }

    pub fn from_json(json_str: &str) -> Result<Self, ShapDashError> {
        serde_json::from_str::<RandomForestRegressor>(json_str)
            .map_err(|e| ShapDashError::UnableToRead("json".to_string(), e.to_string()))
    }

    pub fn load_model(path: &str) -> Result<Self, ShapDashError> {
        let json_str = fs::read_to_string(path).map_err(|e| ShapDashError::UnableToRead(path.to_string(), e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl Regressor for RandomForestRegressor {
    /// Fit the forest, one bootstrap sample per tree, trees grown in parallel.
    ///
    /// Tree `i` draws its sample from a generator seeded with `seed + i`, so
    /// results do not depend on the number of threads.
    fn fit(&mut self, data: &Matrix<f64>, y: &[f64]) -> Result<(), ShapDashError> {
        self.validate_parameters()?;
        self.check_columns(data)?;
        if data.rows == 0 {
            return Err(ShapDashError::Schema("cannot fit a model on zero rows".to_string()));
        }
        if y.len() != data.rows {
            return Err(ShapDashError::Schema(format!(
                "target has {} rows, features have {}",
                y.len(),
                data.rows
            )));
        }
        if let Some(i) = y.iter().position(|v| !v.is_finite()) {
            return Err(ShapDashError::Schema(format!("target value at row {} is not finite", i)));
        }

        let start = Instant::now();
        let num_threads = match self.params.num_threads {
            Some(num_threads) => num_threads,
            None => rayon::current_num_threads(),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| ShapDashError::InvalidParameter("num_threads".to_string(), "a usable thread count".to_string(), e.to_string()))?;

        let tree_params = self.tree_params();
        let bootstrap = self.params.bootstrap;
        let seed = self.params.seed;
        let rows = data.rows;
        let n_estimators = self.params.n_estimators;
        self.trees = pool.install(|| {
            (0..n_estimators)
                .into_par_iter()
                .map(|i| {
                    let index: Vec<usize> = if bootstrap {
                        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                        (0..rows).map(|_| rng.gen_range(0..rows)).collect()
                    } else {
                        data.index.to_owned()
                    };
                    let mut tree = Tree::new();
                    tree.fit(data, index, y, &tree_params);
                    tree
                })
                .collect()
        });

        info!(
            "Fit {} trees on {} rows and {} features in {:.3}s, mean leaves {:.1}",
            self.trees.len(),
            data.rows,
            data.cols,
            start.elapsed().as_secs_f32(),
            self.trees.iter().map(|t| t.n_leaves as f32).sum::<f32>() / self.trees.len() as f32
        );
        Ok(())
    }

    fn predict(&self, data: &Matrix<f64>) -> Result<Vec<f64>, ShapDashError> {
        if !self.is_fitted() {
            return Err(ShapDashError::NotFitted);
        }
        self.check_columns(data)?;
        let n_trees = self.trees.len() as f64;
        Ok(data
            .index
            .par_iter()
            .map(|i| {
                let row = data.get_row(*i);
                self.trees.iter().map(|t| t.predict_row_from_row_slice(&row)).sum::<f64>() / n_trees
            })
            .collect())
    }
}
