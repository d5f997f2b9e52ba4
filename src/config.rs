//! Configuration
//!
//! Project parameters are layered with `figment`: built-in defaults, then an
//! optional TOML file, then `SHAPDASH_` environment variables
//! (`SHAPDASH_DASHBOARD__PORT=9000` sets `dashboard.port`).
use crate::constants::{DEFAULT_FIGURE_HEIGHT, DEFAULT_FIGURE_WIDTH, DEFAULT_HISTOGRAM_BINS, MAX_SEGMENT_CARDINALITY};
use crate::errors::ShapDashError;
use crate::forest::ForestParams;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "conf/parameters.toml";
pub const ENV_PREFIX: &str = "SHAPDASH_";

/// Locations of the pipeline's inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub train_x: PathBuf,
    pub train_y: PathBuf,
    pub test_x: PathBuf,
    pub test_y: PathBuf,
    pub model: PathBuf,
    pub shap_values: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            train_x: PathBuf::from("data/05_model_input/train_x.csv"),
            train_y: PathBuf::from("data/05_model_input/train_y.csv"),
            test_x: PathBuf::from("data/05_model_input/test_x.csv"),
            test_y: PathBuf::from("data/05_model_input/test_y.csv"),
            model: PathBuf::from("data/06_models/model.json"),
            shap_values: PathBuf::from("data/08_reporting/shap_values.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
    /// Columns with at most this many distinct values are offered as segments.
    pub max_segment_cardinality: usize,
    pub figure_width: u32,
    pub figure_height: u32,
    pub histogram_bins: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            host: "127.0.0.1".to_string(),
            port: 8050,
            max_segment_cardinality: MAX_SEGMENT_CARDINALITY,
            figure_width: DEFAULT_FIGURE_WIDTH,
            figure_height: DEFAULT_FIGURE_HEIGHT,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }
}

/// Everything the pipeline and the dashboard are parameterized by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Columns kept for segmentation but never used as model features.
    pub context_cols: HashSet<String>,
    /// Continuous columns, segmented by quartile bins instead of raw values.
    pub numeric_cols: HashSet<String>,
    /// Name of the target, used in plot titles.
    pub target_var: String,
    pub paths: PathsConfig,
    pub model: ForestParams,
    pub dashboard: DashboardConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            context_cols: HashSet::new(),
            numeric_cols: HashSet::new(),
            target_var: "target".to_string(),
            paths: PathsConfig::default(),
            model: ForestParams::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// The layered sources, lowest priority first.
    ///
    /// With no explicit path, `conf/parameters.toml` is read if it exists. An
    /// explicit path that does not exist is an error at [`ProjectConfig::load`].
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(ProjectConfig::default()));
        match path {
            Some(p) => figment = figment.merge(Toml::file_exact(p)),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    figment = figment.merge(Toml::file(default));
                }
            }
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ShapDashError> {
        let config: ProjectConfig = figment.extract().map_err(|e| ShapDashError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ShapDashError> {
        Self::from_figment(Self::figment(path))
    }

    pub fn validate(&self) -> Result<(), ShapDashError> {
        if self.dashboard.histogram_bins == 0 {
            return Err(ShapDashError::InvalidParameter(
                "dashboard.histogram_bins".to_string(),
                "a positive number of bins".to_string(),
                "0".to_string(),
            ));
        }
        if self.dashboard.figure_width == 0 || self.dashboard.figure_height == 0 {
            return Err(ShapDashError::InvalidParameter(
                "dashboard.figure_width/figure_height".to_string(),
                "a non-empty figure".to_string(),
                format!("{}x{}", self.dashboard.figure_width, self.dashboard.figure_height),
            ));
        }
        if self.target_var.is_empty() {
            return Err(ShapDashError::Config("target_var must not be empty".to_string()));
        }
        Ok(())
    }
}
