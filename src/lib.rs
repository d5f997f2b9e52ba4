mod node;
mod shapley;

// Modules
pub mod config;
pub mod constants;
pub mod data;
pub mod errors;
pub mod explainer;
pub mod forest;
pub mod interaction;
pub mod median;
pub mod metric;
pub mod pipeline;
pub mod plot;
pub mod segment;
pub mod server;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use config::ProjectConfig;
pub use data::{AttributionMatrix, Column, Dataset, Matrix, Scalar};
pub use errors::{RenderError, ShapDashError};
pub use explainer::TreeExplainer;
pub use forest::{ForestParams, RandomForestRegressor, Regressor};
pub use median::{compute_median, MedianTable};
pub use plot::{DependencePlot, Figure, Interaction, SummaryPlot, SummaryPlotType};
pub use segment::{assign_colors, SegmentLabel};
pub use server::Dashboard;
