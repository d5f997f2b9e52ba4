pub const AUTO_INTERACTION: &str = "auto";
pub const DEFAULT_HISTOGRAM_BINS: usize = 35;
pub const DEFAULT_FIGURE_WIDTH: u32 = 1500;
pub const DEFAULT_FIGURE_HEIGHT: u32 = 1000;
pub const SCATTER_ALPHA: f64 = 0.5;
pub const HISTOGRAM_ALPHA: f64 = 0.3;
pub const DOT_SIZE: u32 = 3;
pub const AXIS_PADDING: f64 = 0.05;
pub const MAX_SEGMENT_CARDINALITY: usize = 5;
pub const MAX_SUMMARY_FEATURES: usize = 20;
