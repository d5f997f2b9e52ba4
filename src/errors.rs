//! Errors
//!
//! Custom error types used throughout the `shapdash` crate.
use thiserror::Error;

/// Errors raised while composing or rasterizing a plot.
///
/// Every variant names the column or parameter that caused it, so the
/// dashboard can report it next to the control that produced it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    /// A column was requested that does not exist in the named table.
    #[error("Column {0} was not found in the {1}.")]
    MissingColumn(String, String),
    /// The dataset and attribution matrix disagree on the number of rows.
    #[error("Column {0} has {1} rows in the dataset but {2} rows in the attribution matrix.")]
    RowMismatch(String, usize, usize),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// A column has no finite values to plot.
    #[error("Column {0} has no finite values to plot.")]
    EmptyColumn(String),
    /// Drawing or encoding failed inside the plotting backend.
    #[error("Unable to draw {0}: {1}")]
    Backend(String, String),
}

/// Errors that can occur outside of rendering: loading data, training, configuration.
#[derive(Debug, Error)]
pub enum ShapDashError {
    /// Unable to read a file.
    #[error("Unable to read from file {0}: {1}")]
    UnableToRead(String, String),
    /// Unable to write a file.
    #[error("Unable to write to file {0}: {1}")]
    UnableToWrite(String, String),
    /// Malformed CSV content.
    #[error("Invalid CSV input: {0}")]
    Csv(#[from] csv::Error),
    /// The tables do not have the expected shape or column types.
    #[error("Schema error: {0}")]
    Schema(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Configuration could not be assembled.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Model has not been fit yet.
    #[error("The model has not been fit yet.")]
    NotFitted,
    /// A render failed.
    #[error(transparent)]
    Render(#[from] RenderError),
}
