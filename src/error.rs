//! Pipeline error taxonomy
//!
//! Ingest and configuration errors halt the current stage only; training
//! errors abort the current prediction attempt; metric degeneracy is reported
//! as an undefined value and only surfaces as an error through the checked
//! accessor on `MetricsReport`.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced to the operator by every pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported file format '{0}': upload a .csv or .xlsx file")]
    UnsupportedFormat(String),

    #[error("Column '{column}' not found in {table}")]
    MissingColumn { column: String, table: String },

    #[error("No usable rows left: {0}")]
    EmptyDataset(String),

    #[error("Curve '{curve}' has {found} sample(s) inside the core depth range; at least 2 are required for interpolation")]
    InsufficientSamples { curve: String, found: usize },

    #[error("Scaler used before it was fitted on the training features")]
    UnfittedScalerReuse,

    #[error("Lithology categories cannot be aligned with the training columns: {0}")]
    CategoryMismatch(String),

    #[error("Training with {strategy} failed: {source}")]
    TrainingFailed {
        strategy: String,
        #[source]
        source: ModelError,
    },

    #[error("No axial conductivity predictions available: run an axial prediction first or upload a previous axial prediction file")]
    MissingAxialPrediction,

    #[error("Target values are constant; R^2 is undefined")]
    DegenerateTarget,

    #[error("Cannot {action} while the session is in stage '{stage}'")]
    InvalidTransition { stage: String, action: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn missing_column(column: impl Into<String>, table: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            table: table.into(),
        }
    }
}

/// Failures raised by the regression algorithms themselves.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("cannot fit on an empty training set")]
    EmptyInput,

    #[error("feature matrix has {rows} rows but target has {targets} values")]
    LengthMismatch { rows: usize, targets: usize },

    #[error("model was fitted on {expected} features, got {found}")]
    FeatureMismatch { expected: usize, found: usize },

    #[error("target contains non-finite values")]
    NonFiniteTarget,

    #[error("normal equations are singular")]
    Singular,

    #[error("{0}")]
    InvalidParameter(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
