//! petrotherm: rock thermal-property prediction from well logs
//!
//! Supervised regression trained on sparse core measurements and applied to
//! the continuously logged well interval.
//!
//! ## Architecture
//!
//! - **Ingest**: CSV and XLSX uploads parsed into typed tables
//! - **Pipeline**: lithology filter, depth alignment, dataset assembly, feature encoding
//! - **Models**: six regression strategies behind one `Regressor` interface
//! - **Derived properties**: transverse conductivity from predicted anisotropy
//! - **Export**: depth-indexed prediction CSVs and a JSON run report

pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod table;

// Re-export run configuration
pub use config::{PredictionMode, Property, RunConfig};

// Re-export errors
pub use error::{ModelError, PipelineError};

// Re-export the session and its stages
pub use pipeline::{PipelineSession, RunOutcome, Stage};

// Re-export model types
pub use models::{FittedModel, Matrix, ModelStrategy, ModelTrainer, Regressor};

// Re-export results
pub use export::{PredictionTable, RunReport};
pub use metrics::MetricsReport;
pub use table::{Column, ColumnData, Table};
