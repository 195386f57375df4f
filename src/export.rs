//! Prediction export: per-depth CSV tables and a JSON run report.
//!
//! A prediction CSV has exactly two columns, the depth column name and
//! `{Property}_pred`, one row per full-interval depth and no index column.
//! Files are named `{Model}_{Property}_{lithology}.csv` where the model name
//! has its spaces removed and the lithology flag is `true` or `false`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::{PredictionMode, Property, ScalingMethod};
use crate::error::{PipelineError, Result};
use crate::ingest::csv::write_numeric;
use crate::metrics::PropertyMetrics;
use crate::models::{ModelStrategy, StackingDiagnostics};
use crate::pipeline::LithologySummary;
use crate::table::{Column, Table};

/// Depth-indexed predictions of one property.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    pub depth_column: String,
    pub property: Property,
    pub depths: Vec<f64>,
    pub values: Vec<f64>,
}

impl PredictionTable {
    pub fn new(depth_column: impl Into<String>, property: Property, depths: Vec<f64>, values: Vec<f64>) -> Self {
        Self {
            depth_column: depth_column.into(),
            property,
            depths,
            values,
        }
    }

    pub fn value_column(&self) -> String {
        format!("{}_pred", self.property.label())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Two-column table view (depth, prediction).
    pub fn to_table(&self) -> Result<Table> {
        Table::from_columns(
            format!("{} predictions", self.property.label()),
            vec![
                Column::numeric(&self.depth_column, self.depths.clone()),
                Column::numeric(self.value_column(), self.values.clone()),
            ],
        )
    }

    /// Write as UTF-8 CSV; `NaN` predictions become empty cells.
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> Result<()> {
        let value_column = self.value_column();
        write_numeric(
            writer,
            &[self.depth_column.as_str(), value_column.as_str()],
            &[self.depths.as_slice(), self.values.as_slice()],
        )?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_csv(&mut writer)
    }
}

/// `{Model}_{Property}_{lithology}.csv`
pub fn export_file_name(strategy: &ModelStrategy, property: Property, lithology: bool) -> String {
    format!("{}_{}_{lithology}.csv", strategy.file_stem(), property.label())
}

// ============================================================================
// Run Report
// ============================================================================

/// Everything needed to reproduce and audit one prediction run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub mode: PredictionMode,
    pub model: String,
    pub strategy: ModelStrategy,
    pub seed: u64,
    pub lithology_enabled: bool,
    pub scaling: ScalingMethod,
    pub features: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub full_rows: usize,
    pub metrics: Vec<PropertyMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lithology: Option<LithologySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacking: Option<StackingDiagnostics>,
    pub exports: Vec<PathBuf>,
}

impl RunReport {
    /// `{Model}_{mode}_{lithology}_report.json`
    pub fn file_name(&self) -> String {
        let mode = serde_json::to_value(self.mode)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        format!(
            "{}_{mode}_{}_report.json",
            self.strategy.file_stem(),
            self.lithology_enabled
        )
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Parse(format!("report serialization: {e}")))?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Run report written");
        Ok(())
    }
}
