//! The prediction session: an explicit stage machine over one run.
//!
//! Stages advance in one direction only:
//!
//! ```text
//! Idle -> DataLoaded -> LithologyConfigured -> DepthConfigured
//!      -> TargetConfigured -> ModelSelected -> Predicted
//! ```
//!
//! Each stage owns the artifacts computed so far. A failed transition leaves
//! the stage untouched, so the operator can correct the input and retry.
//! `reset()` returns to `Idle` and `reconfigure()` discards every derived
//! artifact. Prediction tables computed by `predict()` stay in the session
//! ledger across both, exported or not.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::{PredictionMode, Property, RunConfig};
use crate::error::{PipelineError, Result};
use crate::export::{export_file_name, PredictionTable, RunReport};
use crate::metrics::{MetricsReport, PropertyMetrics};
use crate::models::{
    FittedModel, ModelStrategy, ModelTrainer, StackingDiagnostics, TrainingSet,
};
use crate::table::{Column, Table};

use super::aligner::{filter_lithology, DepthAligner, LithologySummary};
use super::assembler::{AssembledDataset, AssemblyRequest, DatasetAssembler};
use super::derived::{transverse_conductivity, AxialSource, DerivedPropertyResolver};
use super::encoder::FeatureEncoder;

// ============================================================================
// Stages
// ============================================================================

/// Everything the model stages need, fixed once the target is configured.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub lithology: Option<LithologySummary>,
    pub dataset: AssembledDataset,
    /// Full-interval feature table, row-aligned with `full_depth`
    pub full: Table,
    pub full_depth: Vec<f64>,
    /// Numeric features in training order (lithology excluded)
    pub features: Vec<String>,
    pub axial_source: Option<&'static str>,
}

/// Result of one successful prediction.
#[derive(Debug)]
pub struct RunOutcome {
    pub mode: PredictionMode,
    pub strategy: ModelStrategy,
    pub model: Box<dyn FittedModel>,
    /// Encoded feature names as seen by the model
    pub feature_names: Vec<String>,
    pub metrics: Vec<PropertyMetrics>,
    pub predictions: Vec<PredictionTable>,
    pub stacking: Option<StackingDiagnostics>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub full_rows: usize,
}

impl RunOutcome {
    pub fn metrics_for(&self, property: Property) -> Option<&MetricsReport> {
        self.metrics
            .iter()
            .find(|m| m.property == property)
            .map(|m| &m.metrics)
    }

    pub fn predictions_for(&self, property: Property) -> Option<&PredictionTable> {
        self.predictions.iter().find(|p| p.property == property)
    }
}

#[derive(Debug, Default)]
pub enum Stage {
    #[default]
    Idle,
    DataLoaded {
        logs: Table,
        core: Table,
    },
    LithologyConfigured {
        logs: Table,
        core: Table,
        lithology: Option<LithologySummary>,
    },
    DepthConfigured {
        logs: Table,
        lithology: Option<LithologySummary>,
        aligned: Table,
    },
    TargetConfigured(Box<PreparedData>),
    ModelSelected {
        data: Box<PreparedData>,
        strategy: ModelStrategy,
    },
    Predicted {
        data: Box<PreparedData>,
        outcome: Box<RunOutcome>,
    },
}

impl Stage {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DataLoaded { .. } => "data-loaded",
            Self::LithologyConfigured { .. } => "lithology-configured",
            Self::DepthConfigured { .. } => "depth-configured",
            Self::TargetConfigured(_) => "target-configured",
            Self::ModelSelected { .. } => "model-selected",
            Self::Predicted { .. } => "predicted",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Default)]
pub struct PipelineSession {
    config: RunConfig,
    stage: Stage,
    /// Prediction tables computed in this session, newest last
    ledger: Vec<PredictionTable>,
    axial_upload: Option<Table>,
}

impl PipelineSession {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    pub const fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn ledger(&self) -> &[PredictionTable] {
        &self.ledger
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        match &self.stage {
            Stage::Predicted { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    pub fn prepared(&self) -> Option<&PreparedData> {
        match &self.stage {
            Stage::TargetConfigured(data)
            | Stage::ModelSelected { data, .. }
            | Stage::Predicted { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn aligned(&self) -> Option<&Table> {
        match &self.stage {
            Stage::DepthConfigured { aligned, .. } => Some(aligned),
            _ => None,
        }
    }

    fn invalid(&self, action: &str) -> PipelineError {
        PipelineError::InvalidTransition {
            stage: self.stage.name().to_string(),
            action: action.to_string(),
        }
    }

    /// Discard every derived artifact and the loaded data. The ledger, the
    /// configuration and any uploaded axial predictions are kept.
    pub fn reset(&mut self) {
        info!(from = self.stage.name(), "Session reset");
        self.stage = Stage::Idle;
    }

    /// Replace the configuration and discard derived artifacts. Unprocessed
    /// tables stay loaded; once filtered, the session returns to `Idle`.
    pub fn reconfigure(&mut self, config: RunConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.stage = match std::mem::take(&mut self.stage) {
            Stage::Idle => Stage::Idle,
            Stage::DataLoaded { logs, core } => Stage::DataLoaded { logs, core },
            other => {
                warn!(from = other.name(), "Configuration changed after filtering; tables must be reloaded");
                Stage::Idle
            }
        };
        info!(stage = self.stage.name(), "Session reconfigured");
        Ok(())
    }

    /// Register a previously exported axial prediction file. It takes
    /// priority over axial predictions computed in this session.
    pub fn provide_axial_predictions(&mut self, table: Table) {
        info!(label = %table.label, rows = table.row_count(), "Axial prediction file provided");
        self.axial_upload = Some(table);
    }

    fn axial_source(&self) -> Option<AxialSource> {
        if let Some(upload) = &self.axial_upload {
            return Some(AxialSource::Uploaded(upload.clone()));
        }
        self.ledger
            .iter()
            .rev()
            .find(|t| t.property == Property::AxialConductivity)
            .cloned()
            .map(AxialSource::Session)
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Accept the well-log and core tables. Allowed while idle, or to replace
    /// tables that were loaded but not yet processed.
    pub fn load_data(&mut self, logs: Table, core: Table) -> Result<()> {
        if !matches!(self.stage, Stage::Idle | Stage::DataLoaded { .. }) {
            return Err(self.invalid("load data"));
        }
        for table in [&logs, &core] {
            if table.row_count() == 0 {
                return Err(PipelineError::EmptyDataset(format!("{} has no rows", table.label)));
            }
        }
        info!(
            log_rows = logs.row_count(),
            log_cols = logs.column_count(),
            core_rows = core.row_count(),
            core_cols = core.column_count(),
            "Data loaded"
        );
        self.stage = Stage::DataLoaded { logs, core };
        Ok(())
    }

    /// Filter the well-log table by the core lithology codes, when enabled.
    pub fn configure_lithology(&mut self) -> Result<()> {
        let Stage::DataLoaded { logs, core } = &self.stage else {
            return Err(self.invalid("configure lithology"));
        };

        let (logs, lithology) = match self.config.lithology.active_column() {
            Some(column) => {
                core.require(column)?;
                logs.require(column)?;
                let (filtered, summary) = filter_lithology(logs, core, column)?;
                (filtered, Some(summary))
            }
            None => {
                info!("Lithology disabled; well-log table used as is");
                (logs.clone(), None)
            }
        };

        let core = core.clone();
        self.stage = Stage::LithologyConfigured { logs, core, lithology };
        Ok(())
    }

    /// Validate the depth column in both tables and align the curves.
    pub fn configure_depth(&mut self) -> Result<()> {
        let Stage::LithologyConfigured { logs, core, lithology } = &self.stage else {
            return Err(self.invalid("configure depth"));
        };

        let depth = self.config.run.depth_column.as_str();
        logs.numeric(depth)?;
        core.numeric(depth)?;

        // The lithology code is never interpolated, whether or not it is used.
        let aligned = DepthAligner::new(depth)
            .skipping(self.config.lithology.column.clone())
            .align(logs, core)?;

        let logs = logs.clone();
        let lithology = lithology.clone();
        self.stage = Stage::DepthConfigured { logs, lithology, aligned };
        Ok(())
    }

    /// Resolve features and target for the configured mode, assemble and
    /// split the dataset, and build the full-interval feature table.
    pub fn configure_target(&mut self) -> Result<()> {
        let Stage::DepthConfigured { logs, lithology, aligned } = &self.stage else {
            return Err(self.invalid("configure target"));
        };

        let cfg = &self.config;
        let mode = cfg.run.mode;
        let depth = cfg.run.depth_column.clone();
        let lith_code = cfg.lithology.column.as_str();
        let lith_column = lithology.as_ref().map(|s| s.column.clone());

        // The code column only enters the model as the encoded categorical
        // feature, never as a numeric curve.
        let mut features: Vec<String> = if cfg.run.features.is_empty() {
            DepthAligner::new(depth.as_str())
                .skipping(lith_code)
                .curve_names(logs)
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            cfg.run.features.clone()
        };
        features.retain(|f| *f != depth && f != lith_code);

        let (target, carry, axial_feature) = match mode {
            PredictionMode::Axial => (cfg.columns.axial.clone(), Vec::new(), None),
            PredictionMode::HeatCapacity => (cfg.columns.heat_capacity.clone(), Vec::new(), None),
            PredictionMode::Anisotropy => (
                cfg.columns.anisotropy.clone(),
                vec![cfg.columns.transverse.clone()],
                Some(cfg.columns.axial.clone()),
            ),
        };
        features.retain(|f| *f != target && !carry.contains(f));
        let mut seen = HashSet::new();
        features.retain(|f| seen.insert(f.clone()));

        // The axial source is checked before any work so the operator is
        // prompted for the upload up front.
        let source = match &axial_feature {
            Some(_) => Some(self.axial_source().ok_or(PipelineError::MissingAxialPrediction)?),
            None => None,
        };

        // Full interval: the well-log rows that survived the lithology filter.
        let mut full_columns: Vec<&str> = features
            .iter()
            .map(String::as_str)
            .filter(|f| Some(*f) != axial_feature.as_deref())
            .collect();
        if let Some(column) = &lith_column {
            full_columns.push(column);
        }
        let mut full = logs.select_columns(&full_columns)?.with_label("full-interval table");
        let full_depth = logs.numeric(&depth)?.to_vec();

        if let (Some(axial), Some(source)) = (&axial_feature, &source) {
            let resolver = DerivedPropertyResolver::new(Some(source.clone()));
            full.push_column(Column::numeric(axial.clone(), resolver.axial_at(&full_depth)?))?;
            if !features.contains(axial) {
                features.push(axial.clone());
            }
        }

        let request = AssemblyRequest {
            depth_column: depth,
            features: features.clone(),
            target,
            carry,
            lithology: lith_column,
            test_fraction: cfg.split.test_fraction,
            seed: cfg.split.seed,
        };
        let dataset = DatasetAssembler::new(request).assemble(aligned)?;

        info!(
            mode = ?mode,
            features = ?features,
            full_rows = full.row_count(),
            "Target configured"
        );
        let data = PreparedData {
            lithology: lithology.clone(),
            dataset,
            full,
            full_depth,
            features,
            axial_source: source.as_ref().map(AxialSource::describe),
        };
        self.stage = Stage::TargetConfigured(Box::new(data));
        Ok(())
    }

    /// Fix the strategy from the configuration. May be repeated until a
    /// prediction has been made.
    pub fn select_model(&mut self) -> Result<()> {
        let strategy = self.config.strategy();
        self.stage = match std::mem::take(&mut self.stage) {
            Stage::TargetConfigured(data) | Stage::ModelSelected { data, .. } => {
                info!(strategy = strategy.display_name(), "Model selected");
                Stage::ModelSelected { data, strategy }
            }
            other => {
                let err = PipelineError::InvalidTransition {
                    stage: other.name().to_string(),
                    action: "select model".to_string(),
                };
                self.stage = other;
                return Err(err);
            }
        };
        Ok(())
    }

    /// Encode, train, score and predict the full interval.
    pub fn predict(&mut self) -> Result<&RunOutcome> {
        let Stage::ModelSelected { data, strategy } = &self.stage else {
            return Err(self.invalid("predict"));
        };
        let outcome = self.run_model(data, *strategy)?;
        self.ledger.extend(outcome.predictions.iter().cloned());

        self.stage = match std::mem::take(&mut self.stage) {
            Stage::ModelSelected { data, .. } => Stage::Predicted {
                data,
                outcome: Box::new(outcome),
            },
            other => other,
        };
        self.outcome().ok_or_else(|| self.invalid("read prediction outcome"))
    }

    fn run_model(&self, data: &PreparedData, strategy: ModelStrategy) -> Result<RunOutcome> {
        let cfg = &self.config;
        let mode = cfg.run.mode;
        let ds = &data.dataset;

        // Full-interval rows with a missing feature are not predicted.
        let complete = data.full.complete_rows();
        let full = data.full.select_rows(&complete);
        if complete.len() < data.full.row_count() {
            warn!(
                skipped = data.full.row_count() - complete.len(),
                "Full-interval rows with missing features left unpredicted"
            );
        }

        let encoder = FeatureEncoder::new(
            cfg.scaling.method,
            cfg.lithology.active_column().map(str::to_string),
            cfg.lithology.one_hot,
        );
        let encoded = encoder.encode(&ds.train.features, &ds.test.features, &full)?;

        let trained = ModelTrainer::new(strategy, cfg.model.seed).train(TrainingSet {
            x_train: &encoded.train,
            y_train: &ds.train.target,
            x_test: &encoded.test,
            y_test: &ds.test.target,
            x_full: &encoded.full,
        })?;

        let score = |property: Property, y_true: &[f64], y_pred: &[f64]| -> Result<PropertyMetrics> {
            let metrics = MetricsReport::compute(y_true, y_pred).map_err(|source| {
                PipelineError::TrainingFailed {
                    strategy: strategy.display_name().to_string(),
                    source,
                }
            })?;
            info!(property = property.label(), metrics = %metrics.summary(), "Test metrics");
            Ok(PropertyMetrics { property, metrics })
        };
        let scatter = |values: &[f64]| -> Vec<f64> {
            let mut out = vec![f64::NAN; data.full.row_count()];
            for (&row, &v) in complete.iter().zip(values) {
                out[row] = v;
            }
            out
        };

        let trained_property = mode.trained_property();
        let mut metrics = vec![score(trained_property, &ds.test.target, &trained.test_predictions)?];
        let mut predictions = vec![PredictionTable::new(
            cfg.run.depth_column.clone(),
            trained_property,
            data.full_depth.clone(),
            scatter(&trained.full_predictions),
        )];

        if mode == PredictionMode::Anisotropy {
            let axial = cfg.columns.axial.as_str();
            let test_transverse =
                transverse_conductivity(ds.test.features.numeric(axial)?, &trained.test_predictions);
            metrics.push(score(
                Property::TransverseConductivity,
                ds.test.carried.numeric(&cfg.columns.transverse)?,
                &test_transverse,
            )?);
            let full_transverse = transverse_conductivity(full.numeric(axial)?, &trained.full_predictions);
            predictions.push(PredictionTable::new(
                cfg.run.depth_column.clone(),
                Property::TransverseConductivity,
                data.full_depth.clone(),
                scatter(&full_transverse),
            ));
        }

        Ok(RunOutcome {
            mode,
            strategy,
            model: trained.model,
            feature_names: encoded.feature_names,
            metrics,
            predictions,
            stacking: trained.stacking,
            train_rows: ds.train.len(),
            test_rows: ds.test.len(),
            full_rows: data.full.row_count(),
        })
    }

    /// Write every prediction table and the run report into `dir`. Returns
    /// the written paths.
    pub fn export(&mut self, dir: &Path) -> Result<Vec<PathBuf>> {
        let Stage::Predicted { data, outcome } = &self.stage else {
            return Err(self.invalid("export predictions"));
        };
        std::fs::create_dir_all(dir)?;

        let lithology_enabled = self.config.lithology.enabled;
        let mut exports = Vec::with_capacity(outcome.predictions.len() + 1);
        for table in &outcome.predictions {
            let path = dir.join(export_file_name(&outcome.strategy, table.property, lithology_enabled));
            table.save(&path)?;
            info!(path = %path.display(), rows = table.len(), property = table.property.label(), "Predictions exported");
            exports.push(path);
        }

        let report = RunReport {
            generated_at: Utc::now(),
            mode: outcome.mode,
            model: outcome.strategy.display_name().to_string(),
            strategy: outcome.strategy,
            seed: self.config.model.seed,
            lithology_enabled,
            scaling: self.config.scaling.method,
            features: outcome.feature_names.clone(),
            train_rows: outcome.train_rows,
            test_rows: outcome.test_rows,
            full_rows: outcome.full_rows,
            metrics: outcome.metrics.clone(),
            lithology: data.lithology.clone(),
            stacking: outcome.stacking.clone(),
            exports: exports.clone(),
        };
        let report_path = dir.join(report.file_name());
        report.save(&report_path)?;

        exports.push(report_path);
        Ok(exports)
    }

    /// Drive every stage from freshly loaded tables to a prediction.
    pub fn run(&mut self, logs: Table, core: Table) -> Result<&RunOutcome> {
        self.load_data(logs, core)?;
        self.configure_lithology()?;
        self.configure_depth()?;
        self.configure_target()?;
        self.select_model()?;
        self.predict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;

    fn logs() -> Table {
        let depth: Vec<f64> = (0..100).map(f64::from).collect();
        Table::from_columns(
            "well-log table",
            vec![
                Column::numeric("DEPT", depth.clone()),
                Column::numeric("GR", depth.iter().map(|d| d * 2.0).collect()),
                Column::numeric("NPHI", depth.iter().map(|d| 0.3 + 0.05 * (d * 0.3).sin()).collect()),
            ],
        )
        .unwrap()
    }

    fn core() -> Table {
        let depth: Vec<f64> = (1..40).map(|i| f64::from(i) * 2.5).collect();
        let axial: Vec<f64> = depth.iter().map(|d| 1.0 + d * 0.02).collect();
        let k: Vec<f64> = depth.iter().map(|d| 1.1 + d * 0.001).collect();
        let transverse: Vec<f64> = axial.iter().zip(&k).map(|(a, k)| a / k).collect();
        Table::from_columns(
            "core table",
            vec![
                Column::numeric("DEPT", depth),
                Column::numeric("TC_par_ups", axial),
                Column::numeric("Anisotropy_ups", k),
                Column::numeric("TC_per_ups", transverse),
            ],
        )
        .unwrap()
    }

    fn linear_config(mode: PredictionMode) -> RunConfig {
        let mut config = RunConfig::default();
        config.run.mode = mode;
        config.model.strategy = StrategyKind::Linear;
        config
    }

    #[test]
    fn test_out_of_order_transition_rejected() {
        let mut session = PipelineSession::new(RunConfig::default());
        let err = session.configure_depth().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { ref stage, .. } if stage == "idle"));
        assert_eq!(session.stage().name(), "idle");
    }

    #[test]
    fn test_full_axial_run_reaches_predicted() {
        let mut session = PipelineSession::new(linear_config(PredictionMode::Axial));
        let outcome = session.run(logs(), core()).unwrap();
        assert_eq!(outcome.predictions.len(), 1);
        assert_eq!(outcome.predictions[0].len(), 100);
        let r2 = outcome.metrics_for(Property::AxialConductivity).unwrap().r_squared.unwrap();
        assert!(r2 > 0.99, "linear target should be recovered, R2={r2}");
        assert_eq!(session.stage().name(), "predicted");
    }

    #[test]
    fn test_failed_stage_keeps_previous_stage() {
        let mut config = linear_config(PredictionMode::Axial);
        config.run.depth_column = "DEPTH".into();
        let mut session = PipelineSession::new(config);
        session.load_data(logs(), core()).unwrap();
        session.configure_lithology().unwrap();
        assert!(matches!(session.configure_depth(), Err(PipelineError::MissingColumn { .. })));
        assert_eq!(session.stage().name(), "lithology-configured");
    }

    #[test]
    fn test_anisotropy_without_source_needs_upload() {
        let mut session = PipelineSession::new(linear_config(PredictionMode::Anisotropy));
        session.load_data(logs(), core()).unwrap();
        session.configure_lithology().unwrap();
        session.configure_depth().unwrap();
        assert!(matches!(session.configure_target(), Err(PipelineError::MissingAxialPrediction)));
        assert_eq!(session.stage().name(), "depth-configured");
    }

    #[test]
    fn test_reconfigure_discards_artifacts_but_keeps_tables() {
        let mut session = PipelineSession::new(linear_config(PredictionMode::Axial));
        session.load_data(logs(), core()).unwrap();
        session
            .reconfigure(linear_config(PredictionMode::HeatCapacity))
            .unwrap();
        assert_eq!(session.stage().name(), "data-loaded");

        session.configure_lithology().unwrap();
        session.reconfigure(linear_config(PredictionMode::Axial)).unwrap();
        assert_eq!(session.stage().name(), "idle");
    }
}
