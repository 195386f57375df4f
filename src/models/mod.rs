//! Regression Strategies
//!
//! Every strategy implements the same capability interface: `Regressor::fit`
//! consumes a dense feature matrix and a target vector and returns a
//! `FittedModel` whose `predict` maps feature rows to scalar predictions.
//!
//! ## Architecture
//! - `params`: strategy-specific hyperparameter records and `ModelStrategy`
//! - `linear`: ordinary least squares with intercept
//! - `tree`: CART regression tree grower shared by the tree-based strategies
//! - `gradient_boosting`: squared-error gradient boosting
//! - `xgboost`: second-order boosting with L2 leaf regularisation
//! - `catboost`: boosting over oblivious (symmetric) trees
//! - `stacking`: out-of-fold stacking of the boosting learners with a linear meta-model
//!
//! `ModelTrainer` drives one strategy over the train, test and full-interval
//! matrices and wraps any algorithm failure into `TrainingFailed`.

pub mod catboost;
pub mod gradient_boosting;
pub mod linear;
pub mod params;
pub mod stacking;
pub mod tree;
pub mod xgboost;

use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

use crate::error::{ModelError, PipelineError, Result};
use crate::metrics::mean_squared_error;

pub use catboost::CatBoostRegressor;
pub use gradient_boosting::GradientBoostingRegressor;
pub use linear::LinearRegressor;
pub use params::{
    BoostingParams, CatBoostParams, DecisionTreeParams, ModelStrategy, StackingParams,
};
pub use stacking::{FittedStacking, StackingRegressor};
pub use tree::DecisionTreeRegressor;
pub use xgboost::XGBoostRegressor;

// ============================================================================
// Dense Matrix
// ============================================================================

/// Row-major dense feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> std::result::Result<Self, ModelError> {
        if data.len() != rows * cols {
            return Err(ModelError::InvalidParameter(format!(
                "matrix data has {} values, expected {rows} x {cols}",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from equally long rows. An empty slice gives a 0 x 0 matrix.
    pub fn from_rows(rows: &[Vec<f64>]) -> std::result::Result<Self, ModelError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ModelError::InvalidParameter(format!(
                    "row {i} has {} values, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Build from equally long columns.
    pub fn from_columns(rows: usize, columns: &[Vec<f64>]) -> std::result::Result<Self, ModelError> {
        let mut m = Self::zeros(rows, columns.len());
        for (c, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(ModelError::InvalidParameter(format!(
                    "column {c} has {} values, expected {rows}",
                    column.len()
                )));
            }
            for (r, &v) in column.iter().enumerate() {
                m.data[r * m.cols + c] = v;
            }
        }
        Ok(m)
    }

    pub const fn rows(&self) -> usize {
        self.rows
    }

    pub const fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        self.data[r * self.cols + c] = value;
    }

    pub fn column(&self, c: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }

    /// New matrix with the given rows, in order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        Self {
            rows: rows.len(),
            cols: self.cols,
            data,
        }
    }
}

// ============================================================================
// Capability Interface
// ============================================================================

/// An unfitted regression strategy.
pub trait Regressor: Debug {
    /// Human-readable strategy name used in logs and errors.
    fn name(&self) -> &'static str;

    fn fit(&self, x: &Matrix, y: &[f64]) -> std::result::Result<Box<dyn FittedModel>, ModelError>;
}

/// A fitted regression mapping feature rows to a scalar target.
pub trait FittedModel: Debug + Send + Sync {
    /// Number of feature columns the model was fitted on.
    fn n_features(&self) -> usize;

    /// Predict one value per row of `x`.
    fn predict(&self, x: &Matrix) -> std::result::Result<Vec<f64>, ModelError>;
}

/// Shared input checks for every `fit`.
pub(crate) fn check_training_data(x: &Matrix, y: &[f64]) -> std::result::Result<(), ModelError> {
    if x.rows() == 0 || y.is_empty() {
        return Err(ModelError::EmptyInput);
    }
    if x.rows() != y.len() {
        return Err(ModelError::LengthMismatch {
            rows: x.rows(),
            targets: y.len(),
        });
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFiniteTarget);
    }
    Ok(())
}

pub(crate) const fn check_features(expected: usize, x: &Matrix) -> std::result::Result<(), ModelError> {
    if x.cols() == expected {
        Ok(())
    } else {
        Err(ModelError::FeatureMismatch {
            expected,
            found: x.cols(),
        })
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl ModelStrategy {
    /// Instantiate the regressor for this strategy.
    pub fn regressor(&self, seed: u64) -> Box<dyn Regressor> {
        match *self {
            Self::Linear => Box::new(LinearRegressor::default()),
            Self::DecisionTree(p) => Box::new(DecisionTreeRegressor::new(p, seed)),
            Self::GradientBoosting(p) => Box::new(GradientBoostingRegressor::new(p, seed)),
            Self::XGBoost(p) => Box::new(XGBoostRegressor::new(p, seed)),
            Self::CatBoost(p) => Box::new(CatBoostRegressor::new(p, seed)),
            Self::Stacking(p) => Box::new(StackingRegressor::new(p, seed)),
        }
    }
}

// ============================================================================
// Model Trainer
// ============================================================================

/// Encoded matrices of one training run.
#[derive(Debug, Clone, Copy)]
pub struct TrainingSet<'a> {
    pub x_train: &'a Matrix,
    pub y_train: &'a [f64],
    pub x_test: &'a Matrix,
    pub y_test: &'a [f64],
    pub x_full: &'a Matrix,
}

/// Test-set diagnostics printed alongside a stacking run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackingDiagnostics {
    /// (base learner, test MSE) in declaration order
    pub base_learner_mse: Vec<(String, f64)>,
    /// Test MSE of a plain linear model on the encoded features
    pub linear_baseline_mse: f64,
    pub stacked_mse: f64,
    /// Shape of the out-of-fold meta-feature matrix (rows, columns)
    pub meta_feature_shape: (usize, usize),
}

/// Result of one training run.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub strategy: ModelStrategy,
    pub model: Box<dyn FittedModel>,
    pub test_predictions: Vec<f64>,
    pub full_predictions: Vec<f64>,
    pub stacking: Option<StackingDiagnostics>,
}

/// Drives one strategy with a fixed seed.
#[derive(Debug, Clone, Copy)]
pub struct ModelTrainer {
    strategy: ModelStrategy,
    seed: u64,
}

impl ModelTrainer {
    pub const fn new(strategy: ModelStrategy, seed: u64) -> Self {
        Self { strategy, seed }
    }

    pub const fn strategy(&self) -> ModelStrategy {
        self.strategy
    }

    fn failed(&self, source: ModelError) -> PipelineError {
        PipelineError::TrainingFailed {
            strategy: self.strategy.display_name().to_string(),
            source,
        }
    }

    /// Fit on the training matrix and predict the test and full-interval matrices.
    pub fn train(&self, data: TrainingSet<'_>) -> Result<TrainingOutcome> {
        info!(
            strategy = self.strategy.display_name(),
            train_rows = data.x_train.rows(),
            test_rows = data.x_test.rows(),
            full_rows = data.x_full.rows(),
            features = data.x_train.cols(),
            "Training model"
        );

        let (model, stacking) = match self.strategy {
            ModelStrategy::Stacking(params) => {
                let fitted = StackingRegressor::new(params, self.seed)
                    .fit_stacked(data.x_train, data.y_train)
                    .map_err(|e| self.failed(e))?;
                let diagnostics = self
                    .stacking_diagnostics(&fitted, data)
                    .map_err(|e| self.failed(e))?;
                (Box::new(fitted) as Box<dyn FittedModel>, Some(diagnostics))
            }
            strategy => {
                let model = strategy
                    .regressor(self.seed)
                    .fit(data.x_train, data.y_train)
                    .map_err(|e| self.failed(e))?;
                (model, None)
            }
        };

        let test_predictions = model.predict(data.x_test).map_err(|e| self.failed(e))?;
        let full_predictions = model.predict(data.x_full).map_err(|e| self.failed(e))?;
        debug!(
            test = test_predictions.len(),
            full = full_predictions.len(),
            "Predictions complete"
        );

        Ok(TrainingOutcome {
            strategy: self.strategy,
            model,
            test_predictions,
            full_predictions,
            stacking,
        })
    }

    fn stacking_diagnostics(
        &self,
        fitted: &FittedStacking,
        data: TrainingSet<'_>,
    ) -> std::result::Result<StackingDiagnostics, ModelError> {
        let mut base_learner_mse = Vec::new();
        for (name, base) in fitted.base_learners() {
            let pred = base.predict(data.x_test)?;
            let mse = mean_squared_error(data.y_test, &pred);
            info!(base_learner = name, mse, "Stacking base learner test MSE");
            base_learner_mse.push((name.to_string(), mse));
        }

        let linear = LinearRegressor::default().fit(data.x_train, data.y_train)?;
        let linear_baseline_mse = mean_squared_error(data.y_test, &linear.predict(data.x_test)?);
        let stacked_mse = mean_squared_error(data.y_test, &fitted.predict(data.x_test)?);
        let meta = fitted.meta_features();
        info!(
            linear_baseline_mse,
            stacked_mse,
            meta_rows = meta.rows(),
            meta_cols = meta.cols(),
            "Stacking diagnostics"
        );

        Ok(StackingDiagnostics {
            base_learner_mse,
            linear_baseline_mse,
            stacked_mse,
            meta_feature_shape: (meta.rows(), meta.cols()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn linear_data(n: usize) -> (Matrix, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y = rows.iter().map(|r| 2.0 * r[0] - r[1] + 1.0).collect();
        (Matrix::from_rows(&rows).unwrap(), y)
    }

    #[test]
    fn test_matrix_from_columns_is_row_major() {
        let m = Matrix::from_columns(2, &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.row(0), &[1.0, 3.0]);
        assert_eq!(m.row(1), &[2.0, 4.0]);
        assert_eq!(m.column(1), vec![3.0, 4.0]);
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        assert!(Matrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_check_training_data() {
        let (x, y) = linear_data(4);
        assert!(check_training_data(&x, &y).is_ok());
        assert_eq!(
            check_training_data(&x, &y[..3]),
            Err(ModelError::LengthMismatch { rows: 4, targets: 3 })
        );
        assert_eq!(
            check_training_data(&x, &[1.0, f64::NAN, 1.0, 1.0]),
            Err(ModelError::NonFiniteTarget)
        );
    }

    #[test]
    fn test_trainer_wraps_errors_with_strategy_name() {
        let x = Matrix::zeros(0, 2);
        let trainer = ModelTrainer::new(ModelStrategy::XGBoost(BoostingParams::xgboost()), 42);
        let err = trainer
            .train(TrainingSet {
                x_train: &x,
                y_train: &[],
                x_test: &x,
                y_test: &[],
                x_full: &x,
            })
            .unwrap_err();
        match err {
            PipelineError::TrainingFailed { strategy, source } => {
                assert_eq!(strategy, "XGBoost");
                assert_eq!(source, ModelError::EmptyInput);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_every_strategy_is_deterministic() {
        let (x, y) = linear_data(30);
        let strategies = [
            ModelStrategy::Linear,
            ModelStrategy::DecisionTree(DecisionTreeParams::default()),
            ModelStrategy::GradientBoosting(BoostingParams { n_estimators: 20, ..BoostingParams::gradient_boosting() }),
            ModelStrategy::XGBoost(BoostingParams { n_estimators: 20, ..BoostingParams::xgboost() }),
            ModelStrategy::CatBoost(CatBoostParams { iterations: 30, ..CatBoostParams::default() }),
            ModelStrategy::Stacking(StackingParams {
                folds: 3,
                gradient_boosting: BoostingParams { n_estimators: 10, ..BoostingParams::gradient_boosting() },
                xgboost: BoostingParams { n_estimators: 10, ..BoostingParams::xgboost() },
                catboost: CatBoostParams { iterations: 10, ..CatBoostParams::default() },
            }),
        ];
        for strategy in strategies {
            let run = || {
                ModelTrainer::new(strategy, 42)
                    .train(TrainingSet {
                        x_train: &x,
                        y_train: &y,
                        x_test: &x,
                        y_test: &y,
                        x_full: &x,
                    })
                    .unwrap()
                    .full_predictions
            };
            let a = run();
            let b = run();
            assert_eq!(a.len(), 30, "{} must predict every row", strategy.display_name());
            assert!(
                a.iter().zip(&b).all(|(p, q)| p.to_bits() == q.to_bits()),
                "{} must be bit-identical across runs",
                strategy.display_name()
            );
        }
    }

    #[test]
    fn test_stacking_reports_diagnostics() {
        let (x, y) = linear_data(25);
        let params = StackingParams {
            gradient_boosting: BoostingParams { n_estimators: 10, ..BoostingParams::gradient_boosting() },
            xgboost: BoostingParams { n_estimators: 10, ..BoostingParams::xgboost() },
            catboost: CatBoostParams { iterations: 10, ..CatBoostParams::default() },
            ..StackingParams::default()
        };
        let outcome = ModelTrainer::new(ModelStrategy::Stacking(params), 42)
            .train(TrainingSet {
                x_train: &x,
                y_train: &y,
                x_test: &x,
                y_test: &y,
                x_full: &x,
            })
            .unwrap();
        let diagnostics = outcome.stacking.expect("stacking diagnostics present");
        assert_eq!(diagnostics.base_learner_mse.len(), 3);
        assert_eq!(diagnostics.meta_feature_shape, (25, 3));
        assert!(diagnostics.linear_baseline_mse < 1e-6);
    }
}
