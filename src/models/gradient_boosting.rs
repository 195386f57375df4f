//! Squared-error gradient boosting.
//!
//! Starts from the target mean; each stage fits a CART tree to the current
//! residuals and adds it scaled by the learning rate.

use tracing::debug;

use super::tree::{RegressionTree, TreeGrower};
use super::{check_features, check_training_data, mean, FittedModel, Matrix, Regressor};
use crate::error::ModelError;
use crate::models::BoostingParams;

#[derive(Debug, Clone, Copy)]
pub struct GradientBoostingRegressor {
    params: BoostingParams,
    seed: u64,
}

/// An additive ensemble of regression trees on top of a constant.
#[derive(Debug, Clone)]
pub struct FittedEnsemble {
    pub(crate) base: f64,
    pub(crate) learning_rate: f64,
    pub(crate) trees: Vec<RegressionTree>,
    pub(crate) n_features: usize,
}

impl FittedEnsemble {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.base
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict_row(row))
                .sum::<f64>()
    }
}

impl FittedModel for FittedEnsemble {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>, ModelError> {
        check_features(self.n_features, x)?;
        Ok((0..x.rows()).map(|r| self.predict_row(x.row(r))).collect())
    }
}

pub(crate) fn check_boosting(params: &BoostingParams) -> Result<(), ModelError> {
    if !(params.learning_rate > 0.0 && params.learning_rate <= 1.0) {
        return Err(ModelError::InvalidParameter(format!(
            "learning_rate {} outside (0, 1]",
            params.learning_rate
        )));
    }
    if params.n_estimators == 0 {
        return Err(ModelError::InvalidParameter("n_estimators must be >= 1".to_string()));
    }
    Ok(())
}

/// Boost `n_estimators` trees from `grower` on the residuals of `y`.
pub(crate) fn boost(
    x: &Matrix,
    y: &[f64],
    params: &BoostingParams,
    grower: TreeGrower,
) -> FittedEnsemble {
    let base = mean(y);
    let rows: Vec<usize> = (0..x.rows()).collect();
    let mut current = vec![base; y.len()];
    let mut trees = Vec::with_capacity(params.n_estimators);

    for stage in 0..params.n_estimators {
        let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
        let tree = TreeGrower {
            seed: grower.seed.wrapping_add(stage as u64),
            ..grower
        }
        .grow(x, &residuals, &rows);
        for (r, value) in current.iter_mut().enumerate() {
            *value += params.learning_rate * tree.predict_row(x.row(r));
        }
        trees.push(tree);
    }

    let train_mse = y
        .iter()
        .zip(&current)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y.len() as f64;
    debug!(trees = trees.len(), train_mse, "Boosting complete");

    FittedEnsemble {
        base,
        learning_rate: params.learning_rate,
        trees,
        n_features: x.cols(),
    }
}

impl GradientBoostingRegressor {
    pub const fn new(params: BoostingParams, seed: u64) -> Self {
        Self { params, seed }
    }
}

impl Regressor for GradientBoostingRegressor {
    fn name(&self) -> &'static str {
        "Gradient Boosting"
    }

    fn fit(&self, x: &Matrix, y: &[f64]) -> Result<Box<dyn FittedModel>, ModelError> {
        check_training_data(x, y)?;
        check_boosting(&self.params)?;
        let grower = TreeGrower {
            max_depth: self.params.max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            lambda: 0.0,
            seed: self.seed,
        };
        Ok(Box::new(boost(x, y, &self.params, grower)))
    }
}
