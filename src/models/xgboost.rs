//! Second-order boosting in the XGBoost formulation.
//!
//! For squared error the gradient is `prediction - target` and the hessian is
//! one, so a leaf holds `Σ residual / (n + lambda)` and the split gain is the
//! regularised score difference computed by the shared tree grower. A split is
//! kept only when its gain is positive (`gamma = 0`). `min_child_weight = 1`
//! means every child needs at least one sample.

use super::gradient_boosting::{boost, check_boosting};
use super::tree::TreeGrower;
use super::{check_training_data, FittedModel, Matrix, Regressor};
use crate::error::ModelError;
use crate::models::BoostingParams;

/// L2 regularisation on leaf weights.
pub const LAMBDA: f64 = 1.0;

/// Minimum hessian sum per child; one sample carries a hessian of one.
pub const MIN_CHILD_WEIGHT: usize = 1;

#[derive(Debug, Clone, Copy)]
pub struct XGBoostRegressor {
    params: BoostingParams,
    seed: u64,
}

impl XGBoostRegressor {
    pub const fn new(params: BoostingParams, seed: u64) -> Self {
        Self { params, seed }
    }
}

impl Regressor for XGBoostRegressor {
    fn name(&self) -> &'static str {
        "XGBoost"
    }

    fn fit(&self, x: &Matrix, y: &[f64]) -> Result<Box<dyn FittedModel>, ModelError> {
        check_training_data(x, y)?;
        check_boosting(&self.params)?;
        let grower = TreeGrower {
            max_depth: self.params.max_depth,
            min_samples_split: 2 * MIN_CHILD_WEIGHT,
            min_samples_leaf: MIN_CHILD_WEIGHT,
            lambda: LAMBDA,
            seed: self.seed,
        };
        Ok(Box::new(boost(x, y, &self.params, grower)))
    }
}
