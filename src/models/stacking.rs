//! Stacking ensemble.
//!
//! Base learners, in fixed declaration order: gradient boosting, XGBoost,
//! CatBoost. Their K-fold out-of-fold predictions on the training set form the
//! meta-feature matrix (one column per base learner, one row per training
//! sample) on which a linear meta-model is fitted. For prediction every base
//! learner is refitted on the whole training set and its raw predictions feed
//! the meta-model.
//!
//! Folds are contiguous and unshuffled; the first `n % k` folds hold one extra
//! sample.

use tracing::{debug, info};

use super::linear::{FittedLinear, LinearRegressor};
use super::{
    check_features, check_training_data, CatBoostRegressor, FittedModel,
    GradientBoostingRegressor, Matrix, Regressor, XGBoostRegressor,
};
use crate::error::ModelError;
use crate::models::StackingParams;

#[derive(Debug, Clone, Copy)]
pub struct StackingRegressor {
    params: StackingParams,
    seed: u64,
}

#[derive(Debug)]
pub struct FittedStacking {
    names: Vec<&'static str>,
    bases: Vec<Box<dyn FittedModel>>,
    meta: FittedLinear,
    meta_features: Matrix,
    n_features: usize,
}

impl FittedStacking {
    /// Out-of-fold meta-features the meta-model was fitted on.
    pub const fn meta_features(&self) -> &Matrix {
        &self.meta_features
    }

    pub const fn meta_model(&self) -> &FittedLinear {
        &self.meta
    }

    /// Base learners refitted on the full training set, in declaration order.
    pub fn base_learners(&self) -> impl Iterator<Item = (&'static str, &dyn FittedModel)> {
        self.names.iter().copied().zip(self.bases.iter().map(|b| &**b))
    }
}

impl FittedModel for FittedStacking {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>, ModelError> {
        check_features(self.n_features, x)?;
        let mut columns = Vec::with_capacity(self.bases.len());
        for base in &self.bases {
            columns.push(base.predict(x)?);
        }
        let meta_x = Matrix::from_columns(x.rows(), &columns)?;
        self.meta.predict(&meta_x)
    }
}

/// Contiguous fold boundaries `(start, end)` for `n` samples in `k` folds.
pub fn fold_bounds(n: usize, k: usize) -> Vec<(usize, usize)> {
    let k = k.clamp(1, n.max(1));
    let mut bounds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = n / k + usize::from(fold < n % k);
        bounds.push((start, start + size));
        start += size;
    }
    bounds
}

impl StackingRegressor {
    pub const fn new(params: StackingParams, seed: u64) -> Self {
        Self { params, seed }
    }

    fn base_learners(&self) -> Vec<Box<dyn Regressor>> {
        vec![
            Box::new(GradientBoostingRegressor::new(self.params.gradient_boosting, self.seed))
                as Box<dyn Regressor>,
            Box::new(XGBoostRegressor::new(self.params.xgboost, self.seed)),
            Box::new(CatBoostRegressor::new(self.params.catboost, self.seed)),
        ]
    }

    /// Fit the ensemble, keeping the out-of-fold meta-feature matrix.
    pub fn fit_stacked(&self, x: &Matrix, y: &[f64]) -> Result<FittedStacking, ModelError> {
        check_training_data(x, y)?;
        let n = x.rows();
        if n < 2 {
            return Err(ModelError::InvalidParameter(
                "stacking needs at least 2 training samples for cross-validation".to_string(),
            ));
        }
        if self.params.folds < 2 {
            return Err(ModelError::InvalidParameter("stacking needs at least 2 folds".to_string()));
        }

        let learners = self.base_learners();
        let folds = fold_bounds(n, self.params.folds);
        debug!(folds = folds.len(), learners = learners.len(), "Building out-of-fold meta-features");

        let mut meta_features = Matrix::zeros(n, learners.len());
        for (col, learner) in learners.iter().enumerate() {
            for &(start, end) in &folds {
                let train_rows: Vec<usize> = (0..start).chain(end..n).collect();
                let held_rows: Vec<usize> = (start..end).collect();
                let train_y: Vec<f64> = train_rows.iter().map(|&r| y[r]).collect();
                let model = learner.fit(&x.select_rows(&train_rows), &train_y)?;
                let pred = model.predict(&x.select_rows(&held_rows))?;
                for (&r, p) in held_rows.iter().zip(pred) {
                    meta_features.set(r, col, p);
                }
            }
        }

        let meta = LinearRegressor.fit_linear(&meta_features, y)?;
        info!(
            intercept = meta.intercept,
            weights = ?meta.coefficients,
            "Stacking meta-model fitted"
        );

        let mut names = Vec::with_capacity(learners.len());
        let mut bases = Vec::with_capacity(learners.len());
        for learner in &learners {
            names.push(learner.name());
            bases.push(learner.fit(x, y)?);
        }

        Ok(FittedStacking {
            names,
            bases,
            meta,
            meta_features,
            n_features: x.cols(),
        })
    }
}

impl Regressor for StackingRegressor {
    fn name(&self) -> &'static str {
        "Stacking"
    }

    fn fit(&self, x: &Matrix, y: &[f64]) -> Result<Box<dyn FittedModel>, ModelError> {
        Ok(Box::new(self.fit_stacked(x, y)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoostingParams, CatBoostParams};
    use crate::models::tests::linear_data;

    fn small_params() -> StackingParams {
        StackingParams {
            gradient_boosting: BoostingParams { n_estimators: 15, ..BoostingParams::gradient_boosting() },
            xgboost: BoostingParams { n_estimators: 15, ..BoostingParams::xgboost() },
            catboost: CatBoostParams { iterations: 15, ..CatBoostParams::default() },
            ..StackingParams::default()
        }
    }

    #[test]
    fn test_fold_bounds_cover_all_rows() {
        assert_eq!(fold_bounds(12, 5), vec![(0, 3), (3, 6), (6, 8), (8, 10), (10, 12)]);
        assert_eq!(fold_bounds(3, 5), vec![(0, 1), (1, 2), (2, 3)], "folds clamp to n");
    }

    #[test]
    fn test_meta_feature_shape() {
        let (x, y) = linear_data(17);
        let fitted = StackingRegressor::new(small_params(), 42).fit_stacked(&x, &y).unwrap();
        assert_eq!(fitted.meta_features().rows(), 17);
        assert_eq!(fitted.meta_features().cols(), 3);
        let names: Vec<&str> = fitted.base_learners().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Gradient Boosting", "XGBoost", "CatBoost"]);
    }

    #[test]
    fn test_predicts_every_row() {
        let (x, y) = linear_data(12);
        let model = StackingRegressor::new(small_params(), 42).fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.len(), 12);
        assert!(pred.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_single_sample_is_rejected() {
        let x = Matrix::from_rows(&[vec![1.0]]).unwrap();
        assert!(StackingRegressor::new(small_params(), 42).fit(&x, &[1.0]).is_err());
    }
}
