//! Strategy-specific hyperparameter records.
//!
//! Each strategy owns its own record; there is no shared parameter map.
//! Depth limits are `Option<usize>` where `None` means unlimited; in TOML an
//! unlimited depth is written as `0`.

use serde::{Deserialize, Serialize};

/// Serde adapter mapping `0` to an unlimited (`None`) depth.
pub mod depth_limit {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.map_or(0, |d| d as u64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let raw = u64::deserialize(d)?;
        Ok(if raw == 0 { None } else { Some(raw as usize) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeParams {
    #[serde(default, with = "depth_limit")]
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
}

fn default_min_samples_split() -> usize { 2 }
fn default_min_samples_leaf() -> usize { 1 }

impl Default for DecisionTreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
        }
    }
}

/// Shared shape of the gradient boosting and XGBoost parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    #[serde(with = "depth_limit")]
    pub max_depth: Option<usize>,
    pub learning_rate: f64,
    pub n_estimators: usize,
}

impl BoostingParams {
    /// Defaults of the gradient boosting strategy.
    pub const fn gradient_boosting() -> Self {
        Self { max_depth: Some(3), learning_rate: 0.01, n_estimators: 200 }
    }

    /// Defaults of the XGBoost strategy.
    pub const fn xgboost() -> Self {
        Self { max_depth: Some(7), learning_rate: 0.5, n_estimators: 200 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CatBoostParams {
    #[serde(default = "default_catboost_depth", with = "depth_limit")]
    pub depth: Option<usize>,
    #[serde(default = "default_catboost_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_l2_leaf_reg")]
    pub l2_leaf_reg: f64,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
}

fn default_catboost_depth() -> Option<usize> { Some(7) }
fn default_catboost_learning_rate() -> f64 { 0.5 }
fn default_l2_leaf_reg() -> f64 { 5.0 }
fn default_iterations() -> usize { 700 }

impl Default for CatBoostParams {
    fn default() -> Self {
        Self {
            depth: default_catboost_depth(),
            learning_rate: default_catboost_learning_rate(),
            l2_leaf_reg: default_l2_leaf_reg(),
            iterations: default_iterations(),
        }
    }
}

/// Base learner parameter sets of the stacking ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StackingParams {
    /// Cross-validation folds for the out-of-fold meta-features.
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "BoostingParams::gradient_boosting")]
    pub gradient_boosting: BoostingParams,
    #[serde(default = "BoostingParams::xgboost")]
    pub xgboost: BoostingParams,
    #[serde(default)]
    pub catboost: CatBoostParams,
}

fn default_folds() -> usize { 5 }

impl Default for StackingParams {
    fn default() -> Self {
        Self {
            folds: default_folds(),
            gradient_boosting: BoostingParams::gradient_boosting(),
            xgboost: BoostingParams::xgboost(),
            catboost: CatBoostParams::default(),
        }
    }
}

/// A regression strategy together with its own hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum ModelStrategy {
    Linear,
    DecisionTree(DecisionTreeParams),
    GradientBoosting(BoostingParams),
    #[serde(rename = "xgboost")]
    XGBoost(BoostingParams),
    #[serde(rename = "catboost")]
    CatBoost(CatBoostParams),
    Stacking(StackingParams),
}

impl ModelStrategy {
    /// Display name, as shown to the operator.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Linear => "Linear Regression",
            Self::DecisionTree(_) => "Decision Tree",
            Self::GradientBoosting(_) => "Gradient Boosting",
            Self::XGBoost(_) => "XGBoost",
            Self::CatBoost(_) => "CatBoost",
            Self::Stacking(_) => "Stacking",
        }
    }

    /// Display name with whitespace removed, used in export file names.
    pub fn file_stem(&self) -> String {
        self.display_name().split_whitespace().collect()
    }
}
