//! Run Configuration - every operator choice of a prediction run as TOML
//!
//! Each struct implements `Default` with the interactive workflow's values,
//! so a run without a config file behaves like one with an empty file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::{BoostingParams, CatBoostParams, DecisionTreeParams, ModelStrategy, StackingParams};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "PETROTHERM_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "petrotherm.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one prediction run.
///
/// Load with `RunConfig::load()` which searches:
/// 1. `$PETROTHERM_CONFIG` env var
/// 2. `./petrotherm.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Prediction mode, depth column and feature selection
    #[serde(default)]
    pub run: RunSection,

    /// Lithology (rock type) handling
    #[serde(default)]
    pub lithology: LithologyConfig,

    /// Source column names of the measured properties
    #[serde(default)]
    pub columns: TargetColumns,

    /// Feature scaling
    #[serde(default)]
    pub scaling: ScalingConfig,

    /// Train/test split
    #[serde(default)]
    pub split: SplitConfig,

    /// Regression strategy and hyperparameters
    #[serde(default)]
    pub model: ModelConfig,

    /// Prediction export
    #[serde(default)]
    pub export: ExportConfig,
}

impl RunConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PETROTHERM_CONFIG` environment variable
    /// 2. `./petrotherm.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Defaults apply only when no config file exists. A file that fails to
    /// read, parse or validate is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_with(env_path.as_deref(), Path::new(LOCAL_CONFIG))
    }

    /// The search order of [`RunConfig::load`] with explicit candidate paths.
    pub fn load_with(env_path: Option<&Path>, local: &Path) -> Result<Self, ConfigError> {
        if let Some(p) = env_path {
            if p.exists() {
                let config = Self::load_from_file(p)?;
                info!(path = %p.display(), mode = ?config.run.mode, "Loaded run config from PETROTHERM_CONFIG");
                return Ok(config);
            }
            warn!(path = %p.display(), "PETROTHERM_CONFIG points to non-existent file, falling back");
        }

        if local.exists() {
            let config = Self::load_from_file(local)?;
            info!(path = %local.display(), mode = ?config.run.mode, "Loaded run config");
            return Ok(config);
        }

        info!("No petrotherm.toml found - using built-in defaults");
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys only produce warnings.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file (for `init-config`).
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Run config saved");
        Ok(())
    }

    /// The selected strategy with its own hyperparameter record.
    pub fn strategy(&self) -> ModelStrategy {
        let m = &self.model;
        match m.strategy {
            StrategyKind::Linear => ModelStrategy::Linear,
            StrategyKind::DecisionTree => ModelStrategy::DecisionTree(m.decision_tree),
            StrategyKind::GradientBoosting => ModelStrategy::GradientBoosting(m.gradient_boosting),
            StrategyKind::Xgboost => ModelStrategy::XGBoost(m.xgboost),
            StrategyKind::Catboost => ModelStrategy::CatBoost(m.catboost),
            StrategyKind::Stacking => ModelStrategy::Stacking(m.stacking),
        }
    }

    /// Validate hyperparameters and split settings.
    ///
    /// Rules:
    /// - Learning rates must lie in (0, 1]
    /// - Estimator and iteration counts must be >= 1
    /// - `min_samples_split` >= 2, `min_samples_leaf` >= 1
    /// - `l2_leaf_reg` must be finite and >= 0
    /// - `test_fraction` must lie strictly between 0 and 1
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let m = &self.model;

        let dt = &m.decision_tree;
        if dt.min_samples_split < 2 {
            errors.push(format!(
                "model.decision_tree.min_samples_split = {} must be >= 2",
                dt.min_samples_split
            ));
        }
        if dt.min_samples_leaf < 1 {
            errors.push("model.decision_tree.min_samples_leaf must be >= 1".to_string());
        }

        Self::check_boosting(&m.gradient_boosting, "model.gradient_boosting", &mut errors);
        Self::check_boosting(&m.xgboost, "model.xgboost", &mut errors);
        Self::check_catboost(&m.catboost, "model.catboost", &mut errors);

        let st = &m.stacking;
        Self::check_boosting(&st.gradient_boosting, "model.stacking.gradient_boosting", &mut errors);
        Self::check_boosting(&st.xgboost, "model.stacking.xgboost", &mut errors);
        Self::check_catboost(&st.catboost, "model.stacking.catboost", &mut errors);
        if st.folds < 2 {
            errors.push(format!("model.stacking.folds = {} must be >= 2", st.folds));
        }

        let tf = self.split.test_fraction;
        if !tf.is_finite() || tf <= 0.0 || tf >= 1.0 {
            errors.push(format!("split.test_fraction = {tf} must lie in (0, 1)"));
        }

        let (name_errors, name_warnings) = super::validation::validate_column_names(self);
        errors.extend(name_errors);
        for w in &name_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_learning_rate(rate: f64, name: &str, errors: &mut Vec<String>) {
        if !rate.is_finite() || rate <= 0.0 || rate > 1.0 {
            errors.push(format!("{name}.learning_rate = {rate} must lie in (0, 1]"));
        }
    }

    fn check_boosting(p: &BoostingParams, name: &str, errors: &mut Vec<String>) {
        Self::check_learning_rate(p.learning_rate, name, errors);
        if p.n_estimators < 1 {
            errors.push(format!("{name}.n_estimators must be >= 1"));
        }
    }

    fn check_catboost(p: &CatBoostParams, name: &str, errors: &mut Vec<String>) {
        Self::check_learning_rate(p.learning_rate, name, errors);
        if !p.l2_leaf_reg.is_finite() || p.l2_leaf_reg < 0.0 {
            errors.push(format!("{name}.l2_leaf_reg = {} must be >= 0", p.l2_leaf_reg));
        }
        if p.iterations < 1 {
            errors.push(format!("{name}.iterations must be >= 1"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            Self::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            Self::Serialize(e) => write!(f, "Config serialization error: {e}"),
            Self::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Run Section
// ============================================================================

/// Which thermal property a run predicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionMode {
    /// Axial (bedding-parallel) thermal conductivity
    #[default]
    Axial,
    /// Anisotropy ratio, followed by transverse conductivity recomputation
    Anisotropy,
    /// Volumetric heat capacity
    HeatCapacity,
}

/// A predicted or derived property, as named in exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    AxialConductivity,
    Anisotropy,
    TransverseConductivity,
    HeatCapacity,
}

impl Property {
    /// Short label used in column headers and file names.
    pub const fn label(self) -> &'static str {
        match self {
            Self::AxialConductivity => "TC_par",
            Self::Anisotropy => "K",
            Self::TransverseConductivity => "TC_per",
            Self::HeatCapacity => "VHC",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::AxialConductivity | Self::TransverseConductivity => "W/m/K",
            Self::Anisotropy => "c.u.",
            Self::HeatCapacity => "MJ/m^3/K",
        }
    }
}

impl PredictionMode {
    /// The property the model is trained on in this mode.
    pub const fn trained_property(self) -> Property {
        match self {
            Self::Axial => Property::AxialConductivity,
            Self::Anisotropy => Property::Anisotropy,
            Self::HeatCapacity => Property::HeatCapacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub mode: PredictionMode,

    /// Depth column name; must be identical in both uploaded tables
    #[serde(default = "default_depth_column")]
    pub depth_column: String,

    /// Well-log curves used as features; empty means every curve
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_depth_column() -> String {
    "DEPT".to_string()
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            mode: PredictionMode::default(),
            depth_column: default_depth_column(),
            features: Vec::new(),
        }
    }
}

// ============================================================================
// Lithology
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LithologyConfig {
    /// Use rock types for filtering, oversampling, stratification and as a feature
    #[serde(default)]
    pub enabled: bool,

    /// Lithology code column; must be identical in both uploaded tables
    #[serde(default = "default_lithology_column")]
    pub column: String,

    /// One-hot encode the code (otherwise appended as an ordinal feature)
    #[serde(default = "default_true")]
    pub one_hot: bool,
}

fn default_lithology_column() -> String {
    "Код Prime".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for LithologyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            column: default_lithology_column(),
            one_hot: true,
        }
    }
}

impl LithologyConfig {
    /// Column name when lithology usage is enabled.
    pub fn active_column(&self) -> Option<&str> {
        self.enabled.then_some(self.column.as_str())
    }
}

// ============================================================================
// Target Columns
// ============================================================================

/// Column names of the measured (upscaled) properties in the core table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetColumns {
    #[serde(default = "default_axial")]
    pub axial: String,
    #[serde(default = "default_anisotropy")]
    pub anisotropy: String,
    #[serde(default = "default_transverse")]
    pub transverse: String,
    #[serde(default = "default_heat_capacity")]
    pub heat_capacity: String,
}

fn default_axial() -> String { "TC_par_ups".to_string() }
fn default_anisotropy() -> String { "Anisotropy_ups".to_string() }
fn default_transverse() -> String { "TC_per_ups".to_string() }
fn default_heat_capacity() -> String { "VHC_ups".to_string() }

impl Default for TargetColumns {
    fn default() -> Self {
        Self {
            axial: default_axial(),
            anisotropy: default_anisotropy(),
            transverse: default_transverse(),
            heat_capacity: default_heat_capacity(),
        }
    }
}

// ============================================================================
// Scaling / Split
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingMethod {
    /// Subtract mean, divide by standard deviation
    #[default]
    Standard,
    /// Rescale to [0, 1]
    MinMax,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingConfig {
    #[serde(default)]
    pub method: ScalingMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_split_seed")]
    pub seed: u64,
}

fn default_test_fraction() -> f64 { 0.3 }
fn default_split_seed() -> u64 { 322 }

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_split_seed(),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Linear,
    DecisionTree,
    GradientBoosting,
    Xgboost,
    Catboost,
    Stacking,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Seed shared by every strategy
    #[serde(default = "default_model_seed")]
    pub seed: u64,

    #[serde(default)]
    pub decision_tree: DecisionTreeParams,

    #[serde(default = "BoostingParams::gradient_boosting")]
    pub gradient_boosting: BoostingParams,

    #[serde(default = "BoostingParams::xgboost")]
    pub xgboost: BoostingParams,

    #[serde(default)]
    pub catboost: CatBoostParams,

    #[serde(default)]
    pub stacking: StackingParams,
}

fn default_model_seed() -> u64 { 42 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            seed: default_model_seed(),
            decision_tree: DecisionTreeParams::default(),
            gradient_boosting: BoostingParams::gradient_boosting(),
            xgboost: BoostingParams::xgboost(),
            catboost: CatBoostParams::default(),
            stacking: StackingParams::default(),
        }
    }
}

// ============================================================================
// Export
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("predictions")
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: RunConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.run.mode, PredictionMode::Axial);
        assert_eq!(config.run.depth_column, "DEPT");
        assert_eq!(config.columns.axial, "TC_par_ups");
        assert_eq!(config.split.seed, 322);
        assert_eq!(config.model.seed, 42);
        assert_eq!(config.model.xgboost.max_depth, Some(7));
        assert_eq!(config.model.gradient_boosting.n_estimators, 200);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[run]
mode = "heat-capacity"
depth_column = "DEPTH"

[lithology]
enabled = true
column = "LITH"

[model]
strategy = "catboost"

[model.catboost]
depth = 0
iterations = 50
"#;
        let config = RunConfig::from_toml_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.run.mode, PredictionMode::HeatCapacity);
        assert_eq!(config.lithology.active_column(), Some("LITH"));
        assert!(config.lithology.one_hot);
        match config.strategy() {
            ModelStrategy::CatBoost(p) => {
                assert_eq!(p.depth, None);
                assert_eq!(p.iterations, 50);
                assert!((p.learning_rate - 0.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn test_validation_catches_bad_learning_rate() {
        let mut config = RunConfig::default();
        config.model.xgboost.learning_rate = 1.5;
        config.model.gradient_boosting.learning_rate = 0.0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("model.xgboost.learning_rate")));
                assert!(errors.iter().any(|e| e.contains("model.gradient_boosting.learning_rate")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_catches_small_split() {
        let mut config = RunConfig::default();
        config.model.decision_tree.min_samples_split = 1;
        config.split.test_fraction = 1.0;
        let result = config.validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_catches_negative_l2() {
        let mut config = RunConfig::default();
        config.model.stacking.catboost.l2_leaf_reg = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = RunConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped: RunConfig = toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original, roundtripped);
    }

    #[test]
    fn test_all_sections_serialize() {
        let toml_str = RunConfig::default().to_toml().expect("serialization should work");
        for section in ["[run]", "[lithology]", "[columns]", "[scaling]", "[split]", "[model]", "[model.catboost]", "[export]"] {
            assert!(toml_str.contains(section), "Missing {section} section");
        }
    }

    #[test]
    fn test_strategy_dispatch() {
        let mut config = RunConfig::default();
        assert_eq!(config.strategy(), ModelStrategy::Linear);
        config.model.strategy = StrategyKind::Xgboost;
        assert_eq!(config.strategy(), ModelStrategy::XGBoost(BoostingParams::xgboost()));
    }

    #[test]
    fn test_property_labels() {
        assert_eq!(PredictionMode::Axial.trained_property().label(), "TC_par");
        assert_eq!(PredictionMode::Anisotropy.trained_property().label(), "K");
        assert_eq!(PredictionMode::HeatCapacity.trained_property().label(), "VHC");
        assert_eq!(Property::TransverseConductivity.label(), "TC_per");
    }
}
