//! Config Validation Tests
//!
//! Typo detection on raw TOML and range validation of parsed run
//! configurations, exercised independently from the pipeline.

use petrotherm::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use petrotherm::config::{ConfigError, PredictionMode, RunConfig, ScalingMethod};
use petrotherm::models::ModelStrategy;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_strategy_key_warns_with_suggestion() {
    let toml_str = r#"
[model]
stratgy = "xgboost"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("stratgy"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("model.strategy"));
}

#[test]
fn typo_in_nested_catboost_key_warns() {
    let toml_str = r#"
[model.catboost]
l2_leaf_regg = 3.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("model.catboost.l2_leaf_reg"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[run]
mode = "anisotropy"
depth_column = "DEPT"
features = ["GR", "RHOB", "NPHI"]

[lithology]
enabled = true
column = "Код Prime"
one_hot = false

[columns]
axial = "TC_par_ups"
anisotropy = "Anisotropy_ups"
transverse = "TC_per_ups"

[scaling]
method = "min-max"

[split]
test_fraction = 0.25
seed = 7

[model]
strategy = "stacking"

[model.stacking]
folds = 4

[model.stacking.xgboost]
max_depth = 5

[export]
output_dir = "out"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

    let config = RunConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.run.mode, PredictionMode::Anisotropy);
    assert_eq!(config.scaling.method, ScalingMethod::MinMax);
    assert_eq!(config.lithology.active_column(), Some("Код Prime"));
    match config.strategy() {
        ModelStrategy::Stacking(p) => {
            assert_eq!(p.folds, 4);
            assert_eq!(p.xgboost.max_depth, Some(5));
            assert_eq!(p.gradient_boosting.n_estimators, 200);
        }
        other => panic!("unexpected strategy {other:?}"),
    }
}

#[test]
fn unknown_keys_are_not_fatal() {
    let config = RunConfig::from_toml_str("[split]\nsede = 3\n").unwrap();
    assert_eq!(config.split.seed, 322, "defaults survive an unknown key");
}

#[test]
fn wildly_wrong_key_has_no_suggestion() {
    let known = known_config_keys();
    assert_eq!(suggest_correction("completely_unrelated_setting", &known), None);
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn out_of_range_values_are_collected_together() {
    let toml_str = r#"
[split]
test_fraction = 1.5

[model.gradient_boosting]
learning_rate = 2.0

[model.decision_tree]
min_samples_split = 1
"#;
    match RunConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.len(), 3, "errors: {errors:?}");
            assert!(errors.iter().any(|e| e.contains("split.test_fraction")));
            assert!(errors.iter().any(|e| e.contains("model.gradient_boosting.learning_rate")));
            assert!(errors.iter().any(|e| e.contains("min_samples_split")));
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
}

#[test]
fn stacking_needs_two_folds() {
    let result = RunConfig::from_toml_str("[model.stacking]\nfolds = 1\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn empty_lithology_column_rejected_when_enabled() {
    let result = RunConfig::from_toml_str("[lithology]\nenabled = true\ncolumn = \"\"\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn malformed_toml_is_parse_error() {
    let result = RunConfig::from_toml_str("[model\nstrategy = ");
    assert!(matches!(result, Err(ConfigError::Parse(..))));
}

#[test]
fn init_config_roundtrip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("petrotherm.toml");
    RunConfig::default().save_to_file(&path).unwrap();
    let loaded = RunConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, RunConfig::default());
}

// ============================================================================
// Search Order
// ============================================================================

#[test]
fn invalid_config_file_is_an_error_not_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("petrotherm.toml");
    std::fs::write(
        &path,
        "[model]\nstrategy = \"stacking\"\n\n[model.stacking]\nfolds = 1\n",
    )
    .unwrap();

    let from_env = RunConfig::load_with(Some(&path), &dir.path().join("absent.toml"));
    assert!(matches!(from_env, Err(ConfigError::Validation(_))));
    let from_local = RunConfig::load_with(None, &path);
    assert!(matches!(from_local, Err(ConfigError::Validation(_))));
}

#[test]
fn unparseable_local_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("petrotherm.toml");
    std::fs::write(&path, "[model\nstrategy = ").unwrap();
    assert!(matches!(RunConfig::load_with(None, &path), Err(ConfigError::Parse(..))));
}

#[test]
fn defaults_only_when_no_file_exists() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let config = RunConfig::load_with(Some(&missing), &dir.path().join("petrotherm.toml")).unwrap();
    assert_eq!(config, RunConfig::default());
}

#[test]
fn env_config_takes_priority_over_local() {
    let dir = tempfile::tempdir().unwrap();
    let env = dir.path().join("env.toml");
    let local = dir.path().join("petrotherm.toml");
    std::fs::write(&env, "[model]\nstrategy = \"stacking\"\n").unwrap();
    std::fs::write(&local, "[model]\nstrategy = \"xgboost\"\n").unwrap();
    let config = RunConfig::load_with(Some(&env), &local).unwrap();
    assert!(matches!(config.strategy(), ModelStrategy::Stacking(_)));
}
