//! End-to-End Prediction Tests
//!
//! Drives a full session from in-memory tables through training and export,
//! then reads the exported files back through the ingest layer.

use petrotherm::config::{PredictionMode, Property, RunConfig, StrategyKind};
use petrotherm::ingest;
use petrotherm::pipeline::PipelineSession;
use petrotherm::table::{Column, Table};

/// 100 evenly spaced depths 0..99 with `GR = depth * 2`.
fn gr_logs() -> Table {
    let depth: Vec<f64> = (0..100).map(f64::from).collect();
    Table::from_columns(
        "well-log table",
        vec![
            Column::numeric("DEPT", depth.clone()),
            Column::numeric("GR", depth.iter().map(|d| d * 2.0).collect()),
        ],
    )
    .unwrap()
}

/// Core samples at 10, 30, 50, 70, 90 with `TC_par = 1..5`.
fn tc_core() -> Table {
    Table::from_columns(
        "core table",
        vec![
            Column::numeric("DEPT", vec![10.0, 30.0, 50.0, 70.0, 90.0]),
            Column::numeric("TC_par", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
        ],
    )
    .unwrap()
}

fn linear_axial_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.run.mode = PredictionMode::Axial;
    config.columns.axial = "TC_par".to_string();
    config.model.strategy = StrategyKind::Linear;
    config
}

/// Richer synthetic well for the tree and boosting strategies.
fn rich_logs() -> Table {
    let depth: Vec<f64> = (0..200).map(|i| 1000.0 + f64::from(i) * 0.5).collect();
    Table::from_columns(
        "well-log table",
        vec![
            Column::numeric("DEPT", depth.clone()),
            Column::numeric("GR", depth.iter().map(|d| 60.0 + 20.0 * (d * 0.07).sin()).collect()),
            Column::numeric("RHOB", depth.iter().map(|d| 2.3 + 0.1 * (d * 0.031).cos()).collect()),
        ],
    )
    .unwrap()
}

fn rich_core() -> Table {
    let depth: Vec<f64> = (0..60).map(|i| 1001.0 + f64::from(i) * 1.6).collect();
    let tc: Vec<f64> = depth
        .iter()
        .map(|d| 2.0 + 0.02 * (60.0 + 20.0 * (d * 0.07).sin()) + (2.3 + 0.1 * (d * 0.031).cos()))
        .collect();
    Table::from_columns(
        "core table",
        vec![Column::numeric("DEPT", depth), Column::numeric("TC_par_ups", tc)],
    )
    .unwrap()
}

#[test]
fn linear_gr_scenario_recovers_near_perfect_fit() {
    let mut session = PipelineSession::new(linear_axial_config());
    let outcome = session.run(gr_logs(), tc_core()).unwrap();

    assert_eq!(outcome.train_rows + outcome.test_rows, 5);
    assert_eq!(outcome.test_rows, 2, "ceil(0.3 * 5) test rows");
    let metrics = outcome.metrics_for(Property::AxialConductivity).unwrap();
    let r2 = metrics.r_squared.expect("test targets are not constant");
    assert!(r2 > 0.99, "R2 = {r2}");

    let predictions = outcome.predictions_for(Property::AxialConductivity).unwrap();
    assert_eq!(predictions.len(), 100);
    // TC_par = depth / 20 + 0.5 everywhere on the interval
    for (d, v) in predictions.depths.iter().zip(&predictions.values) {
        assert!((v - (d / 20.0 + 0.5)).abs() < 1e-6, "depth {d}: {v}");
    }
}

#[test]
fn export_writes_two_column_csv_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = PipelineSession::new(linear_axial_config());
    session.run(gr_logs(), tc_core()).unwrap();
    let written = session.export(dir.path()).unwrap();

    let csv_path = dir.path().join("LinearRegression_TC_par_false.csv");
    let report_path = dir.path().join("LinearRegression_axial_false_report.json");
    assert_eq!(written, vec![csv_path.clone(), report_path.clone()]);

    let exported = ingest::load_path(&csv_path).unwrap();
    assert_eq!(exported.column_names(), vec!["DEPT", "TC_par_pred"]);
    assert_eq!(exported.row_count(), 100);

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["mode"], "axial");
    assert_eq!(report["model"], "Linear Regression");
    assert_eq!(report["full_rows"], 100);
    assert_eq!(session.ledger().len(), 1);
}

#[test]
fn identical_runs_are_bit_identical() {
    for strategy in [
        StrategyKind::DecisionTree,
        StrategyKind::GradientBoosting,
        StrategyKind::Xgboost,
        StrategyKind::Catboost,
        StrategyKind::Stacking,
    ] {
        let mut config = RunConfig::default();
        config.model.strategy = strategy;
        config.model.catboost.iterations = 50;
        config.model.stacking.folds = 3;
        config.model.stacking.gradient_boosting.n_estimators = 10;
        config.model.stacking.xgboost.n_estimators = 10;
        config.model.stacking.catboost.iterations = 10;

        let run = || {
            let mut session = PipelineSession::new(config.clone());
            let outcome = session.run(rich_logs(), rich_core()).unwrap();
            outcome.predictions[0].values.clone()
        };
        let first = run();
        let second = run();
        assert_eq!(first.len(), 200);
        assert!(
            first.iter().zip(&second).all(|(a, b)| a.to_bits() == b.to_bits()),
            "{strategy:?} predictions differ between identical runs"
        );
    }
}

#[test]
fn stacking_reports_meta_features_per_base_learner() {
    let mut config = RunConfig::default();
    config.model.strategy = StrategyKind::Stacking;
    config.model.stacking.catboost.iterations = 50;
    config.model.stacking.gradient_boosting.n_estimators = 50;
    config.model.stacking.xgboost.n_estimators = 50;

    let mut session = PipelineSession::new(config);
    let outcome = session.run(rich_logs(), rich_core()).unwrap();
    let stacking = outcome.stacking.as_ref().expect("stacking diagnostics");
    assert_eq!(stacking.meta_feature_shape, (outcome.train_rows, 3));
    let names: Vec<&str> = stacking.base_learner_mse.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Gradient Boosting", "XGBoost", "CatBoost"]);
    assert!(stacking.stacked_mse.is_finite());
}

#[test]
fn constant_test_targets_leave_r2_undefined() {
    let core = Table::from_columns(
        "core table",
        vec![
            Column::numeric("DEPT", vec![10.0, 30.0, 50.0, 70.0, 90.0]),
            Column::numeric("TC_par", vec![5.0; 5]),
        ],
    )
    .unwrap();
    let mut session = PipelineSession::new(linear_axial_config());
    let outcome = session.run(gr_logs(), core).unwrap();
    let metrics = outcome.metrics_for(Property::AxialConductivity).unwrap();
    assert_eq!(metrics.r_squared, None);
    assert!(metrics.mse.is_finite());
    assert!(metrics.summary().contains("R2=undefined"));
}
