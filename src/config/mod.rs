//! Run Configuration Module
//!
//! Provides the prediction-run configuration loaded from TOML files: which
//! property to predict, column names, lithology handling, scaling, the
//! train/test split and the regression strategy with its hyperparameters.
//!
//! ## Loading Order
//!
//! 1. `PETROTHERM_CONFIG` environment variable (path to TOML file)
//! 2. `petrotherm.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The configuration is owned by the pipeline session rather than stored in
//! a global, so changing it always goes through an explicit session reset.

mod run_config;
pub mod validation;

pub use run_config::*;
