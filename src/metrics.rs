//! Regression metrics: MSE, RMSE, MAE, MAD and R².
//!
//! MAD is the median of the absolute prediction errors, not the deviation
//! from the mean. R² is undefined for a constant target; it is reported as
//! `None` so the other four metrics still render.

use serde::Serialize;
use statrs::statistics::{Data, Median};

use crate::config::Property;
use crate::error::{ModelError, PipelineError, Result};

/// Mean squared error; `NaN` for empty input.
pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return f64::NAN;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsReport {
    pub samples: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mad: f64,
    /// `None` when the target is constant
    pub r_squared: Option<f64>,
}

impl MetricsReport {
    /// Compute every metric for equally long `y_true` and `y_pred`.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> std::result::Result<Self, ModelError> {
        if y_true.is_empty() {
            return Err(ModelError::EmptyInput);
        }
        if y_true.len() != y_pred.len() {
            return Err(ModelError::LengthMismatch {
                rows: y_pred.len(),
                targets: y_true.len(),
            });
        }

        let n = y_true.len() as f64;
        let abs_err: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).collect();
        let mse = mean_squared_error(y_true, y_pred);
        let mae = abs_err.iter().sum::<f64>() / n;
        let mad = Data::new(abs_err).median();

        let y_mean = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - y_mean).powi(2)).sum();
        let ss_res = mse * n;
        let r_squared = (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot);

        Ok(Self {
            samples: y_true.len(),
            mse,
            rmse: mse.sqrt(),
            mae,
            mad,
            r_squared,
        })
    }

    /// R², failing with `DegenerateTarget` when it is undefined.
    pub fn r_squared_checked(&self) -> Result<f64> {
        self.r_squared.ok_or(PipelineError::DegenerateTarget)
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        let r2 = self
            .r_squared
            .map_or_else(|| "undefined".to_string(), |r| format!("{r:.4}"));
        format!(
            "MSE={:.4} RMSE={:.4} MAE={:.4} MAD={:.4} R2={r2}",
            self.mse, self.rmse, self.mae, self.mad
        )
    }
}

/// Test-set metrics of one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyMetrics {
    pub property: Property,
    pub metrics: MetricsReport,
}
