//! Ordinary least squares with intercept.
//!
//! Solved on centred data through the normal equations and a Cholesky
//! factorisation. A vanishing ridge term keeps the system positive definite
//! when columns are collinear (one-hot lithology columns always sum to one).

use super::{check_features, check_training_data, mean, FittedModel, Matrix, Regressor};
use crate::error::ModelError;

/// Relative ridge added to the diagonal of `XᵀX`.
const RIDGE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegressor;

#[derive(Debug, Clone, PartialEq)]
pub struct FittedLinear {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearRegressor {
    pub fn fit_linear(&self, x: &Matrix, y: &[f64]) -> Result<FittedLinear, ModelError> {
        check_training_data(x, y)?;
        let (n, p) = (x.rows(), x.cols());

        let x_mean: Vec<f64> = (0..p).map(|c| mean(&x.column(c))).collect();
        let y_mean = mean(y);

        let mut xtx = vec![0.0; p * p];
        let mut xty = vec![0.0; p];
        for r in 0..n {
            let row = x.row(r);
            let dy = y[r] - y_mean;
            for i in 0..p {
                let di = row[i] - x_mean[i];
                xty[i] += di * dy;
                for j in 0..=i {
                    xtx[i * p + j] += di * (row[j] - x_mean[j]);
                }
            }
        }

        let trace: f64 = (0..p).map(|i| xtx[i * p + i]).sum();
        let ridge = RIDGE * (trace / p.max(1) as f64).max(1.0);
        for i in 0..p {
            xtx[i * p + i] += ridge;
        }

        let coefficients = cholesky_solve(&mut xtx, &xty, p)?;
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&x_mean)
                .map(|(b, m)| b * m)
                .sum::<f64>();

        Ok(FittedLinear {
            intercept,
            coefficients,
        })
    }
}

impl Regressor for LinearRegressor {
    fn name(&self) -> &'static str {
        "Linear Regression"
    }

    fn fit(&self, x: &Matrix, y: &[f64]) -> Result<Box<dyn FittedModel>, ModelError> {
        Ok(Box::new(self.fit_linear(x, y)?))
    }
}

impl FittedModel for FittedLinear {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>, ModelError> {
        check_features(self.coefficients.len(), x)?;
        Ok((0..x.rows())
            .map(|r| {
                self.intercept
                    + x.row(r)
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(v, b)| v * b)
                        .sum::<f64>()
            })
            .collect())
    }
}

/// Solve `A b = rhs` for symmetric positive definite `A`, whose lower
/// triangle is stored row-major in `a`. `a` is overwritten with the factor.
fn cholesky_solve(a: &mut [f64], rhs: &[f64], p: usize) -> Result<Vec<f64>, ModelError> {
    for j in 0..p {
        let mut d = a[j * p + j];
        for k in 0..j {
            d -= a[j * p + k] * a[j * p + k];
        }
        if !(d > 0.0) || !d.is_finite() {
            return Err(ModelError::Singular);
        }
        let d = d.sqrt();
        a[j * p + j] = d;
        for i in (j + 1)..p {
            let mut s = a[i * p + j];
            for k in 0..j {
                s -= a[i * p + k] * a[j * p + k];
            }
            a[i * p + j] = s / d;
        }
    }

    // Forward: L z = rhs
    let mut z = vec![0.0; p];
    for i in 0..p {
        let mut s = rhs[i];
        for k in 0..i {
            s -= a[i * p + k] * z[k];
        }
        z[i] = s / a[i * p + i];
    }
    // Backward: Lᵀ b = z
    let mut b = vec![0.0; p];
    for i in (0..p).rev() {
        let mut s = z[i];
        for k in (i + 1)..p {
            s -= a[k * p + i] * b[k];
        }
        b[i] = s / a[i * p + i];
    }
    Ok(b)
}
