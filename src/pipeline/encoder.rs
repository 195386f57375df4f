//! Feature encoding: a scaler fitted on the training features only, plus an
//! optional lithology encoding whose categories come from the training rows.
//!
//! Encoded column order: scaled numeric features in table order, then the
//! lithology columns (`{column}_{code}` one-hot indicators in sorted code
//! order, or a single ordinal code column).

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::config::ScalingMethod;
use crate::error::{PipelineError, Result};
use crate::models::Matrix;
use crate::table::Table;

// ============================================================================
// Scaler
// ============================================================================

/// Per-column affine transform `(x - offset) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scaler {
    method: ScalingMethod,
    columns: Vec<String>,
    /// (offset, scale) per column; `None` until fitted
    params: Option<Vec<(f64, f64)>>,
}

impl Scaler {
    pub const fn new(method: ScalingMethod) -> Self {
        Self {
            method,
            columns: Vec::new(),
            params: None,
        }
    }

    pub const fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fit on the named numeric columns of `table`. Zero-spread columns get a
    /// scale of one.
    pub fn fit(&mut self, table: &Table, columns: &[&str]) -> Result<()> {
        let mut params = Vec::with_capacity(columns.len());
        for name in columns {
            let values: Vec<f64> = table.numeric(name)?.iter().copied().filter(|v| !v.is_nan()).collect();
            if values.is_empty() {
                return Err(PipelineError::EmptyDataset(format!(
                    "column '{name}' has no values to fit the scaler on"
                )));
            }
            let n = values.len() as f64;
            let (offset, spread) = match self.method {
                ScalingMethod::Standard => {
                    let mean = values.iter().sum::<f64>() / n;
                    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                    (mean, var.sqrt())
                }
                ScalingMethod::MinMax => {
                    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (min, max - min)
                }
            };
            params.push((offset, if spread > 0.0 { spread } else { 1.0 }));
        }
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self.params = Some(params);
        Ok(())
    }

    /// Transformed columns of `table`, using the fitted parameters.
    pub fn transform(&self, table: &Table) -> Result<Vec<Vec<f64>>> {
        let params = self.params.as_ref().ok_or(PipelineError::UnfittedScalerReuse)?;
        self.columns
            .iter()
            .zip(params)
            .map(|(name, &(offset, scale))| {
                Ok(table
                    .numeric(name)?
                    .iter()
                    .map(|v| (v - offset) / scale)
                    .collect())
            })
            .collect()
    }
}

// ============================================================================
// Lithology Encoding
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LithologyEncoding {
    /// One indicator column per training category
    OneHot { column: String, categories: Vec<String> },
    /// Index of the code in the sorted training categories
    Ordinal { column: String, categories: Vec<String> },
}

impl LithologyEncoding {
    fn fit(table: &Table, column: &str, one_hot: bool) -> Result<Self> {
        let data = &table.require(column)?.data;
        let categories: Vec<String> = (0..table.row_count())
            .filter_map(|r| data.category_at(r))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column = column.to_string();
        Ok(if one_hot {
            Self::OneHot { column, categories }
        } else {
            Self::Ordinal { column, categories }
        })
    }

    pub fn feature_names(&self) -> Vec<String> {
        match self {
            Self::OneHot { column, categories } => {
                categories.iter().map(|c| format!("{column}_{c}")).collect()
            }
            Self::Ordinal { column, .. } => vec![column.clone()],
        }
    }

    fn encode(&self, table: &Table) -> Result<Vec<Vec<f64>>> {
        let (column, categories) = match self {
            Self::OneHot { column, categories } | Self::Ordinal { column, categories } => {
                (column, categories)
            }
        };
        let data = &table
            .column(column)
            .ok_or_else(|| {
                PipelineError::CategoryMismatch(format!(
                    "{} has no lithology column '{column}'",
                    table.label
                ))
            })?
            .data;
        let n = table.row_count();

        match self {
            Self::OneHot { .. } => {
                let mut out = vec![vec![0.0; n]; categories.len()];
                for r in 0..n {
                    if let Some(code) = data.category_at(r) {
                        if let Ok(i) = categories.binary_search(&code) {
                            out[i][r] = 1.0;
                        }
                    }
                }
                Ok(out)
            }
            Self::Ordinal { .. } => {
                let mut codes = Vec::with_capacity(n);
                for r in 0..n {
                    let code = data.category_at(r);
                    let idx = code
                        .as_ref()
                        .and_then(|c| categories.binary_search(c).ok())
                        .ok_or_else(|| {
                            PipelineError::CategoryMismatch(format!(
                                "lithology code {} in {} was not seen in training",
                                code.as_deref().unwrap_or("<missing>"),
                                table.label
                            ))
                        })?;
                    codes.push(idx as f64);
                }
                Ok(vec![codes])
            }
        }
    }
}

// ============================================================================
// Feature Encoder
// ============================================================================

#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    scaling: ScalingMethod,
    lithology: Option<String>,
    one_hot: bool,
}

/// Encoded matrices with the fitted transforms.
#[derive(Debug, Clone)]
pub struct EncodedFeatures {
    pub train: Matrix,
    pub test: Matrix,
    pub full: Matrix,
    pub feature_names: Vec<String>,
    pub scaler: Scaler,
    pub lithology: Option<LithologyEncoding>,
}

impl FeatureEncoder {
    pub const fn new(scaling: ScalingMethod, lithology: Option<String>, one_hot: bool) -> Self {
        Self {
            scaling,
            lithology,
            one_hot,
        }
    }

    /// Fit on `train` and apply the same transform to all three tables.
    pub fn encode(&self, train: &Table, test: &Table, full: &Table) -> Result<EncodedFeatures> {
        let numeric: Vec<&str> = train
            .column_names()
            .into_iter()
            .filter(|c| Some(*c) != self.lithology.as_deref())
            .collect();

        let mut scaler = Scaler::new(self.scaling);
        scaler.fit(train, &numeric)?;

        let lithology = self
            .lithology
            .as_deref()
            .map(|column| LithologyEncoding::fit(train, column, self.one_hot))
            .transpose()?;

        let mut feature_names: Vec<String> = numeric.iter().map(|c| (*c).to_string()).collect();
        if let Some(enc) = &lithology {
            feature_names.extend(enc.feature_names());
        }

        let apply = |table: &Table| -> Result<Matrix> {
            let mut columns = scaler.transform(table)?;
            if let Some(enc) = &lithology {
                columns.extend(enc.encode(table)?);
            }
            Matrix::from_columns(table.row_count(), &columns)
                .map_err(|e| PipelineError::Parse(format!("encoding {}: {e}", table.label)))
        };
        let encoded = EncodedFeatures {
            train: apply(train)?,
            test: apply(test)?,
            full: apply(full)?,
            feature_names,
            scaler: scaler.clone(),
            lithology: lithology.clone(),
        };
        debug!(
            features = ?encoded.feature_names,
            train = encoded.train.rows(),
            test = encoded.test.rows(),
            full = encoded.full.rows(),
            "Features encoded"
        );
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn table(label: &str, gr: Vec<f64>, lith: &[&str]) -> Table {
        Table::from_columns(
            label,
            vec![
                Column::numeric("GR", gr),
                Column::categorical("LITH", lith.iter().map(|s| Some((*s).to_string())).collect()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_standard_scaler_zero_mean_unit_variance() {
        let train = table("train", vec![1.0, 2.0, 3.0, 4.0], &["a", "a", "b", "b"]);
        let mut scaler = Scaler::new(ScalingMethod::Standard);
        scaler.fit(&train, &["GR"]).unwrap();
        let cols = scaler.transform(&train).unwrap();
        let col = &cols[0];
        let mean = col.iter().sum::<f64>() / 4.0;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_shifted_input_shifts_output_without_refit() {
        let train = table("train", vec![1.0, 2.0, 3.0, 4.0], &["a"; 4]);
        let shifted = table("shifted", vec![11.0, 12.0, 13.0, 14.0], &["a"; 4]);
        let mut scaler = Scaler::new(ScalingMethod::Standard);
        scaler.fit(&train, &["GR"]).unwrap();
        let a = scaler.transform(&train).unwrap().remove(0);
        let b = scaler.transform(&shifted).unwrap().remove(0);
        let std = (1.25f64).sqrt();
        for (x, y) in a.iter().zip(&b) {
            assert!((y - x - 10.0 / std).abs() < 1e-12);
        }
    }

    #[test]
    fn test_min_max_range() {
        let train = table("train", vec![2.0, 4.0, 6.0], &["a"; 3]);
        let mut scaler = Scaler::new(ScalingMethod::MinMax);
        scaler.fit(&train, &["GR"]).unwrap();
        assert_eq!(scaler.transform(&train).unwrap()[0], vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_unfitted_scaler_is_rejected() {
        let t = table("train", vec![1.0], &["a"]);
        assert!(matches!(
            Scaler::new(ScalingMethod::Standard).transform(&t),
            Err(PipelineError::UnfittedScalerReuse)
        ));
    }

    #[test]
    fn test_one_hot_aligns_to_training_categories() {
        let train = table("train", vec![1.0, 2.0, 3.0], &["b", "a", "b"]);
        let test = table("test", vec![1.0], &["c"]);
        let full = table("full", vec![1.0, 2.0], &["a", "c"]);
        let enc = FeatureEncoder::new(ScalingMethod::Standard, Some("LITH".into()), true)
            .encode(&train, &test, &full)
            .unwrap();
        assert_eq!(enc.feature_names, vec!["GR", "LITH_a", "LITH_b"]);
        assert_eq!(enc.test.row(0)[1..], [0.0, 0.0], "unseen category encodes as zeros");
        assert_eq!(enc.full.row(0)[1..], [1.0, 0.0]);
        assert_eq!(enc.full.cols(), enc.train.cols());
    }

    #[test]
    fn test_ordinal_rejects_unseen_category() {
        let train = table("train", vec![1.0, 2.0], &["a", "b"]);
        let full = table("full", vec![1.0], &["z"]);
        let result = FeatureEncoder::new(ScalingMethod::Standard, Some("LITH".into()), false)
            .encode(&train, &train, &full);
        assert!(matches!(result, Err(PipelineError::CategoryMismatch(_))));
    }

    #[test]
    fn test_missing_lithology_in_full_is_category_mismatch() {
        let train = table("train", vec![1.0, 2.0], &["a", "b"]);
        let full = Table::from_columns("full", vec![Column::numeric("GR", vec![1.0])]).unwrap();
        let result = FeatureEncoder::new(ScalingMethod::Standard, Some("LITH".into()), true)
            .encode(&train, &train, &full);
        assert!(matches!(result, Err(PipelineError::CategoryMismatch(_))));
    }
}
