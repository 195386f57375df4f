//! Transverse conductivity from predicted anisotropy.
//!
//! Transverse conductivity is never predicted directly: with `K = axial /
//! transverse` predicted, `transverse = axial / K`. Axial values come from
//! one of two sources, aligned by depth onto the full interval:
//! predictions made earlier in the same session, or a prediction file from a
//! previous run whose last column holds the axial values whatever its header.

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::export::PredictionTable;
use crate::table::{ColumnData, Table};

use super::aligner::interpolate;

/// Where full-interval axial conductivity comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AxialSource {
    /// Axial predictions exported earlier in this session
    Session(PredictionTable),
    /// A previously exported prediction file (first column depth, last column value)
    Uploaded(Table),
}

impl AxialSource {
    /// (depth, value) pairs, sorted by depth, without missing values.
    fn samples(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let (depths, values): (&[f64], &[f64]) = match self {
            Self::Session(table) => (&table.depths, &table.values),
            Self::Uploaded(table) => {
                let columns = table.columns();
                if columns.len() < 2 {
                    return Err(PipelineError::Parse(format!(
                        "{} needs a depth column and a prediction column",
                        table.label
                    )));
                }
                (
                    numeric_values(&columns[0].data, "depth", &table.label)?,
                    numeric_values(&columns[columns.len() - 1].data, "prediction", &table.label)?,
                )
            }
        };

        let mut pairs: Vec<(f64, f64)> = depths
            .iter()
            .zip(values)
            .filter(|(d, v)| !d.is_nan() && !v.is_nan())
            .map(|(&d, &v)| (d, v))
            .collect();
        if pairs.is_empty() {
            return Err(PipelineError::MissingAxialPrediction);
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(pairs.into_iter().unzip())
    }

    /// Axial values at `depths`: exact where the depths coincide, linearly
    /// interpolated between them and clamped beyond the ends.
    pub fn values_at(&self, depths: &[f64]) -> Result<Vec<f64>> {
        let (xp, fp) = self.samples()?;
        debug!(samples = xp.len(), queries = depths.len(), "Aligning axial source by depth");
        Ok(interpolate(depths, &xp, &fp))
    }

    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Session(_) => "session axial predictions",
            Self::Uploaded(_) => "uploaded axial prediction file",
        }
    }
}

fn numeric_values<'a>(data: &'a ColumnData, what: &str, label: &str) -> Result<&'a [f64]> {
    match data {
        ColumnData::Numeric(v) => Ok(v),
        ColumnData::Categorical(_) => Err(PipelineError::Parse(format!(
            "{what} column of {label} is not numeric"
        ))),
    }
}

/// `axial / anisotropy`, element-wise.
pub fn transverse_conductivity(axial: &[f64], anisotropy: &[f64]) -> Vec<f64> {
    axial.iter().zip(anisotropy).map(|(a, k)| a / k).collect()
}

/// Resolves the axial values the anisotropy mode needs.
#[derive(Debug, Clone, Default)]
pub struct DerivedPropertyResolver {
    source: Option<AxialSource>,
}

impl DerivedPropertyResolver {
    pub const fn new(source: Option<AxialSource>) -> Self {
        Self { source }
    }

    pub const fn source(&self) -> Option<&AxialSource> {
        self.source.as_ref()
    }

    /// Full-interval axial values, or `MissingAxialPrediction` without a source.
    pub fn axial_at(&self, depths: &[f64]) -> Result<Vec<f64>> {
        let source = self.source.as_ref().ok_or(PipelineError::MissingAxialPrediction)?;
        info!(source = source.describe(), rows = depths.len(), "Resolving axial conductivity");
        source.values_at(depths)
    }

    /// Full-interval transverse conductivity from predicted anisotropy.
    pub fn transverse_at(&self, depths: &[f64], anisotropy: &[f64]) -> Result<Vec<f64>> {
        Ok(transverse_conductivity(&self.axial_at(depths)?, anisotropy))
    }
}
