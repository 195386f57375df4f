//! Depth alignment of well-log curves onto the core-measurement depths.
//!
//! Core rows outside the well-log depth span are dropped first. Each curve is
//! then restricted to samples within the remaining core depth range and
//! linearly interpolated at every core depth. Queries beyond the first or last
//! sample take that sample's value (boundary clamping), for every curve alike.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::table::{Column, ColumnData, Table};

/// Piecewise-linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be sorted ascending and non-empty. Values outside `xp` clamp to
/// the nearest end.
pub fn interpolate(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter().map(|&q| interpolate_one(q, xp, fp)).collect()
}

fn interpolate_one(q: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let last = xp.len() - 1;
    if q.is_nan() {
        return f64::NAN;
    }
    if q <= xp[0] {
        return fp[0];
    }
    if q >= xp[last] {
        return fp[last];
    }
    // first index with xp[i] > q; 1 <= hi <= last
    let hi = xp.partition_point(|&v| v <= q);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span == 0.0 {
        return fp[hi];
    }
    fp[lo] + (fp[hi] - fp[lo]) * (q - xp[lo]) / span
}

/// Per-code row counts around the lithology filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LithologySummary {
    pub column: String,
    pub core_counts: BTreeMap<String, usize>,
    pub log_counts_before: BTreeMap<String, usize>,
    pub log_counts_after: BTreeMap<String, usize>,
    pub log_rows_before: usize,
    pub log_rows_after: usize,
}

/// Remove well-log rows whose lithology code never occurs in the core table.
pub fn filter_lithology(logs: &Table, core: &Table, column: &str) -> Result<(Table, LithologySummary)> {
    let core_counts = core.category_counts(column)?;
    let log_counts_before = logs.category_counts(column)?;
    let known: BTreeSet<&String> = core_counts.keys().collect();

    let codes = &logs.require(column)?.data;
    let filtered = logs.filter_rows(|r| codes.category_at(r).is_some_and(|c| known.contains(&c)));
    let log_counts_after = filtered.category_counts(column)?;

    info!(
        column,
        rows_before = logs.row_count(),
        rows_after = filtered.row_count(),
        cols = logs.column_count(),
        "Well-log table filtered by core lithology codes"
    );
    if filtered.row_count() == 0 {
        return Err(PipelineError::EmptyDataset(format!(
            "no well-log rows carry a lithology code found in the core table ('{column}')"
        )));
    }

    let summary = LithologySummary {
        column: column.to_string(),
        core_counts,
        log_counts_before,
        log_counts_after,
        log_rows_before: logs.row_count(),
        log_rows_after: filtered.row_count(),
    };
    Ok((filtered, summary))
}

/// Interpolates well-log curves onto the core depth grid.
#[derive(Debug, Clone)]
pub struct DepthAligner {
    depth_column: String,
    /// Well-log columns never interpolated (the lithology code)
    skip: Vec<String>,
}

impl DepthAligner {
    pub fn new(depth_column: impl Into<String>) -> Self {
        Self {
            depth_column: depth_column.into(),
            skip: Vec::new(),
        }
    }

    #[must_use]
    pub fn skipping(mut self, column: impl Into<String>) -> Self {
        self.skip.push(column.into());
        self
    }

    /// Numeric well-log curves that will be interpolated, in table order.
    pub fn curve_names<'a>(&self, logs: &'a Table) -> Vec<&'a str> {
        logs.columns()
            .iter()
            .filter(|c| c.name != self.depth_column && !self.skip.contains(&c.name))
            .filter(|c| matches!(c.data, ColumnData::Numeric(_)))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// The aligned dataset: every core column of the in-range core rows,
    /// followed by one interpolated column per well-log curve.
    pub fn align(&self, logs: &Table, core: &Table) -> Result<Table> {
        let depth = self.depth_column.as_str();
        let log_depth = logs.numeric(depth)?;
        let (log_min, log_max) = logs.numeric_range(depth)?.ok_or_else(|| {
            PipelineError::EmptyDataset(format!("{} has no depth values", logs.label))
        })?;

        let core_depth = core.numeric(depth)?;
        let in_range = core.filter_rows(|r| {
            let d = core_depth[r];
            d >= log_min && d <= log_max
        });
        if in_range.row_count() < core.row_count() {
            info!(
                dropped = core.row_count() - in_range.row_count(),
                log_min,
                log_max,
                "Core rows outside the well-log depth span dropped"
            );
        }
        let (core_min, core_max) = in_range.numeric_range(depth)?.ok_or_else(|| {
            PipelineError::EmptyDataset(format!(
                "no core depths lie within the well-log depth span [{log_min}, {log_max}]"
            ))
        })?;
        let targets = in_range.numeric(depth)?.to_vec();

        for column in logs.columns() {
            if column.name != depth
                && !self.skip.contains(&column.name)
                && matches!(column.data, ColumnData::Categorical(_))
            {
                warn!(curve = %column.name, "Non-numeric well-log column is not interpolated");
            }
        }

        let curves = self.curve_names(logs);
        let interpolated: Vec<Column> = curves
            .par_iter()
            .map(|&name| -> Result<Column> {
                let values = logs.numeric(name)?;
                let mut samples: Vec<(f64, f64)> = log_depth
                    .iter()
                    .zip(values)
                    .filter(|(d, v)| !d.is_nan() && !v.is_nan() && **d >= core_min && **d <= core_max)
                    .map(|(&d, &v)| (d, v))
                    .collect();
                if samples.len() < 2 {
                    return Err(PipelineError::InsufficientSamples {
                        curve: name.to_string(),
                        found: samples.len(),
                    });
                }
                samples.sort_by(|a, b| a.0.total_cmp(&b.0));
                let (xp, fp): (Vec<f64>, Vec<f64>) = samples.into_iter().unzip();
                Ok(Column::numeric(name, interpolate(&targets, &xp, &fp)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut aligned = in_range.with_label("aligned dataset");
        for column in interpolated {
            if aligned.has_column(&column.name) {
                warn!(column = %column.name, "Curve name also present in core table; keeping core values");
                continue;
            }
            aligned.push_column(column)?;
        }

        debug!(
            rows = aligned.row_count(),
            cols = aligned.column_count(),
            curves = curves.len(),
            "Depth alignment complete"
        );
        Ok(aligned)
    }
}
