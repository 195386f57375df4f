//! Column-oriented tables for well-log and core-measurement data.
//!
//! Numeric columns store `f64` with `NaN` marking a missing cell. Columns with
//! any non-numeric text are categorical. Lithology codes are compared through
//! their canonical string form so that `3`, `3.0` and `"3"` all match.

use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};

/// Values of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the cell at `row` is missing.
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Numeric(v) => v.get(row).map_or(true, |x| x.is_nan()),
            Self::Categorical(v) => v.get(row).map_or(true, Option::is_none),
        }
    }

    /// Canonical categorical key of a cell, `None` when missing.
    pub fn category_at(&self, row: usize) -> Option<String> {
        match self {
            Self::Numeric(v) => v.get(row).copied().and_then(canonical_code),
            Self::Categorical(v) => v.get(row).cloned().flatten().map(|s| s.trim().to_string()),
        }
    }

    fn select(&self, rows: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(rows.iter().map(|&r| v[r]).collect()),
            Self::Categorical(v) => Self::Categorical(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric",
            Self::Categorical(_) => "categorical",
        }
    }
}

/// Render a numeric lithology code without a trailing `.0`.
pub fn canonical_code(value: f64) -> Option<String> {
    if value.is_nan() {
        None
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        Some(format!("{}", value as i64))
    } else {
        Some(format!("{value}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }
}

/// A named-column table. All columns share the same row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Human-readable label used in error messages ("well-log table", ...).
    pub label: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            columns: Vec::new(),
        }
    }

    pub fn from_columns(label: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::new(label);
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column, failing with `MissingColumn`.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| PipelineError::missing_column(name, &self.label))
    }

    /// Look up a numeric column. Categorical columns whose cells all parse as
    /// numbers are not expected here because ingest already types them.
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match &self.require(name)?.data {
            ColumnData::Numeric(v) => Ok(v),
            ColumnData::Categorical(_) => Err(PipelineError::Parse(format!(
                "column '{name}' in {} is not numeric",
                self.label
            ))),
        }
    }

    /// Append a column; its length must match the existing rows.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.data.len() != self.row_count() {
            return Err(PipelineError::Parse(format!(
                "column '{}' has {} rows, {} expects {}",
                column.name,
                column.data.len(),
                self.label,
                self.row_count()
            )));
        }
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == column.name) {
            *existing = column;
        } else {
            self.columns.push(column);
        }
        Ok(())
    }

    /// New table holding the given rows, in the given order (duplicates allowed).
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            label: self.label.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.select(rows),
                })
                .collect(),
        }
    }

    /// New table holding only the named columns, in the given order.
    pub fn select_columns(&self, names: &[&str]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            columns.push(self.require(name)?.clone());
        }
        Ok(Self {
            label: self.label.clone(),
            columns,
        })
    }

    pub fn filter_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.row_count()).filter(|&r| keep(r)).collect();
        self.select_rows(&rows)
    }

    /// Rows where every column has a value.
    pub fn complete_rows(&self) -> Vec<usize> {
        (0..self.row_count())
            .filter(|&r| self.columns.iter().all(|c| !c.data.is_missing(r)))
            .collect()
    }

    /// Count of rows per canonical category of `name`; missing cells are skipped.
    pub fn category_counts(&self, name: &str) -> Result<BTreeMap<String, usize>> {
        let column = self.require(name)?;
        let mut counts = BTreeMap::new();
        for row in 0..self.row_count() {
            if let Some(code) = column.data.category_at(row) {
                *counts.entry(code).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// (min, max) over the non-missing values of a numeric column.
    pub fn numeric_range(&self, name: &str) -> Result<Option<(f64, f64)>> {
        let values = self.numeric(name)?;
        Ok(values
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            }))
    }
}
