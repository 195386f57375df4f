//! Dataset assembly: column selection, null dropping, rare-lithology
//! replication and the seeded train/test split.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::table::Table;

/// Classes with at most this many rows are replicated before the split.
pub const RARE_CLASS_MAX: usize = 2;

/// Row count a rare class is replicated up to (at least).
pub const RARE_CLASS_TARGET: usize = RARE_CLASS_MAX + 1;

/// Which columns make up the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRequest {
    pub depth_column: String,
    /// Numeric feature columns, in order
    pub features: Vec<String>,
    pub target: String,
    /// Numeric columns carried alongside each split but never used as features
    pub carry: Vec<String>,
    /// Lithology column: replication, stratification and categorical feature
    pub lithology: Option<String>,
    pub test_fraction: f64,
    pub seed: u64,
}

/// One side of the split, row-aligned across all fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPart {
    /// Feature columns, plus the lithology column when enabled
    pub features: Table,
    pub target: Vec<f64>,
    pub depth: Vec<f64>,
    pub carried: Table,
}

impl SplitPart {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDataset {
    pub train: SplitPart,
    pub test: SplitPart,
    /// Rows after the null filter, before replication
    pub complete_rows: usize,
    /// Lithology codes that were replicated: code -> (rows before, rows after)
    pub replicated: BTreeMap<String, (usize, usize)>,
}

/// Number of test rows for `n` rows: `ceil(fraction * n)`, leaving at least
/// one training row.
pub fn test_size(n: usize, fraction: f64) -> usize {
    let raw = (fraction * n as f64).ceil() as usize;
    raw.clamp(1, n.saturating_sub(1).max(1))
}

/// Duplicate the rows of every class with at most `RARE_CLASS_MAX` members
/// until it has at least `RARE_CLASS_TARGET`.
///
/// Returns the row order (original rows first, copies appended) and the
/// replicated classes.
pub fn replicate_rare_classes(codes: &[String]) -> (Vec<usize>, BTreeMap<String, (usize, usize)>) {
    let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, code) in codes.iter().enumerate() {
        members.entry(code.as_str()).or_default().push(row);
    }

    let mut order: Vec<usize> = (0..codes.len()).collect();
    let mut replicated = BTreeMap::new();
    for (code, rows) in members {
        if rows.len() > RARE_CLASS_MAX {
            continue;
        }
        let mut copies = rows.clone();
        while copies.len() < RARE_CLASS_TARGET {
            copies.extend_from_within(..);
        }
        order.extend_from_slice(&copies[rows.len()..]);
        replicated.insert(code.to_string(), (rows.len(), copies.len()));
    }
    (order, replicated)
}

/// Seeded stratified split; returns (train, test) positions.
///
/// Each class is shuffled and contributes its share of `n_test` by largest
/// remainder, ties going to the class that sorts first.
pub fn stratified_split(codes: &[String], n_test: usize, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = codes.len();
    let mut classes: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, code) in codes.iter().enumerate() {
        classes.entry(code.as_str()).or_default().push(row);
    }

    let mut quotas: Vec<(usize, f64)> = classes
        .values()
        .map(|rows| {
            let exact = rows.len() as f64 * n_test as f64 / n as f64;
            (exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let assigned: usize = quotas.iter().map(|q| q.0).sum();
    let mut by_remainder: Vec<usize> = (0..quotas.len()).collect();
    by_remainder.sort_by(|&a, &b| quotas[b].1.total_cmp(&quotas[a].1).then(a.cmp(&b)));
    for &i in by_remainder.iter().take(n_test.saturating_sub(assigned)) {
        quotas[i].0 += 1;
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (mut rows, (quota, _)) in classes.into_values().zip(quotas) {
        rows.shuffle(&mut rng);
        let quota = quota.min(rows.len());
        test.extend_from_slice(&rows[..quota]);
        train.extend_from_slice(&rows[quota..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    (train, test)
}

/// Seeded unstratified split: the first `n_test` rows of a permutation are
/// the test set.
pub fn shuffle_split(n: usize, n_test: usize, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rows: Vec<usize> = (0..n).collect();
    rows.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = rows.split_off(n_test.min(n));
    (train, rows)
}

/// Assembles the supervised dataset from the aligned table.
#[derive(Debug, Clone)]
pub struct DatasetAssembler {
    request: AssemblyRequest,
}

impl DatasetAssembler {
    pub const fn new(request: AssemblyRequest) -> Self {
        Self { request }
    }

    pub const fn request(&self) -> &AssemblyRequest {
        &self.request
    }

    pub fn assemble(&self, aligned: &Table) -> Result<AssembledDataset> {
        let req = &self.request;

        let mut feature_cols: Vec<&str> = req
            .features
            .iter()
            .map(String::as_str)
            .filter(|f| *f != req.depth_column && *f != req.target)
            .collect();
        let mut seen = HashSet::new();
        feature_cols.retain(|f| seen.insert(*f));
        if let Some(lith) = &req.lithology {
            feature_cols.retain(|f| f != lith);
        }

        let mut wanted: Vec<&str> = vec![req.depth_column.as_str(), req.target.as_str()];
        for name in feature_cols.iter().copied().chain(req.carry.iter().map(String::as_str)) {
            if !wanted.contains(&name) {
                wanted.push(name);
            }
        }
        if let Some(lith) = &req.lithology {
            if !wanted.contains(&lith.as_str()) {
                wanted.push(lith);
            }
        }

        let selected = aligned.select_columns(&wanted)?;
        for name in feature_cols.iter().chain(&[req.depth_column.as_str(), req.target.as_str()]) {
            selected.numeric(name)?;
        }
        for name in &req.carry {
            selected.numeric(name)?;
        }

        let complete = selected.select_rows(&selected.complete_rows());
        if complete.row_count() == 0 {
            return Err(PipelineError::EmptyDataset(format!(
                "every row has a missing value in {}",
                wanted.join(", ")
            )));
        }
        let complete_rows = complete.row_count();
        debug!(selected = selected.row_count(), complete = complete_rows, "Incomplete rows dropped");

        let (dataset, codes, replicated) = match &req.lithology {
            Some(lith) => {
                let column = &complete.require(lith)?.data;
                let codes: Vec<String> = (0..complete_rows)
                    .map(|r| column.category_at(r).unwrap_or_default())
                    .collect();
                let (order, replicated) = replicate_rare_classes(&codes);
                for (code, (before, after)) in &replicated {
                    info!(lithology = %code, before, after, "Rare lithology class replicated");
                }
                let codes = order.iter().map(|&r| codes[r].clone()).collect::<Vec<_>>();
                (complete.select_rows(&order), Some(codes), replicated)
            }
            None => (complete, None, BTreeMap::new()),
        };

        let n = dataset.row_count();
        if n < 2 {
            return Err(PipelineError::EmptyDataset(format!(
                "{n} complete row(s); at least 2 are needed for a train/test split"
            )));
        }
        let n_test = test_size(n, req.test_fraction);
        let (train_rows, test_rows) = match &codes {
            Some(codes) => stratified_split(codes, n_test, req.seed),
            None => shuffle_split(n, n_test, req.seed),
        };

        let mut x_cols = feature_cols.clone();
        if let Some(lith) = &req.lithology {
            x_cols.push(lith);
        }
        let carry_cols: Vec<&str> = req.carry.iter().map(String::as_str).collect();
        let part = |rows: &[usize], label: &str| -> Result<SplitPart> {
            let t = dataset.select_rows(rows);
            Ok(SplitPart {
                features: t.select_columns(&x_cols)?.with_label(format!("{label} features")),
                target: t.numeric(&req.target)?.to_vec(),
                depth: t.numeric(&req.depth_column)?.to_vec(),
                carried: t.select_columns(&carry_cols)?.with_label(format!("{label} carried columns")),
            })
        };

        let assembled = AssembledDataset {
            train: part(&train_rows, "training")?,
            test: part(&test_rows, "test")?,
            complete_rows,
            replicated,
        };
        info!(
            rows = n,
            train = assembled.train.len(),
            test = assembled.test.len(),
            features = x_cols.len(),
            stratified = codes.is_some(),
            "Dataset assembled"
        );
        Ok(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn codes(counts: &[(&str, usize)]) -> Vec<String> {
        counts.iter()
            .flat_map(|(c, n)| std::iter::repeat((*c).to_string()).take(*n))
            .collect()
    }

    fn aligned() -> Table {
        let n = 12;
        Table::from_columns(
            "aligned dataset",
            vec![
                Column::numeric("DEPT", (0..n).map(f64::from).collect()),
                Column::numeric("TC", (0..n).map(|i| f64::from(i) * 0.1).collect()),
                Column::numeric(
                    "GR",
                    (0..n).map(|i| if i == 3 { f64::NAN } else { f64::from(i) }).collect(),
                ),
                Column::categorical(
                    "LITH",
                    (0..n)
                        .map(|i| Some(if i < 10 { "sand" } else { "shale" }.to_string()))
                        .collect(),
                ),
            ],
        )
        .unwrap()
    }

    fn request(lithology: Option<&str>) -> AssemblyRequest {
        AssemblyRequest {
            depth_column: "DEPT".into(),
            features: vec!["GR".into()],
            target: "TC".into(),
            carry: Vec::new(),
            lithology: lithology.map(Into::into),
            test_fraction: 0.3,
            seed: 322,
        }
    }

    #[test]
    fn test_test_size_rounds_up() {
        assert_eq!(test_size(10, 0.3), 3);
        assert_eq!(test_size(5, 0.3), 2);
        assert_eq!(test_size(2, 0.3), 1);
        assert_eq!(test_size(2, 0.9), 1, "at least one training row stays");
    }

    #[test]
    fn test_rare_classes_reach_three() {
        let c = codes(&[("a", 1), ("b", 2), ("c", 5)]);
        let (order, replicated) = replicate_rare_classes(&c);
        let count = |code: &str| order.iter().filter(|&&r| c[r] == code).count();
        assert!(count("a") >= 3);
        assert!(count("b") >= 3);
        assert_eq!(count("c"), 5, "common classes are untouched");
        assert_eq!(replicated.get("a"), Some(&(1, 4)));
        assert_eq!(replicated.get("b"), Some(&(2, 4)));
        assert_eq!(&order[..8], &[0, 1, 2, 3, 4, 5, 6, 7], "original rows come first");
    }

    #[test]
    fn test_stratified_split_keeps_every_class_in_train() {
        let c = codes(&[("a", 3), ("b", 7)]);
        let (train, test) = stratified_split(&c, 3, 322);
        assert_eq!(train.len() + test.len(), 10);
        assert_eq!(test.len(), 3);
        assert_eq!(test.iter().filter(|&&r| c[r] == "a").count(), 1);
        assert_eq!(test.iter().filter(|&&r| c[r] == "b").count(), 2);
    }

    #[test]
    fn test_shuffle_split_is_seeded() {
        assert_eq!(shuffle_split(20, 6, 1), shuffle_split(20, 6, 1));
        let (train, test) = shuffle_split(20, 6, 1);
        let mut all: Vec<usize> = train.into_iter().chain(test).collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_assemble_drops_nulls_and_aligns_rows() {
        let ds = DatasetAssembler::new(request(None)).assemble(&aligned()).unwrap();
        assert_eq!(ds.complete_rows, 11);
        assert_eq!(ds.train.len() + ds.test.len(), 11);
        assert_eq!(ds.test.len(), 4);
        for part in [&ds.train, &ds.test] {
            let gr = part.features.numeric("GR").unwrap();
            for i in 0..part.len() {
                assert_eq!(gr[i], part.depth[i], "GR equals depth row by row");
                assert!((part.target[i] - part.depth[i] * 0.1).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_repeated_feature_becomes_one_column() {
        let mut req = request(None);
        req.features = vec!["GR".into(), "DEPT".into(), "GR".into()];
        let ds = DatasetAssembler::new(req).assemble(&aligned()).unwrap();
        assert_eq!(ds.train.features.column_names(), vec!["GR"]);
        assert_eq!(ds.test.features.column_count(), 1);
    }

    #[test]
    fn test_assemble_with_lithology_replicates_and_stratifies() {
        let ds = DatasetAssembler::new(request(Some("LITH"))).assemble(&aligned()).unwrap();
        assert_eq!(ds.replicated.get("shale"), Some(&(2, 4)));
        assert_eq!(ds.train.len() + ds.test.len(), 13);
        assert!(ds.train.features.has_column("LITH"));
        let shale = |t: &Table| t.category_counts("LITH").unwrap().get("shale").copied().unwrap_or(0);
        assert!(shale(&ds.train.features) >= 1);
        assert!(shale(&ds.test.features) >= 1);
    }

    #[test]
    fn test_missing_feature_column() {
        let mut req = request(None);
        req.features.push("RHOB".into());
        assert!(matches!(
            DatasetAssembler::new(req).assemble(&aligned()),
            Err(PipelineError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_all_rows_dropped() {
        let table = Table::from_columns(
            "aligned dataset",
            vec![
                Column::numeric("DEPT", vec![1.0, 2.0]),
                Column::numeric("TC", vec![f64::NAN, f64::NAN]),
                Column::numeric("GR", vec![1.0, 2.0]),
            ],
        )
        .unwrap();
        assert!(matches!(
            DatasetAssembler::new(request(None)).assemble(&table),
            Err(PipelineError::EmptyDataset(_))
        ));
    }
}
