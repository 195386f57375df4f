//! Boosting over oblivious trees in the CatBoost formulation.
//!
//! An oblivious tree applies the same `(feature, border)` test at every node
//! of a level, so a tree of depth `d` is just `d` tests and `2^d` leaf values;
//! a sample's leaf index is the bit pattern of its test outcomes. Borders are
//! quantised per feature before training (at most `MAX_BORDERS`). Each level
//! picks the test maximising `Σ_leaves S²/(n + l2_leaf_reg)` over the split
//! leaves; growth stops early when no test improves the score.

use tracing::debug;

use super::{check_features, check_training_data, mean, FittedModel, Matrix, Regressor};
use crate::error::ModelError;
use crate::models::CatBoostParams;

/// Border count per feature (CatBoost's `border_count` default).
pub const MAX_BORDERS: usize = 254;

/// Depth used when the configured depth is unlimited (CatBoost's default).
pub const DEFAULT_DEPTH: usize = 6;

/// Hard ceiling on tree depth; `2^depth` leaves are allocated per tree.
pub const MAX_DEPTH: usize = 16;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct CatBoostRegressor {
    params: CatBoostParams,
    seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObliviousTree {
    /// (feature, border) per level; a sample goes right when `value > border`
    splits: Vec<(usize, f64)>,
    leaves: Vec<f64>,
}

impl ObliviousTree {
    fn leaf_index(&self, row: &[f64]) -> usize {
        self.splits
            .iter()
            .fold(0, |idx, &(f, border)| (idx << 1) | usize::from(row[f] > border))
    }

    pub fn depth(&self) -> usize {
        self.splits.len()
    }
}

#[derive(Debug, Clone)]
pub struct FittedCatBoost {
    base: f64,
    trees: Vec<ObliviousTree>,
    n_features: usize,
}

impl FittedCatBoost {
    pub fn trees(&self) -> &[ObliviousTree] {
        &self.trees
    }
}

impl FittedModel for FittedCatBoost {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>, ModelError> {
        check_features(self.n_features, x)?;
        Ok((0..x.rows())
            .map(|r| {
                let row = x.row(r);
                self.base
                    + self
                        .trees
                        .iter()
                        .map(|t| t.leaves[t.leaf_index(row)])
                        .sum::<f64>()
            })
            .collect())
    }
}

/// Candidate borders of one feature: midpoints between consecutive distinct
/// finite values, thinned evenly to at most `MAX_BORDERS`.
fn feature_borders(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    let mids: Vec<f64> = sorted.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect();
    if mids.len() <= MAX_BORDERS {
        return mids;
    }
    (0..MAX_BORDERS)
        .map(|i| mids[(i * mids.len() + mids.len() / 2) / MAX_BORDERS])
        .collect()
}

impl CatBoostRegressor {
    pub const fn new(params: CatBoostParams, seed: u64) -> Self {
        Self { params, seed }
    }

    fn depth(&self) -> usize {
        self.params.depth.unwrap_or(DEFAULT_DEPTH).min(MAX_DEPTH)
    }

    fn term(&self, sum: f64, count: usize) -> f64 {
        if count == 0 {
            0.0
        } else {
            sum * sum / (count as f64 + self.params.l2_leaf_reg)
        }
    }

    /// Grow one oblivious tree on the residuals.
    fn grow(
        &self,
        x: &Matrix,
        residuals: &[f64],
        borders: &[Vec<f64>],
        sorted_rows: &[Vec<usize>],
    ) -> ObliviousTree {
        let n = residuals.len();
        let mut leaf_of = vec![0usize; n];
        let mut splits: Vec<(usize, f64)> = Vec::new();

        for _ in 0..self.depth() {
            let n_leaves = 1usize << splits.len();
            let mut sums = vec![0.0; n_leaves];
            let mut counts = vec![0usize; n_leaves];
            for r in 0..n {
                sums[leaf_of[r]] += residuals[r];
                counts[leaf_of[r]] += 1;
            }
            let base_score: f64 = (0..n_leaves).map(|l| self.term(sums[l], counts[l])).sum();

            let mut best: Option<(usize, f64, f64)> = None;
            for (feature, feature_borders) in borders.iter().enumerate() {
                // every row starts on the right; rows cross left as the border rises
                let mut left_sums = vec![0.0; n_leaves];
                let mut left_counts = vec![0usize; n_leaves];
                let mut score = base_score;
                let order = &sorted_rows[feature];
                let mut p = 0;
                for &border in feature_borders {
                    while p < order.len() && x.get(order[p], feature) <= border {
                        let r = order[p];
                        let l = leaf_of[r];
                        score -= self.term(left_sums[l], left_counts[l])
                            + self.term(sums[l] - left_sums[l], counts[l] - left_counts[l]);
                        left_sums[l] += residuals[r];
                        left_counts[l] += 1;
                        score += self.term(left_sums[l], left_counts[l])
                            + self.term(sums[l] - left_sums[l], counts[l] - left_counts[l]);
                        p += 1;
                    }
                    if score - base_score > MIN_GAIN && best.map_or(true, |(_, _, s)| score > s) {
                        best = Some((feature, border, score));
                    }
                }
            }

            let Some((feature, border, _)) = best else {
                break;
            };
            for r in 0..n {
                leaf_of[r] = (leaf_of[r] << 1) | usize::from(x.get(r, feature) > border);
            }
            splits.push((feature, border));
        }

        let n_leaves = 1usize << splits.len();
        let mut sums = vec![0.0; n_leaves];
        let mut counts = vec![0usize; n_leaves];
        for r in 0..n {
            sums[leaf_of[r]] += residuals[r];
            counts[leaf_of[r]] += 1;
        }
        let leaves = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| {
                if c == 0 {
                    0.0
                } else {
                    self.params.learning_rate * s / (c as f64 + self.params.l2_leaf_reg)
                }
            })
            .collect();

        ObliviousTree { splits, leaves }
    }
}

impl Regressor for CatBoostRegressor {
    fn name(&self) -> &'static str {
        "CatBoost"
    }

    fn fit(&self, x: &Matrix, y: &[f64]) -> Result<Box<dyn FittedModel>, ModelError> {
        check_training_data(x, y)?;
        let p = &self.params;
        if !(p.learning_rate > 0.0 && p.learning_rate <= 1.0) {
            return Err(ModelError::InvalidParameter(format!(
                "learning_rate {} outside (0, 1]",
                p.learning_rate
            )));
        }
        if !(p.l2_leaf_reg >= 0.0) || p.iterations == 0 {
            return Err(ModelError::InvalidParameter(
                "catboost needs l2_leaf_reg >= 0 and iterations >= 1".to_string(),
            ));
        }

        let borders: Vec<Vec<f64>> = (0..x.cols()).map(|c| feature_borders(&x.column(c))).collect();
        let sorted_rows: Vec<Vec<usize>> = (0..x.cols())
            .map(|c| {
                let mut rows: Vec<usize> = (0..x.rows()).filter(|&r| x.get(r, c).is_finite()).collect();
                rows.sort_by(|&a, &b| x.get(a, c).total_cmp(&x.get(b, c)));
                rows
            })
            .collect();

        let base = mean(y);
        let mut current = vec![base; y.len()];
        let mut trees = Vec::with_capacity(p.iterations);
        for _ in 0..p.iterations {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, c)| t - c).collect();
            let tree = self.grow(x, &residuals, &borders, &sorted_rows);
            for (r, value) in current.iter_mut().enumerate() {
                *value += tree.leaves[tree.leaf_index(x.row(r))];
            }
            trees.push(tree);
        }
        debug!(
            trees = trees.len(),
            depth = self.depth(),
            seed = self.seed,
            "Oblivious boosting complete"
        );

        Ok(Box::new(FittedCatBoost {
            base,
            trees,
            n_features: x.cols(),
        }))
    }
}
