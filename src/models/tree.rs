//! Regression trees.
//!
//! Array-based tree representation: nodes live in one `Vec` and reference
//! their children by index. The same grower serves CART (`lambda = 0`, leaf
//! value is the mean) and the second-order boosting learner (`lambda > 0`,
//! leaf value is `Σ residual / (n + lambda)`), since for squared error both
//! reduce to the split score `S_L²/(n_L+λ) + S_R²/(n_R+λ) - S²/(n+λ)`.
//!
//! Samples with `feature <= threshold` go left. Thresholds sit midway between
//! consecutive distinct feature values.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{check_features, check_training_data, FittedModel, Matrix, Regressor};
use crate::error::ModelError;
use crate::models::DecisionTreeParams;

/// Minimum score gain for a split to be kept.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
}

impl RegressionTree {
    /// Prediction for a single row.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Depth of the deepest leaf (a single leaf has depth 0).
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

// ============================================================================
// Tree Grower
// ============================================================================

/// Growth limits and regularisation of one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeGrower {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf values; `0` gives plain CART.
    pub lambda: f64,
    /// Seeds the feature scan order, which decides ties between equal splits.
    pub seed: u64,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeGrower {
    fn leaf_value(&self, sum: f64, count: usize) -> f64 {
        sum / (count as f64 + self.lambda)
    }

    fn score(&self, sum: f64, count: usize) -> f64 {
        if count == 0 {
            0.0
        } else {
            sum * sum / (count as f64 + self.lambda)
        }
    }

    /// Grow a tree on `targets` over the rows of `x` listed in `rows`.
    pub fn grow(&self, x: &Matrix, targets: &[f64], rows: &[usize]) -> RegressionTree {
        let mut order: Vec<usize> = (0..x.cols()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.seed));

        let mut nodes = Vec::new();
        self.grow_node(x, targets, rows.to_vec(), 0, &order, &mut nodes);
        RegressionTree {
            nodes,
            n_features: x.cols(),
        }
    }

    fn grow_node(
        &self,
        x: &Matrix,
        targets: &[f64],
        rows: Vec<usize>,
        depth: usize,
        order: &[usize],
        nodes: &mut Vec<TreeNode>,
    ) -> usize {
        let sum: f64 = rows.iter().map(|&r| targets[r]).sum();
        let idx = nodes.len();
        nodes.push(TreeNode::Leaf {
            value: self.leaf_value(sum, rows.len()),
        });

        let depth_ok = self.max_depth.map_or(true, |d| depth < d);
        if !depth_ok || rows.len() < self.min_samples_split || rows.len() < 2 * self.min_samples_leaf {
            return idx;
        }

        let Some(best) = self.best_split(x, targets, &rows, sum, order) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| x.get(r, best.feature) <= best.threshold);
        let left = self.grow_node(x, targets, left_rows, depth + 1, order, nodes);
        let right = self.grow_node(x, targets, right_rows, depth + 1, order, nodes);
        nodes[idx] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(
        &self,
        x: &Matrix,
        targets: &[f64],
        rows: &[usize],
        sum: f64,
        order: &[usize],
    ) -> Option<SplitCandidate> {
        let n = rows.len();
        if n < 2 {
            return None;
        }
        let parent = self.score(sum, n);
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = rows.to_vec();

        for &feature in order {
            sorted.sort_by(|&a, &b| x.get(a, feature).total_cmp(&x.get(b, feature)));
            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += targets[sorted[i]];
                let (n_left, n_right) = (i + 1, n - i - 1);
                let here = x.get(sorted[i], feature);
                let next = x.get(sorted[i + 1], feature);
                if here == next || !here.is_finite() || !next.is_finite() {
                    continue;
                }
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }
                let gain =
                    self.score(left_sum, n_left) + self.score(sum - left_sum, n_right) - parent;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

// ============================================================================
// Decision Tree Strategy
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct DecisionTreeRegressor {
    params: DecisionTreeParams,
    seed: u64,
}

impl DecisionTreeRegressor {
    pub const fn new(params: DecisionTreeParams, seed: u64) -> Self {
        Self { params, seed }
    }
}

impl Regressor for DecisionTreeRegressor {
    fn name(&self) -> &'static str {
        "Decision Tree"
    }

    fn fit(&self, x: &Matrix, y: &[f64]) -> Result<Box<dyn FittedModel>, ModelError> {
        check_training_data(x, y)?;
        if self.params.min_samples_split < 2 || self.params.min_samples_leaf < 1 {
            return Err(ModelError::InvalidParameter(
                "decision tree needs min_samples_split >= 2 and min_samples_leaf >= 1".to_string(),
            ));
        }
        let grower = TreeGrower {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            lambda: 0.0,
            seed: self.seed,
        };
        let rows: Vec<usize> = (0..x.rows()).collect();
        Ok(Box::new(grower.grow(x, y, &rows)))
    }
}

impl FittedModel for RegressionTree {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>, ModelError> {
        check_features(self.n_features, x)?;
        Ok((0..x.rows()).map(|r| self.predict_row(x.row(r))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Matrix, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let y = (0..8).map(|i| if i < 4 { 1.0 } else { 5.0 }).collect();
        (Matrix::from_rows(&rows).unwrap(), y)
    }

    #[test]
    fn test_single_split_on_step() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..8).collect();
        let tree = TreeGrower {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            lambda: 0.0,
            seed: 42,
        }
        .grow(&x, &y, &rows);
        assert_eq!(tree.n_leaves(), 2, "a pure step needs exactly one split");
        assert!((tree.predict_row(&[3.0]) - 1.0).abs() < 1e-12);
        assert!((tree.predict_row(&[4.0]) - 5.0).abs() < 1e-12);
        assert!((tree.predict_row(&[3.5]) - 1.0).abs() < 1e-12, "threshold sits at the midpoint");
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Matrix::from_rows(&(0..16).map(|i| vec![i as f64]).collect::<Vec<_>>()).unwrap();
        let y: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let params = DecisionTreeParams {
            max_depth: Some(2),
            ..DecisionTreeParams::default()
        };
        let model = DecisionTreeRegressor::new(params, 42).fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        let distinct: std::collections::BTreeSet<u64> = pred.iter().map(|p| p.to_bits()).collect();
        assert!(distinct.len() <= 4, "depth 2 gives at most 4 leaves");
    }

    #[test]
    fn test_unlimited_depth_interpolates_training_data() {
        let x = Matrix::from_rows(&(0..10).map(|i| vec![i as f64]).collect::<Vec<_>>()).unwrap();
        let y: Vec<f64> = (0..10).map(|i| f64::from(i * i)).collect();
        let model = DecisionTreeRegressor::new(DecisionTreeParams::default(), 42).fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..8).collect();
        let tree = TreeGrower {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 5,
            lambda: 0.0,
            seed: 1,
        }
        .grow(&x, &y, &rows);
        assert_eq!(tree.n_nodes(), 1, "8 rows cannot form two leaves of 5");
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_lambda_shrinks_leaves() {
        let x = Matrix::from_rows(&[vec![0.0], vec![0.0]]).unwrap();
        let tree = TreeGrower {
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 1,
            lambda: 1.0,
            seed: 0,
        }
        .grow(&x, &[2.0, 4.0], &[0, 1]);
        assert!((tree.predict_row(&[0.0]) - 2.0).abs() < 1e-12, "6 / (2 + 1)");
    }
}
