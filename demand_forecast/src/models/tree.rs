//! CART regression tree with squared-error splits

use super::{validate_sample, validate_training_data, FittedRegressor, Regressor};
use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Growth limits for one tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth, unlimited when `None`
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs before it may split
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,
    /// Features drawn per split, all of them when `None`
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

impl TreeConfig {
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn min_samples_split(mut self, samples: usize) -> Self {
        self.min_samples_split = samples;
        self
    }

    pub fn min_samples_leaf(mut self, samples: usize) -> Self {
        self.min_samples_leaf = samples;
        self
    }

    pub fn max_features(mut self, features: usize) -> Self {
        self.max_features = Some(features);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(ForecastError::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_samples_leaf must be positive".to_string(),
            ));
        }
        if self.max_features == Some(0) || self.max_depth == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "max_features and max_depth must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// A node in the tree; leaves carry the mean target of their samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature_index: Option<usize>,
    pub threshold: Option<f64>,
    pub prediction: f64,
    pub left_child: Option<usize>,
    pub right_child: Option<usize>,
    pub n_samples: usize,
    /// Mean squared error of the node's targets
    pub impurity: f64,
    pub depth: usize,
}

impl TreeNode {
    fn leaf(prediction: f64, n_samples: usize, impurity: f64, depth: usize) -> Self {
        Self {
            feature_index: None,
            threshold: None,
            prediction,
            left_child: None,
            right_child: None,
            n_samples,
            impurity,
            depth,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_index.is_none()
    }
}

/// Unfitted regression tree
#[derive(Debug, Clone)]
pub struct RegressionTree {
    config: TreeConfig,
    seed: u64,
}

impl RegressionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self { config, seed: 0 }
    }

    /// Seed for the per-split feature draws
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit on the rows of `x` selected by `indices` (repeats allowed)
    pub(crate) fn fit_indices(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        indices: Vec<usize>,
        n_features: usize,
    ) -> Result<FittedTree> {
        self.config.validate()?;
        if indices.is_empty() {
            return Err(ForecastError::ModelError(
                "Cannot grow a tree from zero samples".to_string(),
            ));
        }

        let mut builder = TreeBuilder {
            x,
            y,
            config: &self.config,
            rng: StdRng::seed_from_u64(self.seed),
            n_features,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        builder.grow(indices, 0);

        let total: f64 = builder.importances.iter().sum();
        let importances = if total > 0.0 {
            builder.importances.iter().map(|v| v / total).collect()
        } else {
            vec![0.0; n_features]
        };

        Ok(FittedTree {
            nodes: builder.nodes,
            n_features,
            importances,
        })
    }
}

impl Regressor for RegressionTree {
    type Fitted = FittedTree;

    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<FittedTree> {
        let n_features = validate_training_data(x, y)?;
        self.fit_indices(x, y, (0..x.len()).collect(), n_features)
    }

    fn name(&self) -> &str {
        "Regression Tree"
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    config: &'a TreeConfig,
    rng: StdRng,
    n_features: usize,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let n = indices.len();
        let (sum, sum_sq) = indices.iter().fold((0.0, 0.0), |(s, sq), &i| {
            (s + self.y[i], sq + self.y[i] * self.y[i])
        });
        let prediction = sum / n as f64;
        let impurity = (sum_sq / n as f64 - prediction * prediction).max(0.0);

        let node_idx = self.nodes.len();
        self.nodes
            .push(TreeNode::leaf(prediction, n, impurity, depth));

        let at_limit = self.config.max_depth.map_or(false, |d| depth >= d)
            || n < self.config.min_samples_split
            || impurity < 1e-10;
        if at_limit {
            return node_idx;
        }

        let Some(split) = self.best_split(&indices, impurity) else {
            return node_idx;
        };

        self.importances[split.feature] += split.gain * n as f64;

        let left = self.grow(split.left, depth + 1);
        let right = self.grow(split.right, depth + 1);

        let node = &mut self.nodes[node_idx];
        node.feature_index = Some(split.feature);
        node.threshold = Some(split.threshold);
        node.left_child = Some(left);
        node.right_child = Some(right);
        node_idx
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.config.max_features {
            Some(m) if m < self.n_features => {
                let mut drawn = rand::seq::index::sample(&mut self.rng, self.n_features, m).into_vec();
                drawn.sort_unstable();
                drawn
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Sweep each candidate feature once, tracking left/right sums incrementally
    fn best_split(&mut self, indices: &[usize], impurity: f64) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf;
        let total_sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();

        let mut best: Option<(usize, f64, f64)> = None;

        for feature in self.candidate_features() {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| {
                self.x[a][feature]
                    .partial_cmp(&self.x[b][feature])
                    .unwrap_or(Ordering::Equal)
            });

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let yi = self.y[order[pos]];
                left_sum += yi;
                left_sq += yi * yi;

                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let here = self.x[order[pos]][feature];
                let next = self.x[order[pos + 1]][feature];
                if next <= here {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse_left = (left_sq - left_sum * left_sum / n_left as f64).max(0.0);
                let sse_right = (right_sq - right_sum * right_sum / n_right as f64).max(0.0);
                let gain = impurity - (sse_left + sse_right) / n as f64;

                if gain > best.map_or(1e-12, |(_, _, g)| g) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature, threshold, gain)| {
            let (left, right) = indices
                .iter()
                .partition(|&&i| self.x[i][feature] <= threshold);
            SplitCandidate {
                feature,
                threshold,
                gain,
                left,
                right,
            }
        })
    }
}

/// Fitted regression tree stored as a flat node arena rooted at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
    importances: Vec<f64>,
}

impl FittedTree {
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub(crate) fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    fn leaf_value(&self, sample: &[f64]) -> Result<f64> {
        let mut idx = 0;
        loop {
            let node = self.nodes.get(idx).ok_or_else(|| {
                ForecastError::ModelError(format!("Tree node {} is missing", idx))
            })?;

            match (node.feature_index, node.threshold, node.left_child, node.right_child) {
                (Some(feature), Some(threshold), Some(left), Some(right)) => {
                    idx = if sample[feature] <= threshold { left } else { right };
                }
                _ => return Ok(node.prediction),
            }
        }
    }
}

impl FittedRegressor for FittedTree {
    fn predict_one(&self, features: &[f64]) -> Result<f64> {
        validate_sample(features, self.n_features)?;
        self.leaf_value(features)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }

    fn name(&self) -> &str {
        "Regression Tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 5.0 } else { 50.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_learns_a_step() {
        let (x, y) = step_data();
        let tree = RegressionTree::new(TreeConfig::default()).fit(&x, &y).unwrap();

        assert_relative_eq!(tree.predict_one(&[2.0, 2.0]).unwrap(), 5.0);
        assert_relative_eq!(tree.predict_one(&[15.0, 0.0]).unwrap(), 50.0);
        assert_eq!(tree.n_leaves(), 2);

        let importances = tree.feature_importances().unwrap();
        assert_relative_eq!(importances[0], 1.0);
        assert_relative_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_constant_target_is_a_single_leaf() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let y = vec![100.0; 8];
        let tree = RegressionTree::new(TreeConfig::default()).fit(&x, &y).unwrap();

        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.predict_one(&[42.0]).unwrap(), 100.0);
    }

    #[test]
    fn test_depth_limit() {
        let x: Vec<Vec<f64>> = (0..32).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..32).map(|i| (i * i) as f64).collect();
        let tree = RegressionTree::new(TreeConfig::default().max_depth(2))
            .fit(&x, &y)
            .unwrap();

        assert!(tree.depth() <= 2);
        assert!(tree.n_leaves() <= 4);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let (x, y) = step_data();
        let tree = RegressionTree::new(TreeConfig::default()).fit(&x, &y).unwrap();
        assert!(tree.predict_one(&[1.0]).is_err());
    }
}
