//! Bagged ensemble of regression trees

use super::tree::{FittedTree, RegressionTree, TreeConfig};
use super::{validate_sample, validate_training_data, FittedRegressor, Regressor};
use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random forest settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    /// Number of trees
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split, all of them when `None`
    pub max_features: Option<usize>,
    /// Draw each tree's sample with replacement
    pub bootstrap: bool,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
        }
    }
}

impl RandomForestConfig {
    pub fn n_trees(mut self, n: usize) -> Self {
        self.n_trees = n;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn max_features(mut self, features: usize) -> Self {
        self.max_features = Some(features);
        self
    }

    pub fn bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(ForecastError::InvalidParameter(
                "A forest needs at least one tree".to_string(),
            ));
        }
        self.tree_config().validate()
    }
}

/// Unfitted random forest regressor
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: RandomForestConfig,
    seed: u64,
}

impl RandomForest {
    pub fn new(config: RandomForestConfig) -> Self {
        Self { config, seed: 42 }
    }

    /// Seed for bootstrap draws; tree `i` uses `seed + i`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn config(&self) -> &RandomForestConfig {
        &self.config
    }

    fn bootstrap_indices(&self, n_samples: usize, tree_seed: u64) -> Vec<usize> {
        if !self.config.bootstrap {
            return (0..n_samples).collect();
        }
        let mut rng = StdRng::seed_from_u64(tree_seed);
        (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
    }
}

impl Regressor for RandomForest {
    type Fitted = FittedForest;

    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<FittedForest> {
        self.config.validate()?;
        let n_features = validate_training_data(x, y)?;
        let tree_config = self.config.tree_config();

        let trees = (0..self.config.n_trees)
            .into_par_iter()
            .map(|tree_idx| {
                let tree_seed = self.seed.wrapping_add(tree_idx as u64);
                let indices = self.bootstrap_indices(x.len(), tree_seed);
                RegressionTree::new(tree_config.clone())
                    .with_seed(tree_seed)
                    .fit_indices(x, y, indices, n_features)
            })
            .collect::<Result<Vec<FittedTree>>>()?;

        let mut importances = vec![0.0; n_features];
        for tree in &trees {
            for (total, value) in importances.iter_mut().zip(tree.raw_importances()) {
                *total += value;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        debug!(
            "Fitted {} trees on {} rows x {} features",
            trees.len(),
            x.len(),
            n_features
        );

        Ok(FittedForest {
            trees,
            n_features,
            importances,
        })
    }

    fn name(&self) -> &str {
        "Random Forest"
    }
}

/// Fitted forest; predictions are the mean over trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedForest {
    trees: Vec<FittedTree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl FittedForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[FittedTree] {
        &self.trees
    }
}

impl FittedRegressor for FittedForest {
    fn predict_one(&self, features: &[f64]) -> Result<f64> {
        validate_sample(features, self.n_features)?;
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.predict_one(features)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }

    fn name(&self) -> &str {
        "Random Forest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let y: Vec<f64> = (0..40).map(|i| 3.0 * i as f64 + 2.0).collect();
        (x, y)
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = linear_data();
        let forest = RandomForest::new(RandomForestConfig::default().n_trees(10)).with_seed(7);

        let a = forest.fit(&x, &y).unwrap();
        let b = forest.fit(&x, &y).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            a.predict(&[vec![12.5, 1.0]]).unwrap(),
            b.predict(&[vec![12.5, 1.0]]).unwrap()
        );
    }

    #[test]
    fn test_tracks_the_target() {
        let (x, y) = linear_data();
        let forest = RandomForest::new(RandomForestConfig::default().n_trees(25))
            .fit(&x, &y)
            .unwrap();

        let low = forest.predict_one(&[5.0, 0.0]).unwrap();
        let high = forest.predict_one(&[35.0, 0.0]).unwrap();
        assert!(low < high);
        assert!((low - 17.0).abs() < 10.0);

        let importances = forest.feature_importances().unwrap();
        assert_relative_eq!(importances.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_constant_target() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 1.0]).collect();
        let y = vec![100.0; 10];
        let forest = RandomForest::new(RandomForestConfig::default().n_trees(5))
            .fit(&x, &y)
            .unwrap();

        assert_relative_eq!(forest.predict_one(&[3.0, 1.0]).unwrap(), 100.0);
    }

    #[test]
    fn test_zero_trees_rejected() {
        let (x, y) = linear_data();
        let result = RandomForest::new(RandomForestConfig::default().n_trees(0)).fit(&x, &y);
        assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
    }
}
