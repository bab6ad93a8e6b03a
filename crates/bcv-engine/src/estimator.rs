//! Contracts for the tuned model and the fold splitter, plus [`KFold`].

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use bcv_types::{config_error, BcvResult, Candidate, Dataset};

/// A model whose hyperparameters are being searched.
///
/// The search clones the template once per fold, so implementations should be
/// cheap to clone before `fit`. Higher `score` is better.
pub trait Estimator: Clone + Send + Sync {
    /// Apply a configuration. Unknown or ill-typed parameters are an error.
    fn set_params(&mut self, params: &Candidate) -> BcvResult<()>;

    fn fit(&mut self, data: &Dataset) -> BcvResult<()>;

    fn predict(&self, x: &Array2<f64>) -> BcvResult<Array1<f64>>;

    fn score(&self, data: &Dataset) -> BcvResult<f64>;
}

/// Row indices of one train/test split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Produces the train/test splits every candidate is scored on.
pub trait CrossValidator: fmt::Debug + Send + Sync {
    fn split(&self, data: &Dataset) -> BcvResult<Vec<Fold>>;
}

/// K consecutive folds, optionally over shuffled indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for KFold {
    fn default() -> Self {
        Self {
            n_splits: 5,
            shuffle: false,
            random_state: None,
        }
    }
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            ..Self::default()
        }
    }

    pub fn with_shuffle(mut self, random_state: Option<u64>) -> Self {
        self.shuffle = true;
        self.random_state = random_state;
        self
    }
}

impl CrossValidator for KFold {
    fn split(&self, data: &Dataset) -> BcvResult<Vec<Fold>> {
        let n_samples = data.n_samples();
        if self.n_splits < 2 {
            return Err(config_error!("n_splits must be at least 2, got {}", self.n_splits));
        }
        if n_samples < self.n_splits {
            return Err(config_error!(
                "cannot split {} samples into {} folds",
                n_samples,
                self.n_splits
            ));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = match self.random_state {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }

        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let size = if i < remainder { base + 1 } else { base };
            let end = start + size;
            let test = indices[start..end].to_vec();
            let train = indices[..start]
                .iter()
                .chain(&indices[end..])
                .copied()
                .collect();
            folds.push(Fold { train, test });
            start = end;
        }
        Ok(folds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Dataset {
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..n).map(|i| i as f64));
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn folds_partition_the_rows() {
        let folds = KFold::new(3).split(&dataset(10)).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(
            folds.iter().map(|f| f.test.len()).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 10);
            assert!(fold.test.iter().all(|t| !fold.train.contains(t)));
        }
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let cv = KFold::new(4).with_shuffle(Some(42));
        let a = cv.split(&dataset(20)).unwrap();
        let b = cv.split(&dataset(20)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a[0].test, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn rejects_degenerate_splits() {
        assert!(KFold::new(1).split(&dataset(10)).is_err());
        assert!(KFold::new(5).split(&dataset(3)).is_err());
    }
}
