//! Walkthrough of the search engine on a small k-nearest-neighbours classifier.
//!
//! Run with `RUST_LOG=info cargo run -p bcv-engine --example notebook`.

use anyhow::Result;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bcv_engine::{
    BayesSearch, BcvError, BcvResult, Candidate, Dataset, DeltaYStopper, ErrorScore, Estimator,
    KFold, ScoreThreshold, SearchConfig, SearchEvent, SearchSpace, SearchState, VerboseCallback,
};

#[derive(Debug, Clone)]
struct KNearest {
    n_neighbors: usize,
    weights: String,
    p: f64,
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Default for KNearest {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: "uniform".to_string(),
            p: 2.0,
            x: Array2::zeros((0, 0)),
            y: Array1::zeros(0),
        }
    }
}

impl Estimator for KNearest {
    fn set_params(&mut self, params: &Candidate) -> BcvResult<()> {
        for (name, value) in params.iter() {
            match name.as_str() {
                "n_neighbors" => {
                    self.n_neighbors = value
                        .as_i64()
                        .filter(|k| *k > 0)
                        .ok_or_else(|| BcvError::estimator("n_neighbors must be a positive integer"))?
                        as usize
                }
                "weights" => {
                    self.weights = value
                        .as_str()
                        .ok_or_else(|| BcvError::estimator("weights must be a string"))?
                        .to_string()
                }
                "p" => self.p = value.as_f64().ok_or_else(|| BcvError::estimator("p must be numeric"))?,
                other => return Err(BcvError::estimator(format!("unknown parameter '{other}'"))),
            }
        }
        Ok(())
    }

    fn fit(&mut self, data: &Dataset) -> BcvResult<()> {
        if self.n_neighbors > data.n_samples() {
            return Err(BcvError::estimator(format!(
                "n_neighbors={} exceeds {} training samples",
                self.n_neighbors,
                data.n_samples()
            )));
        }
        self.x = data.x.clone();
        self.y = data.y.clone();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> BcvResult<Array1<f64>> {
        let mut out = Array1::zeros(x.nrows());
        for (i, query) in x.outer_iter().enumerate() {
            let mut dists: Vec<(f64, f64)> = self
                .x
                .outer_iter()
                .zip(self.y.iter())
                .map(|(row, label)| {
                    let d = row
                        .iter()
                        .zip(query.iter())
                        .map(|(a, b)| (a - b).abs().powf(self.p))
                        .sum::<f64>()
                        .powf(1.0 / self.p);
                    (d, *label)
                })
                .collect();
            dists.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut vote = 0.0;
            let mut total = 0.0;
            for (d, label) in dists.iter().take(self.n_neighbors) {
                let w = if self.weights == "distance" { 1.0 / (d + 1e-9) } else { 1.0 };
                vote += w * label;
                total += w;
            }
            out[i] = if vote / total >= 0.5 { 1.0 } else { 0.0 };
        }
        Ok(out)
    }

    fn score(&self, data: &Dataset) -> BcvResult<f64> {
        let pred = self.predict(&data.x)?;
        let correct = pred.iter().zip(data.y.iter()).filter(|(p, y)| p == y).count();
        Ok(correct as f64 / data.n_samples() as f64)
    }
}

/// Two overlapping Gaussian-ish blobs.
fn blobs(n: usize, seed: u64) -> Result<Dataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut xs = Vec::with_capacity(n * 2);
    let mut ys = Vec::with_capacity(n);
    for i in 0..n {
        let label = (i % 2) as f64;
        let center = if label > 0.0 { 1.0 } else { -1.0 };
        for _ in 0..2 {
            let noise: f64 = (0..6).map(|_| rng.gen::<f64>()).sum::<f64>() - 3.0;
            xs.push(center + 1.2 * noise);
        }
        ys.push(label);
    }
    Ok(Dataset::new(Array2::from_shape_vec((n, 2), xs)?, Array1::from(ys))?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let train = blobs(240, 1)?;
    let test = blobs(120, 2)?;

    // 1. a single space written in shorthand
    let space = SearchSpace::from_shorthand(&json!({
        "n_neighbors": [1, 40],
        "weights": ["uniform", "distance"],
        "p": [1.0, 3.0],
    }))?;
    let config = SearchConfig::default()
        .with_n_iter(24)
        .with_n_jobs(0)
        .with_n_points(4)
        .with_random_state(0);
    let mut search = BayesSearch::new(KNearest::default(), space.clone(), config)?;
    search.fit(&train)?;
    info!(
        best_score = search.best_score().unwrap_or_default(),
        best_params = ?search.best_params(),
        test_score = search.score(&test)?,
        "Single space"
    );

    // 2. several subspaces, each with its own budget
    let uniform_only = SearchSpace::builder()
        .integer("n_neighbors", 1, 40)
        .categorical("weights", ["uniform"])
        .build()?;
    let spaces = vec![(space.clone(), Some(12)), (uniform_only, None)];
    let config = SearchConfig::default()
        .with_n_iter(8)
        .with_error_score(ErrorScore::Value(0.0))
        .with_return_train_score(true)
        .with_random_state(1);
    let mut search = BayesSearch::new(KNearest::default(), spaces, config)?
        .with_cv(KFold::new(4).with_shuffle(Some(7)));
    info!(total_iterations = search.total_iterations(), "Planned budget");
    search.fit(&train)?;
    if let Some(results) = search.cv_results() {
        let ranks = results.rank_test_score();
        for (trial, rank) in results.trials().iter().zip(ranks) {
            info!(
                trial = trial.trial_number,
                subspace = trial.subspace,
                rank,
                score = trial.score,
                train = trial.mean_train_score().unwrap_or(f64::NAN),
                params = %trial.parameters,
                "cv_results"
            );
        }
    }

    // 3. stop early once the score is good enough, or when progress stalls
    let (tx, rx) = crossbeam_channel::unbounded();
    let config = SearchConfig::default().with_n_iter(60).with_random_state(2);
    let mut search = BayesSearch::new(KNearest::default(), space, config)?.with_events(tx);
    let mut threshold = ScoreThreshold::new(0.98);
    let mut stalled = DeltaYStopper::new(0.001, 8);
    let mut verbose = VerboseCallback { every: 5 };
    let mut at_most_30 = |state: &SearchState| state.iterations_done >= 30;
    search.fit_with_callbacks(
        &train,
        &mut [&mut threshold, &mut stalled, &mut verbose, &mut at_most_30],
    )?;

    let stopped_early = rx
        .try_iter()
        .any(|event| matches!(event, SearchEvent::EarlyStopped { .. }));
    info!(
        evaluated = search.cv_results().map(|r| r.len()).unwrap_or(0),
        stopped_early,
        best_score = search.best_score().unwrap_or_default(),
        "Early stopping"
    );

    Ok(())
}
