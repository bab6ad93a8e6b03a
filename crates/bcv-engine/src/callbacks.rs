//! Batch-boundary callbacks and the built-in stoppers.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use bcv_types::{Candidate, SearchId};

/// Read-only snapshot handed to callbacks after every completed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    pub search_id: SearchId,
    pub best_score: f64,
    pub best_params: Candidate,
    pub best_index: usize,
    /// Batches completed so far, across all subspaces (1-based after the first).
    pub batch: usize,
    pub subspace: usize,
    pub iterations_done: usize,
    pub total_iterations: usize,
    pub batch_scores: Vec<f64>,
    pub scores: Vec<f64>,
    pub elapsed: Duration,
}

/// Invoked after each batch; returning `true` stops the whole search.
pub trait SearchCallback {
    fn on_batch(&mut self, state: &SearchState) -> bool;
}

impl<F> SearchCallback for F
where
    F: FnMut(&SearchState) -> bool,
{
    fn on_batch(&mut self, state: &SearchState) -> bool {
        self(state)
    }
}

/// Stop once the best score reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreThreshold {
    pub threshold: f64,
}

impl ScoreThreshold {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl SearchCallback for ScoreThreshold {
    fn on_batch(&mut self, state: &SearchState) -> bool {
        state.best_score >= self.threshold
    }
}

/// Stop once the search has been running longer than `budget`.
///
/// Checked only after a batch completes, so a run can overshoot the budget by
/// up to one batch. It does not predict whether the next batch would finish in
/// time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadlineStopper {
    pub budget: Duration,
}

impl DeadlineStopper {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

impl SearchCallback for DeadlineStopper {
    fn on_batch(&mut self, state: &SearchState) -> bool {
        state.elapsed > self.budget
    }
}

/// Stop when the `n_best` highest scores lie within `delta` of each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaYStopper {
    pub delta: f64,
    pub n_best: usize,
}

impl DeltaYStopper {
    pub fn new(delta: f64, n_best: usize) -> Self {
        Self { delta, n_best }
    }
}

impl SearchCallback for DeltaYStopper {
    fn on_batch(&mut self, state: &SearchState) -> bool {
        if self.n_best == 0 || state.scores.len() < self.n_best {
            return false;
        }
        let mut sorted = state.scores.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        sorted[0] - sorted[self.n_best - 1] <= self.delta
    }
}

/// Logs progress every `every` batches. Never stops the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerboseCallback {
    pub every: usize,
}

impl Default for VerboseCallback {
    fn default() -> Self {
        Self { every: 1 }
    }
}

impl SearchCallback for VerboseCallback {
    fn on_batch(&mut self, state: &SearchState) -> bool {
        if self.every > 0 && state.batch % self.every == 0 {
            info!(
                search_id = %state.search_id,
                batch = state.batch,
                subspace = state.subspace,
                progress = %format!("{}/{}", state.iterations_done, state.total_iterations),
                best_score = state.best_score,
                best_params = %state.best_params,
                elapsed_ms = state.elapsed.as_millis() as u64,
                "Search progress"
            );
        }
        false
    }
}
