//! Trial records and the cross-validation results table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::space::Candidate;

/// Unique search run identifier.
pub type SearchId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Completed,
    /// Fit or score raised; the score is the configured sentinel.
    Failed,
}

/// A single evaluated configuration. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub search_id: SearchId,
    /// Position in the whole run (0-indexed).
    pub trial_number: usize,
    /// Index of the schedule entry this trial belongs to.
    pub subspace: usize,
    pub parameters: Candidate,
    pub status: TrialStatus,
    /// Aggregate (mean) test score, or the sentinel for failed trials.
    pub score: f64,
    pub std_test_score: f64,
    pub split_test_scores: Vec<f64>,
    pub split_train_scores: Option<Vec<f64>>,
    pub fit_time_seconds: f64,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Trial {
    pub fn is_failed(&self) -> bool {
        self.status == TrialStatus::Failed
    }

    pub fn mean_train_score(&self) -> Option<f64> {
        self.split_train_scores.as_ref().map(|s| mean(s))
    }
}

/// Column-oriented view over all trials of a run, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvResults {
    trials: Vec<Trial>,
}

impl CvResults {
    pub fn new(trials: Vec<Trial>) -> Self {
        Self { trials }
    }

    pub fn push(&mut self, trial: Trial) {
        self.trials.push(trial);
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn params(&self) -> Vec<&Candidate> {
        self.trials.iter().map(|t| &t.parameters).collect()
    }

    pub fn mean_test_score(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.score).collect()
    }

    pub fn std_test_score(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.std_test_score).collect()
    }

    pub fn mean_fit_time(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.fit_time_seconds).collect()
    }

    pub fn mean_train_score(&self) -> Vec<Option<f64>> {
        self.trials.iter().map(Trial::mean_train_score).collect()
    }

    /// 1-based ranks, best score first; equal scores share the better rank.
    pub fn rank_test_score(&self) -> Vec<usize> {
        let scores = self.mean_test_score();
        scores
            .iter()
            .map(|s| 1 + scores.iter().filter(|other| *other > s).count())
            .collect()
    }
}

/// Arithmetic mean; `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
