//! Parallel cross-validated evaluation of candidate batches.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use bcv_types::{
    config_error, internal_error, mean, std_dev, BcvError, BcvResult, Candidate, Dataset,
};

use crate::estimator::{CrossValidator, Estimator, Fold};

/// What to do when fitting or scoring a candidate fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(try_from = "ErrorScoreRepr", into = "ErrorScoreRepr")]
pub enum ErrorScore {
    /// Fail the whole batch.
    #[default]
    Raise,
    /// Record this score for the failed candidate and carry on.
    Value(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ErrorScoreRepr {
    Value(f64),
    Keyword(String),
}

impl TryFrom<ErrorScoreRepr> for ErrorScore {
    type Error = String;

    fn try_from(repr: ErrorScoreRepr) -> Result<Self, Self::Error> {
        match repr {
            ErrorScoreRepr::Value(v) => Ok(Self::Value(v)),
            ErrorScoreRepr::Keyword(k) if k == "raise" => Ok(Self::Raise),
            ErrorScoreRepr::Keyword(k) => Err(format!(
                "error_score must be \"raise\" or a number, got \"{k}\""
            )),
        }
    }
}

impl From<ErrorScore> for ErrorScoreRepr {
    fn from(score: ErrorScore) -> Self {
        match score {
            ErrorScore::Raise => Self::Keyword("raise".to_string()),
            ErrorScore::Value(v) => Self::Value(v),
        }
    }
}

/// Cross-validation outcome for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean test score over folds, or the error score on failure.
    pub score: f64,
    pub std_score: f64,
    pub test_scores: Vec<f64>,
    pub train_scores: Option<Vec<f64>>,
    /// Mean wall time per fold.
    pub fit_time_seconds: f64,
    pub error: Option<String>,
}

impl Evaluation {
    fn failed(score: f64, error: String) -> Self {
        Self {
            score,
            std_score: 0.0,
            test_scores: Vec::new(),
            train_scores: None,
            fit_time_seconds: 0.0,
            error: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Runs cross-validation for a batch of candidates on a bounded rayon pool.
pub struct Evaluator {
    pool: rayon::ThreadPool,
    error_score: ErrorScore,
    return_train_score: bool,
}

impl Evaluator {
    /// `n_jobs == 0` uses every available core.
    pub fn new(n_jobs: usize, error_score: ErrorScore, return_train_score: bool) -> BcvResult<Self> {
        if let ErrorScore::Value(v) = error_score {
            if !v.is_finite() {
                return Err(config_error!("error_score must be finite, got {v}"));
            }
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .thread_name(|i| format!("bcv-eval-{i}"))
            .build()
            .map_err(|e| internal_error!("failed to build evaluation pool: {e}"))?;
        Ok(Self {
            pool,
            error_score,
            return_train_score,
        })
    }

    pub fn n_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn error_score(&self) -> ErrorScore {
        self.error_score
    }

    /// Evaluate every candidate; results are aligned with `candidates`.
    pub fn evaluate_batch<E: Estimator>(
        &self,
        candidates: &[Candidate],
        template: &E,
        cv: &dyn CrossValidator,
        data: &Dataset,
    ) -> BcvResult<Vec<Evaluation>> {
        let folds = cv.split(data)?;
        if folds.is_empty() {
            return Err(config_error!("cross-validator produced no folds"));
        }

        let return_train_score = self.return_train_score;
        let outcomes: Vec<BcvResult<Evaluation>> = self.pool.install(|| {
            candidates
                .par_iter()
                .map(|candidate| evaluate_candidate(candidate, template, &folds, data, return_train_score))
                .collect()
        });

        let mut evaluations = Vec::with_capacity(candidates.len());
        for (candidate, outcome) in candidates.iter().zip(outcomes) {
            match outcome {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(err) => match self.error_score {
                    ErrorScore::Raise => {
                        return Err(BcvError::EvaluationFailure {
                            candidate: candidate.to_string(),
                            message: err.to_string(),
                        })
                    }
                    ErrorScore::Value(score) => {
                        warn!(
                            candidate = %candidate,
                            error = %err,
                            score,
                            "Candidate failed, substituting error score"
                        );
                        evaluations.push(Evaluation::failed(score, err.to_string()));
                    }
                },
            }
        }

        debug!(
            batch = candidates.len(),
            folds = folds.len(),
            failed = evaluations.iter().filter(|e| e.is_failed()).count(),
            "Evaluated batch"
        );
        Ok(evaluations)
    }
}

fn evaluate_candidate<E: Estimator>(
    candidate: &Candidate,
    template: &E,
    folds: &[Fold],
    data: &Dataset,
    return_train_score: bool,
) -> BcvResult<Evaluation> {
    let started = Instant::now();
    let mut test_scores = Vec::with_capacity(folds.len());
    let mut train_scores = Vec::new();

    for fold in folds {
        let train = data.select(&fold.train);
        let test = data.select(&fold.test);

        let mut estimator = template.clone();
        estimator.set_params(candidate)?;
        estimator.fit(&train)?;

        let score = estimator.score(&test)?;
        if !score.is_finite() {
            return Err(BcvError::estimator(format!("scorer returned {score}")));
        }
        test_scores.push(score);

        if return_train_score {
            train_scores.push(estimator.score(&train)?);
        }
    }

    Ok(Evaluation {
        score: mean(&test_scores),
        std_score: std_dev(&test_scores),
        test_scores,
        train_scores: return_train_score.then_some(train_scores),
        fit_time_seconds: started.elapsed().as_secs_f64() / folds.len() as f64,
        error: None,
    })
}
