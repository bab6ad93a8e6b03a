//! [`BayesSearch`]: the user-facing search object.

use crossbeam_channel::Sender;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use bcv_optimizer::OptimizerConfig;
use bcv_types::{
    config_error, BcvError, BcvResult, Candidate, CvResults, Dataset, SearchSpaces, SubspaceSchedule,
};

use crate::callbacks::SearchCallback;
use crate::controller::{SearchController, SearchOutcome, SubspaceResult};
use crate::estimator::{CrossValidator, Estimator, KFold};
use crate::evaluator::{ErrorScore, Evaluator};
use crate::events::{EventSink, SearchEvent};

/// Search settings. Every field has a default, so partial JSON is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Budget for subspaces declared without an explicit one.
    pub n_iter: usize,
    /// Evaluation workers; 0 uses every core.
    pub n_jobs: usize,
    /// Candidates proposed per batch; defaults to the worker count.
    pub n_points: Option<usize>,
    pub error_score: ErrorScore,
    pub refit: bool,
    pub return_train_score: bool,
    pub random_state: Option<u64>,
    pub optimizer: OptimizerConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 50,
            n_jobs: 1,
            n_points: None,
            error_score: ErrorScore::Raise,
            refit: true,
            return_train_score: false,
            random_state: None,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_n_points(mut self, n_points: usize) -> Self {
        self.n_points = Some(n_points);
        self
    }

    pub fn with_error_score(mut self, error_score: ErrorScore) -> Self {
        self.error_score = error_score;
        self
    }

    pub fn with_refit(mut self, refit: bool) -> Self {
        self.refit = refit;
        self
    }

    pub fn with_return_train_score(mut self, return_train_score: bool) -> Self {
        self.return_train_score = return_train_score;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn from_json(json: &str) -> BcvResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BcvResult<()> {
        if self.n_points == Some(0) {
            return Err(config_error!("n_points must be at least 1"));
        }
        if let ErrorScore::Value(v) = self.error_score {
            if !v.is_finite() {
                return Err(config_error!("error_score must be finite, got {v}"));
            }
        }
        self.optimizer.validate()
    }
}

/// Bayesian-optimization hyperparameter search with cross-validation.
///
/// ```ignore
/// let space = SearchSpace::builder().log_uniform("C", 1e-6, 1e6).build()?;
/// let mut search = BayesSearch::new(model, space, SearchConfig::default().with_n_iter(32))?;
/// search.fit(&train)?;
/// println!("{} -> {:?}", search.best_score().unwrap_or_default(), search.best_params());
/// ```
pub struct BayesSearch<E: Estimator> {
    estimator: E,
    schedule: SubspaceSchedule,
    config: SearchConfig,
    cv: Box<dyn CrossValidator>,
    events: EventSink,
    outcome: Option<SearchOutcome<E>>,
}

impl<E: Estimator> BayesSearch<E> {
    /// Validates the configuration and the schedule; nothing is evaluated yet.
    pub fn new(estimator: E, spaces: impl Into<SearchSpaces>, config: SearchConfig) -> BcvResult<Self> {
        config.validate()?;
        let schedule = SubspaceSchedule::new(spaces, config.n_iter)?;
        Ok(Self {
            estimator,
            schedule,
            config,
            cv: Box::new(KFold::default()),
            events: EventSink::disabled(),
            outcome: None,
        })
    }

    /// Replace the default 5-fold splitter.
    pub fn with_cv(mut self, cv: impl CrossValidator + 'static) -> Self {
        self.cv = Box::new(cv);
        self
    }

    pub fn with_events(mut self, tx: Sender<SearchEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn schedule(&self) -> &SubspaceSchedule {
        &self.schedule
    }

    /// Total evaluations the schedule allows. Does not require `fit`.
    pub fn total_iterations(&self) -> usize {
        self.schedule.total_iterations()
    }

    pub fn fit(&mut self, data: &Dataset) -> BcvResult<()> {
        self.fit_with_callbacks(data, &mut [])
    }

    /// Run the search. Callbacks are consulted after every batch; any of
    /// them returning `true` ends the search early. On error the results of
    /// any previous fit are discarded.
    pub fn fit_with_callbacks(
        &mut self,
        data: &Dataset,
        callbacks: &mut [&mut dyn SearchCallback],
    ) -> BcvResult<()> {
        self.outcome = None;

        let evaluator = Evaluator::new(
            self.config.n_jobs,
            self.config.error_score,
            self.config.return_train_score,
        )?;
        let batch_size = self
            .config
            .n_points
            .unwrap_or_else(|| evaluator.n_workers())
            .max(1);

        let outcome = SearchController::new(&self.schedule, &evaluator, &self.config.optimizer, batch_size)
            .with_refit(self.config.refit)
            .with_random_state(self.config.random_state)
            .with_events(self.events.clone())
            .run(&self.estimator, self.cv.as_ref(), data, callbacks)?;

        self.outcome = Some(outcome);
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.outcome.as_ref().map(|o| o.best.score)
    }

    pub fn best_params(&self) -> Option<&Candidate> {
        self.outcome.as_ref().map(|o| &o.best.params)
    }

    pub fn best_index(&self) -> Option<usize> {
        self.outcome.as_ref().map(|o| o.best.index)
    }

    pub fn best_estimator(&self) -> Option<&E> {
        self.outcome.as_ref().and_then(|o| o.best.estimator.as_ref())
    }

    pub fn cv_results(&self) -> Option<&CvResults> {
        self.outcome.as_ref().map(|o| &o.cv_results)
    }

    pub fn optimizer_results(&self) -> Option<&[SubspaceResult]> {
        self.outcome.as_ref().map(|o| o.optimizer_results.as_slice())
    }

    pub fn outcome(&self) -> Option<&SearchOutcome<E>> {
        self.outcome.as_ref()
    }

    /// Score `data` with the refit best estimator.
    pub fn score(&self, data: &Dataset) -> BcvResult<f64> {
        self.best_estimator().ok_or(BcvError::NotFitted)?.score(data)
    }

    pub fn predict(&self, x: &Array2<f64>) -> BcvResult<Array1<f64>> {
        self.best_estimator().ok_or(BcvError::NotFitted)?.predict(x)
    }
}
