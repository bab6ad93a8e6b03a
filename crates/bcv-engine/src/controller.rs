//! The sequential search loop: one optimizer per subspace, batches evaluated
//! in parallel, callbacks consulted between batches.

use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use bcv_optimizer::{OptimizerConfig, SurrogateOptimizer};
use bcv_types::{
    internal_error, BcvError, BcvResult, Candidate, CvResults, Dataset, SearchId, SearchSpace,
    SubspaceSchedule, Trial, TrialStatus,
};

use crate::callbacks::{SearchCallback, SearchState};
use crate::estimator::{CrossValidator, Estimator};
use crate::evaluator::Evaluator;
use crate::events::{EventSink, SearchEvent};

/// Best configuration found so far. The score only ever increases.
#[derive(Debug, Clone)]
pub struct BestResult<E> {
    pub params: Candidate,
    pub score: f64,
    /// Index into the run's trials.
    pub index: usize,
    /// Estimator refit on the full dataset, when refit is enabled.
    pub estimator: Option<E>,
}

/// Observations collected by one subspace's optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubspaceResult {
    pub subspace: usize,
    pub space: SearchSpace,
    pub n_iter: usize,
    pub observations: Vec<(Candidate, f64)>,
}

impl SubspaceResult {
    pub fn best(&self) -> Option<&(Candidate, f64)> {
        self.observations
            .iter()
            .fold(None, |best: Option<&(Candidate, f64)>, obs| match best {
                Some(b) if b.1 >= obs.1 => Some(b),
                _ => Some(obs),
            })
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct SearchOutcome<E> {
    pub search_id: SearchId,
    pub best: BestResult<E>,
    pub cv_results: CvResults,
    pub optimizer_results: Vec<SubspaceResult>,
    pub iterations_done: usize,
    pub early_stopped: bool,
}

/// Drives a [`SubspaceSchedule`] to completion or early stop.
pub struct SearchController<'a> {
    schedule: &'a SubspaceSchedule,
    evaluator: &'a Evaluator,
    optimizer_config: &'a OptimizerConfig,
    batch_size: usize,
    refit: bool,
    random_state: Option<u64>,
    events: EventSink,
}

struct Incumbent {
    params: Candidate,
    score: f64,
    index: usize,
}

impl<'a> SearchController<'a> {
    pub fn new(
        schedule: &'a SubspaceSchedule,
        evaluator: &'a Evaluator,
        optimizer_config: &'a OptimizerConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            schedule,
            evaluator,
            optimizer_config,
            batch_size: batch_size.max(1),
            refit: true,
            random_state: None,
            events: EventSink::disabled(),
        }
    }

    pub fn with_refit(mut self, refit: bool) -> Self {
        self.refit = refit;
        self
    }

    pub fn with_random_state(mut self, random_state: Option<u64>) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn run<E: Estimator>(
        &self,
        estimator: &E,
        cv: &dyn CrossValidator,
        data: &Dataset,
        callbacks: &mut [&mut dyn SearchCallback],
    ) -> BcvResult<SearchOutcome<E>> {
        let started = Instant::now();
        let search_id = Uuid::new_v4();
        let total_iterations = self.schedule.total_iterations();

        info!(
            %search_id,
            total_iterations,
            subspaces = self.schedule.len(),
            batch_size = self.batch_size,
            workers = self.evaluator.n_workers(),
            "Starting search"
        );
        self.events.emit(SearchEvent::Started {
            search_id,
            total_iterations,
            subspaces: self.schedule.len(),
        });

        let mut seeder = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut cv_results = CvResults::default();
        let mut optimizer_results = Vec::with_capacity(self.schedule.len());
        let mut incumbent: Option<Incumbent> = None;
        let mut scores: Vec<f64> = Vec::with_capacity(total_iterations);
        let mut batch = 0;
        let mut early_stopped = false;

        for (subspace, entry) in self.schedule.entries().iter().enumerate() {
            let mut optimizer = SurrogateOptimizer::new(
                entry.space.clone(),
                self.optimizer_config.clone(),
                Some(seeder.gen()),
            )?;

            info!(%search_id, subspace, n_iter = entry.n_iter, dims = entry.space.len(), "Starting subspace");
            self.events.emit(SearchEvent::SubspaceStarted {
                search_id,
                subspace,
                n_iter: entry.n_iter,
            });

            let mut remaining = entry.n_iter;
            while remaining > 0 {
                let n = self.batch_size.min(remaining);
                let candidates = optimizer.ask(n)?;
                let evaluations = self
                    .evaluator
                    .evaluate_batch(&candidates, estimator, cv, data)?;

                let mut batch_scores = Vec::with_capacity(n);
                for (candidate, evaluation) in candidates.into_iter().zip(evaluations) {
                    optimizer.tell(&candidate, evaluation.score)?;
                    let trial_number = cv_results.len();

                    if let Some(error) = &evaluation.error {
                        self.events.emit(SearchEvent::CandidateFailed {
                            search_id,
                            trial_number,
                            params: candidate.clone(),
                            error: error.clone(),
                        });
                    }

                    let improved = incumbent
                        .as_ref()
                        .map(|best| evaluation.score > best.score)
                        .unwrap_or(true);
                    if improved {
                        debug!(%search_id, trial_number, score = evaluation.score, params = %candidate, "New best");
                        self.events.emit(SearchEvent::NewBest {
                            search_id,
                            trial_number,
                            score: evaluation.score,
                            params: candidate.clone(),
                        });
                        incumbent = Some(Incumbent {
                            params: candidate.clone(),
                            score: evaluation.score,
                            index: trial_number,
                        });
                    }

                    batch_scores.push(evaluation.score);
                    cv_results.push(Trial {
                        id: Uuid::new_v4(),
                        search_id,
                        trial_number,
                        subspace,
                        parameters: candidate,
                        status: if evaluation.is_failed() {
                            TrialStatus::Failed
                        } else {
                            TrialStatus::Completed
                        },
                        score: evaluation.score,
                        std_test_score: evaluation.std_score,
                        split_test_scores: evaluation.test_scores,
                        split_train_scores: evaluation.train_scores,
                        fit_time_seconds: evaluation.fit_time_seconds,
                        error: evaluation.error,
                        recorded_at: Utc::now(),
                    });
                }

                remaining -= n;
                batch += 1;
                scores.extend_from_slice(&batch_scores);

                let best = incumbent
                    .as_ref()
                    .ok_or_else(|| internal_error!("batch completed without an incumbent"))?;
                debug!(%search_id, subspace, batch, iterations_done = scores.len(), best_score = best.score, "Batch completed");
                self.events.emit(SearchEvent::BatchCompleted {
                    search_id,
                    subspace,
                    batch,
                    iterations_done: scores.len(),
                    scores: batch_scores.clone(),
                });

                let state = SearchState {
                    search_id,
                    best_score: best.score,
                    best_params: best.params.clone(),
                    best_index: best.index,
                    batch,
                    subspace,
                    iterations_done: scores.len(),
                    total_iterations,
                    batch_scores,
                    scores: scores.clone(),
                    elapsed: started.elapsed(),
                };
                // every callback sees the snapshot, even after one asks to stop
                let mut stop = false;
                for callback in callbacks.iter_mut() {
                    stop |= callback.on_batch(&state);
                }
                if stop {
                    early_stopped = true;
                    break;
                }
            }

            optimizer_results.push(SubspaceResult {
                subspace,
                space: entry.space.clone(),
                n_iter: entry.n_iter,
                observations: optimizer.observations().to_vec(),
            });

            if early_stopped {
                info!(%search_id, iterations_done = scores.len(), "Search stopped early by callback");
                self.events.emit(SearchEvent::EarlyStopped {
                    search_id,
                    iterations_done: scores.len(),
                });
                break;
            }
        }

        let best = incumbent.ok_or_else(|| internal_error!("search finished without any trial"))?;
        let estimator = if self.refit {
            Some(refit(estimator, &best.params, data)?)
        } else {
            None
        };

        info!(
            %search_id,
            iterations_done = scores.len(),
            best_score = best.score,
            best_params = %best.params,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search finished"
        );
        self.events.emit(SearchEvent::Finished {
            search_id,
            iterations_done: scores.len(),
            best_score: best.score,
        });

        Ok(SearchOutcome {
            search_id,
            best: BestResult {
                params: best.params,
                score: best.score,
                index: best.index,
                estimator,
            },
            cv_results,
            optimizer_results,
            iterations_done: scores.len(),
            early_stopped,
        })
    }
}

fn refit<E: Estimator>(template: &E, params: &Candidate, data: &Dataset) -> BcvResult<E> {
    let mut estimator = template.clone();
    estimator
        .set_params(params)
        .and_then(|_| estimator.fit(data))
        .map_err(|err| BcvError::EvaluationFailure {
            candidate: params.to_string(),
            message: format!("refit on full data failed: {err}"),
        })?;
    debug!(params = %params, samples = data.n_samples(), "Refit best estimator");
    Ok(estimator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subspace_best_keeps_first_of_ties() {
        let space = SearchSpace::builder().real("x", 0.0, 1.0).build().unwrap();
        let result = SubspaceResult {
            subspace: 0,
            space,
            n_iter: 3,
            observations: vec![
                (Candidate::new().with("x", 0.1), 0.5),
                (Candidate::new().with("x", 0.2), 0.9),
                (Candidate::new().with("x", 0.3), 0.9),
            ],
        };
        let (best, score) = result.best().unwrap();
        assert_eq!(best.get_f64("x"), Some(0.2));
        assert_eq!(*score, 0.9);
    }
}
