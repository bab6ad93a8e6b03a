//! # bcv-engine
//!
//! Cross-validated hyperparameter search driven by Bayesian optimization.
//! [`BayesSearch`] walks a schedule of search spaces, asks a
//! [`bcv_optimizer::SurrogateOptimizer`] for batches of candidates, scores
//! them in parallel with an [`Evaluator`] and keeps the best configuration.

pub mod callbacks;
pub mod controller;
pub mod estimator;
pub mod evaluator;
pub mod events;
pub mod search;

pub use callbacks::{
    DeadlineStopper, DeltaYStopper, ScoreThreshold, SearchCallback, SearchState, VerboseCallback,
};
pub use controller::{BestResult, SearchController, SearchOutcome, SubspaceResult};
pub use estimator::{CrossValidator, Estimator, Fold, KFold};
pub use evaluator::{ErrorScore, Evaluation, Evaluator};
pub use events::{EventSink, SearchEvent};
pub use search::{BayesSearch, SearchConfig};

pub use bcv_optimizer::{AcquisitionFunction, InitialPointGenerator, OptimizerConfig};
pub use bcv_types::{
    BcvError, BcvResult, Candidate, CvResults, Dataset, Dimension, ParamValue, Prior, SearchSpace,
    SearchSpaces, SubspaceSchedule, Trial, TrialStatus,
};
