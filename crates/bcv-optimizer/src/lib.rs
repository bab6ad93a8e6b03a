//! # bcv-optimizer
//!
//! Sequential model-based optimization over a [`bcv_types::SearchSpace`]:
//! a surrogate regression model, acquisition functions, warm-up generators
//! and the ask/tell [`SurrogateOptimizer`] tying them together.

pub mod acquisition;
pub mod initial;
pub mod optimizer;
pub mod surrogate;

pub use acquisition::{normal_cdf, normal_pdf, AcquisitionFunction, HedgePortfolio};
pub use initial::InitialPointGenerator;
pub use optimizer::{
    AcquisitionOptimizer, LiarStrategy, OptimizerConfig, OptimizerPhase, SurrogateOptimizer,
};
pub use surrogate::{GaussianProcess, GpConfig, SurrogateModel};
