//! # bcv-types
//!
//! Core types for BayesCV: the error taxonomy, typed search spaces and their
//! numeric encoding, subspace schedules, trial records and datasets.

pub mod data;
pub mod errors;
pub mod schedule;
pub mod shorthand;
pub mod space;
pub mod trial;

pub use data::*;
pub use errors::*;
pub use schedule::*;
pub use space::*;
pub use trial::*;
