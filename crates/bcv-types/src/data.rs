use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::errors::{BcvError, BcvResult};

/// Feature matrix plus target vector, one row per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl Dataset {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> BcvResult<Self> {
        if x.nrows() != y.len() {
            return Err(BcvError::Config(format!(
                "feature matrix has {} rows but target has {} entries",
                x.nrows(),
                y.len()
            )));
        }
        Ok(Self { x, y })
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Copy out the rows at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }
}
