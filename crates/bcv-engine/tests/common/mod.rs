#![allow(dead_code)]

use bcv_engine::{BcvError, BcvResult, Candidate, Dataset, Estimator};
use ndarray::{Array1, Array2};

/// Nadaraya-Watson kernel smoother; scored by R².
#[derive(Debug, Clone)]
pub struct KernelRegressor {
    pub bandwidth: f64,
    /// Fitting fails for bandwidths below this value.
    pub fail_below: Option<f64>,
    x_train: Vec<f64>,
    y_train: Vec<f64>,
}

impl KernelRegressor {
    pub fn new() -> Self {
        Self {
            bandwidth: 1.0,
            fail_below: None,
            x_train: Vec::new(),
            y_train: Vec::new(),
        }
    }

    pub fn failing_below(limit: f64) -> Self {
        Self {
            fail_below: Some(limit),
            ..Self::new()
        }
    }
}

impl Estimator for KernelRegressor {
    fn set_params(&mut self, params: &Candidate) -> BcvResult<()> {
        for (name, value) in params.iter() {
            match name.as_str() {
                "bandwidth" => {
                    self.bandwidth = value
                        .as_f64()
                        .ok_or_else(|| BcvError::estimator("bandwidth must be numeric"))?
                }
                other => return Err(BcvError::estimator(format!("unknown parameter '{other}'"))),
            }
        }
        Ok(())
    }

    fn fit(&mut self, data: &Dataset) -> BcvResult<()> {
        if let Some(limit) = self.fail_below {
            if self.bandwidth < limit {
                return Err(BcvError::estimator(format!(
                    "bandwidth {} below {}",
                    self.bandwidth, limit
                )));
            }
        }
        self.x_train = data.x.column(0).to_vec();
        self.y_train = data.y.to_vec();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> BcvResult<Array1<f64>> {
        if self.x_train.is_empty() {
            return Err(BcvError::estimator("predict before fit"));
        }
        Ok(x.column(0).mapv(|q| {
            let mut num = 0.0;
            let mut den = 0.0;
            for (xi, yi) in self.x_train.iter().zip(&self.y_train) {
                let u = (q - xi) / self.bandwidth;
                let w = (-0.5 * u * u).exp();
                num += w * yi;
                den += w;
            }
            if den > 1e-300 {
                num / den
            } else {
                // every weight underflowed: fall back to the nearest neighbour
                let nearest = self
                    .x_train
                    .iter()
                    .enumerate()
                    .min_by(|a, b| (q - a.1).abs().total_cmp(&(q - b.1).abs()))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                self.y_train[nearest]
            }
        }))
    }

    fn score(&self, data: &Dataset) -> BcvResult<f64> {
        let pred = self.predict(&data.x)?;
        let mean = data.y.mean().unwrap_or(0.0);
        let ss_res: f64 = pred.iter().zip(data.y.iter()).map(|(p, y)| (y - p).powi(2)).sum();
        let ss_tot: f64 = data.y.iter().map(|y| (y - mean).powi(2)).sum();
        Ok(if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 })
    }
}

/// Stand-in for a support vector classifier: its accuracy is a fixed smooth
/// function of the hyperparameters, peaking at C = 10, gamma = 0.1 with the
/// rbf kernel.
#[derive(Debug, Clone)]
pub struct ToyClassifier {
    pub c: f64,
    pub gamma: f64,
    pub kernel: String,
    pub degree: i64,
    fitted: bool,
}

impl Default for ToyClassifier {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: 1.0,
            kernel: "rbf".to_string(),
            degree: 3,
            fitted: false,
        }
    }
}

impl ToyClassifier {
    pub fn accuracy(&self) -> f64 {
        let c_penalty = 0.001 * (self.c.log10() - 1.0).powi(2);
        let gamma_penalty = 0.001 * (self.gamma.log10() + 1.0).powi(2);
        let raw = match self.kernel.as_str() {
            "rbf" => 1.0 - c_penalty - gamma_penalty,
            "poly" => 0.93 - c_penalty - gamma_penalty - 0.01 * ((self.degree - 3) as f64).powi(2),
            _ => 0.88 - c_penalty,
        };
        raw.clamp(0.0, 1.0)
    }
}

impl Estimator for ToyClassifier {
    fn set_params(&mut self, params: &Candidate) -> BcvResult<()> {
        for (name, value) in params.iter() {
            let bad = || BcvError::estimator(format!("bad value {value} for '{name}'"));
            match name.as_str() {
                "C" => self.c = value.as_f64().ok_or_else(bad)?,
                "gamma" => self.gamma = value.as_f64().ok_or_else(bad)?,
                "degree" => self.degree = value.as_i64().ok_or_else(bad)?,
                "kernel" => self.kernel = value.as_str().ok_or_else(bad)?.to_string(),
                other => return Err(BcvError::estimator(format!("unknown parameter '{other}'"))),
            }
        }
        Ok(())
    }

    fn fit(&mut self, _data: &Dataset) -> BcvResult<()> {
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> BcvResult<Array1<f64>> {
        if !self.fitted {
            return Err(BcvError::estimator("predict before fit"));
        }
        Ok(x.column(0).mapv(|v| if v >= 0.0 { 1.0 } else { 0.0 }))
    }

    fn score(&self, _data: &Dataset) -> BcvResult<f64> {
        Ok(self.accuracy())
    }
}

/// 60 points of a noisy sine on [0, 2π].
pub fn sine_data() -> Dataset {
    let n = 60;
    let xs: Vec<f64> = (0..n)
        .map(|i| i as f64 * 2.0 * std::f64::consts::PI / (n - 1) as f64)
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .enumerate()
        .map(|(i, x)| x.sin() + 0.15 * ((i * 7919 % 13) as f64 / 6.0 - 1.0))
        .collect();
    let x = Array2::from_shape_vec((n, 1), xs).expect("shape matches");
    Dataset::new(x, Array1::from(ys)).expect("rows match")
}

pub fn classification_data() -> Dataset {
    let x = Array2::from_shape_fn((40, 2), |(i, j)| (i as f64 - 20.0) + j as f64 * 0.1);
    let y = Array1::from_iter((0..40).map(|i| if i >= 20 { 1.0 } else { 0.0 }));
    Dataset::new(x, y).expect("rows match")
}
