//! Surrogate regression models.
//!
//! The optimizer only needs posterior mean and variance, so any model behind
//! [`SurrogateModel`] can be plugged in. [`GaussianProcess`] is the default:
//! a Matérn 5/2 GP on unit-cube inputs with standardized targets, its length
//! scale picked by log marginal likelihood over a small grid.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

use bcv_types::{BcvError, BcvResult};

/// Probabilistic regression model consumed by the optimizer.
pub trait SurrogateModel: fmt::Debug + Send {
    /// Fit on `x` (one row per observation) and targets `y`.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> BcvResult<()>;

    /// Posterior mean and variance at each row of `x`.
    fn predict(&self, x: &Array2<f64>) -> BcvResult<(Array1<f64>, Array1<f64>)>;

    fn name(&self) -> &str;
}

/// Settings for the default Gaussian process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpConfig {
    /// Fixed isotropic length scale; `None` selects it by marginal likelihood.
    pub length_scale: Option<f64>,
    /// Observation noise added to the kernel diagonal (standardized units).
    pub noise: f64,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            length_scale: None,
            noise: 1e-6,
        }
    }
}

const LENGTH_SCALE_GRID: [f64; 8] = [0.05, 0.1, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0];
const JITTER: [f64; 5] = [0.0, 1e-8, 1e-6, 1e-4, 1e-2];

#[derive(Debug, Clone)]
struct FittedGp {
    x_train: Array2<f64>,
    l_chol: Array2<f64>,
    alpha: Array1<f64>,
    length_scale: f64,
    log_marginal_likelihood: f64,
}

/// Matérn 5/2 Gaussian process regressor.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    config: GpConfig,
    y_mean: f64,
    y_std: f64,
    fitted: Option<FittedGp>,
}

impl GaussianProcess {
    pub fn new(config: GpConfig) -> Self {
        Self {
            config,
            y_mean: 0.0,
            y_std: 1.0,
            fitted: None,
        }
    }

    /// Length scale chosen by the last fit.
    pub fn length_scale(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.length_scale)
    }

    pub fn log_marginal_likelihood(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.log_marginal_likelihood)
    }

    fn fit_with_length_scale(
        &self,
        x: &Array2<f64>,
        y_norm: &Array1<f64>,
        length_scale: f64,
    ) -> Option<FittedGp> {
        let n = x.nrows();
        let k = kernel_matrix(x, x, length_scale);

        for jitter in JITTER {
            let mut k_noisy = k.clone();
            for i in 0..n {
                k_noisy[[i, i]] += self.config.noise + jitter;
            }
            if let Some(l) = cholesky(&k_noisy) {
                let alpha = solve_cholesky(&l, y_norm);
                let log_det: f64 = (0..n).map(|i| l[[i, i]].ln()).sum();
                let lml = -0.5 * y_norm.dot(&alpha)
                    - log_det
                    - 0.5 * n as f64 * (2.0 * std::f64::consts::PI).ln();
                return Some(FittedGp {
                    x_train: x.clone(),
                    l_chol: l,
                    alpha,
                    length_scale,
                    log_marginal_likelihood: lml,
                });
            }
        }
        None
    }
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self::new(GpConfig::default())
    }
}

impl SurrogateModel for GaussianProcess {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> BcvResult<()> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(BcvError::Surrogate {
                message: format!("cannot fit on {} inputs and {} targets", x.nrows(), y.len()),
            });
        }

        self.y_mean = y.mean().unwrap_or(0.0);
        self.y_std = y.std(0.0);
        if !self.y_std.is_finite() || self.y_std < 1e-12 {
            self.y_std = 1.0;
        }
        let y_norm = y.mapv(|v| (v - self.y_mean) / self.y_std);

        let grid: Vec<f64> = match self.config.length_scale {
            Some(ls) => vec![ls],
            None => LENGTH_SCALE_GRID.to_vec(),
        };

        let mut best: Option<FittedGp> = None;
        for ls in grid {
            if let Some(candidate) = self.fit_with_length_scale(x, &y_norm, ls) {
                let better = best
                    .as_ref()
                    .map(|b| candidate.log_marginal_likelihood > b.log_marginal_likelihood)
                    .unwrap_or(true);
                if better {
                    best = Some(candidate);
                }
            }
        }

        self.fitted = Some(best.ok_or_else(|| BcvError::Surrogate {
            message: "kernel matrix is not positive definite".to_string(),
        })?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> BcvResult<(Array1<f64>, Array1<f64>)> {
        let fitted = self.fitted.as_ref().ok_or_else(|| BcvError::Surrogate {
            message: "predict called before fit".to_string(),
        })?;

        let k_star = kernel_matrix(x, &fitted.x_train, fitted.length_scale);
        let mean = k_star.dot(&fitted.alpha).mapv(|m| m * self.y_std + self.y_mean);

        let mut var = Array1::zeros(x.nrows());
        for (i, row) in k_star.axis_iter(Axis(0)).enumerate() {
            let v = solve_lower_triangular(&fitted.l_chol, row);
            // k(x, x) = 1 for the Matérn kernel
            var[i] = (1.0 - v.dot(&v)).max(1e-12) * self.y_std * self.y_std;
        }
        Ok((mean, var))
    }

    fn name(&self) -> &str {
        "gaussian_process"
    }
}

fn matern52(distance: f64, length_scale: f64) -> f64 {
    let s = 5.0_f64.sqrt() * distance / length_scale;
    (1.0 + s + s * s / 3.0) * (-s).exp()
}

fn kernel_matrix(a: &Array2<f64>, b: &Array2<f64>, length_scale: f64) -> Array2<f64> {
    let mut k = Array2::zeros((a.nrows(), b.nrows()));
    for (i, ai) in a.axis_iter(Axis(0)).enumerate() {
        for (j, bj) in b.axis_iter(Axis(0)).enumerate() {
            let dist_sq: f64 = ai.iter().zip(bj.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
            k[[i, j]] = matern52(dist_sq.sqrt(), length_scale);
        }
    }
    k
}

/// Lower Cholesky factor, or `None` when `a` is not positive definite.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let d = a[[i, i]] - sum;
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[[i, i]] = d.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve L x = b for lower triangular L.
fn solve_lower_triangular(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[[i, j]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Solve L Lᵀ x = b.
fn solve_cholesky(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let y = solve_lower_triangular(l, b.view());
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn kernel_is_one_at_zero_distance() {
        assert!((matern52(0.0, 0.3) - 1.0).abs() < 1e-12);
        assert!(matern52(1.0, 0.3) < matern52(0.1, 0.3));
    }

    #[test]
    fn cholesky_reconstructs_matrix() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&a).unwrap();
        let back = l.dot(&l.t());
        for (p, q) in back.iter().zip(a.iter()) {
            assert!((p - q).abs() < 1e-12);
        }
        assert!(cholesky(&array![[1.0, 2.0], [2.0, 1.0]]).is_none());
    }

    #[test]
    fn gp_interpolates_training_points() {
        let mut gp = GaussianProcess::new(GpConfig {
            length_scale: Some(0.3),
            ..GpConfig::default()
        });
        let x = array![[0.0], [0.25], [0.5], [0.75], [1.0]];
        let y = x.column(0).mapv(|v| (v - 0.4) * (v - 0.4));
        gp.fit(&x, &y).unwrap();

        let (mean, var) = gp.predict(&x).unwrap();
        for (m, t) in mean.iter().zip(y.iter()) {
            assert!((m - t).abs() < 1e-3, "mean {m} vs target {t}");
        }
        assert!(var.iter().all(|v| *v >= 0.0 && *v < 1e-3));

        let (_, far_var) = gp.predict(&array![[0.125]]).unwrap();
        assert!(far_var[0] > var[0]);
        assert_eq!(gp.length_scale(), Some(0.3));
    }

    #[test]
    fn length_scale_is_selected_from_grid() {
        let mut gp = GaussianProcess::default();
        let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64 / 11.0);
        let y = x.column(0).mapv(|v| (6.0 * v).sin());
        gp.fit(&x, &y).unwrap();
        let ls = gp.length_scale().unwrap();
        assert!(LENGTH_SCALE_GRID.contains(&ls));
        assert!(gp.log_marginal_likelihood().unwrap().is_finite());
    }

    #[test]
    fn gp_handles_duplicate_inputs() {
        let mut gp = GaussianProcess::new(GpConfig {
            length_scale: Some(0.5),
            noise: 1e-10,
        });
        let x = array![[0.3, 0.3], [0.3, 0.3], [0.9, 0.1]];
        let y = array![1.0, 1.0, 0.0];
        gp.fit(&x, &y).unwrap();
        let (mean, _) = gp.predict(&array![[0.3, 0.3]]).unwrap();
        assert!((mean[0] - 1.0).abs() < 0.05);
    }

    #[test]
    fn predict_before_fit_fails() {
        let gp = GaussianProcess::default();
        assert!(matches!(
            gp.predict(&array![[0.5]]),
            Err(BcvError::Surrogate { .. })
        ));
    }

    #[test]
    fn constant_targets_do_not_break_normalization() {
        let mut gp = GaussianProcess::default();
        gp.fit(&array![[0.1], [0.9]], &array![0.5, 0.5]).unwrap();
        let (mean, _) = gp.predict(&array![[0.5]]).unwrap();
        assert!((mean[0] - 0.5).abs() < 1e-9);
    }
}
