//! Ask/tell optimizer over one search space.
//!
//! Candidates are encoded through [`SearchSpace::encode`] and rescaled into
//! the unit hypercube using the space's encoded bounds. The surrogate is fit on
//! those unit vectors against observed scores; proposals maximize the
//! acquisition function over the same cube and are decoded back, so every
//! returned candidate lies inside the space.

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acquisition::{AcquisitionFunction, HedgePortfolio};
use crate::initial::InitialPointGenerator;
use crate::surrogate::{GaussianProcess, GpConfig, SurrogateModel};
use bcv_types::{config_error, BcvError, BcvResult, Candidate, Dimension, SearchSpace};

/// How the acquisition function is maximized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionOptimizer {
    /// `sampling` when the space has categorical dimensions, `lbfgs` otherwise.
    #[default]
    Auto,
    /// Best of `n_points` random samples.
    Sampling,
    /// Random samples followed by projected gradient ascent from the best few.
    Lbfgs,
}

/// Score assigned to pending points while building a batch.
///
/// Names follow the loss convention (loss = -score), so `ClMin` lies with the
/// minimum loss, which is the *highest* score observed, and `ClMax` with the
/// lowest score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LiarStrategy {
    #[default]
    ClMin,
    ClMean,
    ClMax,
}

impl LiarStrategy {
    fn lie(self, ys: &[f64]) -> f64 {
        match self {
            Self::ClMin => ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Self::ClMax => ys.iter().cloned().fold(f64::INFINITY, f64::min),
            Self::ClMean => ys.iter().sum::<f64>() / ys.len() as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Observations gathered from the generator before the surrogate is used.
    pub n_initial_points: usize,
    pub initial_point_generator: InitialPointGenerator,
    pub acq_func: AcquisitionFunction,
    pub acq_optimizer: AcquisitionOptimizer,
    /// Random samples scored per acquisition maximization.
    pub n_points: usize,
    /// Starting points for gradient ascent in `lbfgs` mode.
    pub n_restarts_optimizer: usize,
    pub xi: f64,
    pub kappa: f64,
    pub liar: LiarStrategy,
    pub gp: GpConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            n_initial_points: 10,
            initial_point_generator: InitialPointGenerator::Random,
            acq_func: AcquisitionFunction::GpHedge,
            acq_optimizer: AcquisitionOptimizer::Auto,
            n_points: 1000,
            n_restarts_optimizer: 5,
            xi: 0.01,
            kappa: 1.96,
            liar: LiarStrategy::ClMin,
            gp: GpConfig::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn with_n_initial_points(mut self, n: usize) -> Self {
        self.n_initial_points = n;
        self
    }

    pub fn with_initial_point_generator(mut self, generator: InitialPointGenerator) -> Self {
        self.initial_point_generator = generator;
        self
    }

    pub fn with_acq_func(mut self, acq_func: AcquisitionFunction) -> Self {
        self.acq_func = acq_func;
        self
    }

    pub fn with_acq_optimizer(mut self, acq_optimizer: AcquisitionOptimizer) -> Self {
        self.acq_optimizer = acq_optimizer;
        self
    }

    pub fn with_n_points(mut self, n_points: usize) -> Self {
        self.n_points = n_points;
        self
    }

    pub fn with_liar(mut self, liar: LiarStrategy) -> Self {
        self.liar = liar;
        self
    }

    pub fn validate(&self) -> BcvResult<()> {
        if self.n_points == 0 {
            return Err(config_error!("optimizer n_points must be at least 1"));
        }
        if !(self.xi.is_finite() && self.xi >= 0.0) {
            return Err(config_error!("xi must be a non-negative number, got {}", self.xi));
        }
        if !(self.kappa.is_finite() && self.kappa >= 0.0) {
            return Err(config_error!("kappa must be a non-negative number, got {}", self.kappa));
        }
        if !(self.gp.noise.is_finite() && self.gp.noise > 0.0) {
            return Err(config_error!("gp noise must be positive, got {}", self.gp.noise));
        }
        if let Some(ls) = self.gp.length_scale {
            if !(ls.is_finite() && ls > 0.0) {
                return Err(config_error!("gp length_scale must be positive, got {ls}"));
            }
        }
        Ok(())
    }
}

/// Where the optimizer is in its fit/propose cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerPhase {
    /// No observations yet.
    Empty,
    /// Proposals still come from the initial point generator.
    WarmUp,
    /// New observations arrived since the last surrogate fit.
    Fitting,
    /// The surrogate reflects every observation.
    Proposing,
}

const GRADIENT_STEP: f64 = 1e-4;
const ASCENT_ITERATIONS: usize = 50;
const DUPLICATE_TOLERANCE: f64 = 1e-10;

/// Sequential model-based optimizer for a single [`SearchSpace`].
#[derive(Debug)]
pub struct SurrogateOptimizer {
    space: SearchSpace,
    config: OptimizerConfig,
    acq_optimizer: AcquisitionOptimizer,
    bounds: Vec<(f64, f64)>,
    model: Box<dyn SurrogateModel>,
    model_current: bool,
    xs: Vec<Vec<f64>>,
    ys: Vec<f64>,
    observations: Vec<(Candidate, f64)>,
    hedge: HedgePortfolio,
    /// Each hedge member's last proposal, credited after the next real fit.
    hedge_proposals: Option<Vec<Vec<f64>>>,
    rng: ChaCha8Rng,
}

impl SurrogateOptimizer {
    /// Optimizer with the default Gaussian process surrogate.
    pub fn new(space: SearchSpace, config: OptimizerConfig, seed: Option<u64>) -> BcvResult<Self> {
        let model = Box::new(GaussianProcess::new(config.gp.clone()));
        Self::with_surrogate(space, config, model, seed)
    }

    pub fn with_surrogate(
        space: SearchSpace,
        config: OptimizerConfig,
        model: Box<dyn SurrogateModel>,
        seed: Option<u64>,
    ) -> BcvResult<Self> {
        config.validate()?;
        if space.is_empty() {
            return Err(config_error!("cannot optimize over an empty search space"));
        }

        let acq_optimizer = match config.acq_optimizer {
            AcquisitionOptimizer::Auto => {
                let has_categorical = space
                    .dimensions()
                    .iter()
                    .any(|d| matches!(d.dimension, Dimension::Categorical { .. }));
                if has_categorical {
                    AcquisitionOptimizer::Sampling
                } else {
                    AcquisitionOptimizer::Lbfgs
                }
            }
            other => other,
        };

        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Ok(Self {
            bounds: space.encoded_bounds(),
            hedge: HedgePortfolio::new(config.acq_func.members().len(), 1.0),
            space,
            config,
            acq_optimizer,
            model,
            model_current: false,
            xs: Vec::new(),
            ys: Vec::new(),
            observations: Vec::new(),
            hedge_proposals: None,
            rng,
        })
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Every (candidate, score) pair told so far, in order.
    pub fn observations(&self) -> &[(Candidate, f64)] {
        &self.observations
    }

    pub fn n_observations(&self) -> usize {
        self.ys.len()
    }

    /// Highest observed score and its candidate; ties keep the first.
    pub fn best(&self) -> Option<(&Candidate, f64)> {
        let mut best: Option<(&Candidate, f64)> = None;
        for (candidate, score) in &self.observations {
            if best.map(|(_, s)| *score > s).unwrap_or(true) {
                best = Some((candidate, *score));
            }
        }
        best
    }

    pub fn phase(&self) -> OptimizerPhase {
        if self.ys.is_empty() {
            OptimizerPhase::Empty
        } else if self.ys.len() < self.config.n_initial_points {
            OptimizerPhase::WarmUp
        } else if self.model_current {
            OptimizerPhase::Proposing
        } else {
            OptimizerPhase::Fitting
        }
    }

    pub fn hedge_gains(&self) -> &[f64] {
        self.hedge.gains()
    }

    /// Propose `n` candidates to evaluate next.
    pub fn ask(&mut self, n: usize) -> BcvResult<Vec<Candidate>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        if self.ys.len() < self.config.n_initial_points {
            debug!(
                n,
                observed = self.ys.len(),
                generator = ?self.config.initial_point_generator,
                "Proposing warm-up points"
            );
            return self
                .config
                .initial_point_generator
                .generate(&self.space, n, &mut self.rng);
        }

        self.refresh_model()?;

        if n == 1 {
            let (candidate, _) = self.propose()?;
            return Ok(vec![candidate]);
        }

        let lie = self.config.liar.lie(&self.ys);
        let n_real = self.ys.len();
        let mut proposals = Vec::with_capacity(n);
        let result = self.propose_with_liar(n, lie, &mut proposals);

        self.xs.truncate(n_real);
        self.ys.truncate(n_real);
        self.model_current = false;
        result?;

        debug!(n, lie, "Proposed batch with constant liar");
        Ok(proposals)
    }

    /// Record the score of `candidate`. Candidates that were never asked for
    /// are accepted as long as they belong to the space.
    pub fn tell(&mut self, candidate: &Candidate, score: f64) -> BcvResult<()> {
        if !score.is_finite() {
            return Err(BcvError::invalid_candidate(format!(
                "score for {candidate} must be finite, got {score}"
            )));
        }
        let encoded = self.space.encode(candidate)?;
        self.xs.push(self.to_unit(&encoded));
        self.ys.push(score);
        self.observations.push((candidate.clone(), score));
        self.model_current = false;
        Ok(())
    }

    pub fn tell_many<'a, I>(&mut self, observations: I) -> BcvResult<()>
    where
        I: IntoIterator<Item = (&'a Candidate, f64)>,
    {
        for (candidate, score) in observations {
            self.tell(candidate, score)?;
        }
        Ok(())
    }

    fn propose_with_liar(&mut self, n: usize, lie: f64, out: &mut Vec<Candidate>) -> BcvResult<()> {
        for i in 0..n {
            let (candidate, x) = self.propose()?;
            out.push(candidate);
            if i + 1 < n {
                self.xs.push(x);
                self.ys.push(lie);
                self.fit_model()?;
            }
        }
        Ok(())
    }

    fn fit_model(&mut self) -> BcvResult<()> {
        let d = self.bounds.len();
        let flat: Vec<f64> = self.xs.iter().flatten().cloned().collect();
        let x = Array2::from_shape_vec((self.xs.len(), d), flat)
            .map_err(|e| BcvError::Internal(format!("observation matrix: {e}")))?;
        let y = Array1::from(self.ys.clone());
        self.model.fit(&x, &y)
    }

    /// Refit on real observations if stale, then credit the hedge members.
    fn refresh_model(&mut self) -> BcvResult<()> {
        if self.model_current {
            return Ok(());
        }
        self.fit_model()?;
        self.model_current = true;

        if let Some(proposals) = self.hedge_proposals.take() {
            let (mean, _) = self.predict(&proposals)?;
            self.hedge.update(mean.as_slice().unwrap_or(&[]));
            debug!(gains = ?self.hedge.gains(), "Updated gp_hedge gains");
        }
        Ok(())
    }

    /// One proposal from the current model, as a candidate and its unit vector.
    fn propose(&mut self) -> BcvResult<(Candidate, Vec<f64>)> {
        let best = self.ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let members = self.config.acq_func.members();

        let mut proposals = Vec::with_capacity(members.len());
        for acq in members {
            proposals.push(self.maximize(*acq, best)?);
        }

        let chosen = if members.len() > 1 {
            let idx = self.hedge.choose(&mut self.rng);
            if self.hedge_proposals.is_none() {
                self.hedge_proposals = Some(proposals.clone());
            }
            idx
        } else {
            0
        };
        let mut x = proposals.swap_remove(chosen);

        if self.is_observed(&x) {
            debug!("Proposal duplicates an observed point, sampling at random instead");
            let candidate = self.space.sample(&mut self.rng);
            x = self.to_unit(&self.space.encode(&candidate)?);
        }

        let candidate = self.space.decode(&self.from_unit(&x))?;
        Ok((candidate, x))
    }

    fn is_observed(&self, x: &[f64]) -> bool {
        self.xs.iter().any(|o| {
            o.iter().zip(x).map(|(a, b)| (a - b) * (a - b)).sum::<f64>() < DUPLICATE_TOLERANCE
        })
    }

    /// Best unit-cube point for `acq`, snapped onto the space's lattice.
    fn maximize(&mut self, acq: AcquisitionFunction, best: f64) -> BcvResult<Vec<f64>> {
        let mut samples = Vec::with_capacity(self.config.n_points);
        for _ in 0..self.config.n_points {
            let candidate = self.space.sample(&mut self.rng);
            let encoded = self.space.encode(&candidate)?;
            samples.push(self.to_unit(&encoded));
        }
        let values = self.acquisition(acq, &samples, best)?;

        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.sort_by(|a, b| values[*b].total_cmp(&values[*a]));

        let mut best_idx = order[0];
        let mut best_x = samples[best_idx].clone();
        let mut best_value = values[best_idx];

        if self.acq_optimizer == AcquisitionOptimizer::Lbfgs {
            for &start in order.iter().take(self.config.n_restarts_optimizer) {
                let ascended = self.ascend(acq, &samples[start], best)?;
                let snapped = self.snap(&ascended)?;
                let value = self.acquisition(acq, std::slice::from_ref(&snapped), best)?[0];
                if value > best_value {
                    best_value = value;
                    best_x = snapped;
                    best_idx = start;
                }
            }
        }

        debug!(?acq, value = best_value, start = best_idx, "Maximized acquisition");
        Ok(best_x)
    }

    /// Projected finite-difference gradient ascent inside the unit cube.
    fn ascend(&self, acq: AcquisitionFunction, start: &[f64], best: f64) -> BcvResult<Vec<f64>> {
        let d = start.len();
        let mut x = start.to_vec();
        let mut fx = self.acquisition(acq, std::slice::from_ref(&x), best)?[0];
        let mut step = 0.1;

        for _ in 0..ASCENT_ITERATIONS {
            let mut probes = Vec::with_capacity(2 * d);
            let mut widths = Vec::with_capacity(d);
            for i in 0..d {
                let mut up = x.clone();
                let mut down = x.clone();
                up[i] = (x[i] + GRADIENT_STEP).min(1.0);
                down[i] = (x[i] - GRADIENT_STEP).max(0.0);
                widths.push(up[i] - down[i]);
                probes.push(up);
                probes.push(down);
            }
            let values = self.acquisition(acq, &probes, best)?;
            let grad: Vec<f64> = (0..d)
                .map(|i| {
                    if widths[i] > 0.0 {
                        (values[2 * i] - values[2 * i + 1]) / widths[i]
                    } else {
                        0.0
                    }
                })
                .collect();
            let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if !norm.is_finite() || norm < 1e-12 {
                break;
            }

            let mut improved = false;
            while step > 1e-6 {
                let trial: Vec<f64> = x
                    .iter()
                    .zip(&grad)
                    .map(|(xi, g)| (xi + step * g / norm).clamp(0.0, 1.0))
                    .collect();
                let f = self.acquisition(acq, std::slice::from_ref(&trial), best)?[0];
                if f > fx {
                    x = trial;
                    fx = f;
                    step = (step * 1.5).min(0.5);
                    improved = true;
                    break;
                }
                step *= 0.5;
            }
            if !improved {
                break;
            }
        }
        Ok(x)
    }

    fn acquisition(
        &self,
        acq: AcquisitionFunction,
        points: &[Vec<f64>],
        best: f64,
    ) -> BcvResult<Vec<f64>> {
        let (mean, var) = self.predict(points)?;
        Ok(mean
            .iter()
            .zip(var.iter())
            .map(|(m, v)| acq.evaluate(*m, *v, best, self.config.xi, self.config.kappa))
            .collect())
    }

    fn predict(&self, points: &[Vec<f64>]) -> BcvResult<(Array1<f64>, Array1<f64>)> {
        let d = self.bounds.len();
        let flat: Vec<f64> = points.iter().flatten().cloned().collect();
        let x = Array2::from_shape_vec((points.len(), d), flat)
            .map_err(|e| BcvError::Internal(format!("query matrix: {e}")))?;
        self.model.predict(&x)
    }

    /// Round-trip a unit point through the space so it lands on a legal value.
    fn snap(&self, x: &[f64]) -> BcvResult<Vec<f64>> {
        let candidate = self.space.decode(&self.from_unit(x))?;
        Ok(self.to_unit(&self.space.encode(&candidate)?))
    }

    fn to_unit(&self, encoded: &[f64]) -> Vec<f64> {
        encoded
            .iter()
            .zip(&self.bounds)
            .map(|(v, (lo, hi))| {
                // halved so spans near f64::MAX stay finite
                let width = hi * 0.5 - lo * 0.5;
                if width > 0.0 {
                    ((v * 0.5 - lo * 0.5) / width).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn from_unit(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(&self.bounds)
            .map(|(u, (lo, hi))| {
                let u = u.clamp(0.0, 1.0);
                lo * (1.0 - u) + hi * u
            })
            .collect()
    }

    /// Random candidate, bypassing the surrogate.
    pub fn sample(&mut self) -> Candidate {
        self.space.sample(&mut self.rng)
    }
}
