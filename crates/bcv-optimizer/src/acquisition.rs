//! Acquisition functions for score maximization.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which acquisition function drives proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AcquisitionFunction {
    #[serde(rename = "EI", alias = "ei")]
    ExpectedImprovement,
    #[serde(rename = "PI", alias = "pi")]
    ProbabilityOfImprovement,
    #[serde(rename = "UCB", alias = "ucb", alias = "LCB")]
    UpperConfidenceBound,
    /// Portfolio of EI, PI and UCB chosen by softmax over accumulated gains.
    #[default]
    #[serde(rename = "gp_hedge")]
    GpHedge,
}

impl AcquisitionFunction {
    /// The single functions this choice proposes with.
    pub fn members(self) -> &'static [AcquisitionFunction] {
        static HEDGE: [AcquisitionFunction; 3] = [
            AcquisitionFunction::ExpectedImprovement,
            AcquisitionFunction::ProbabilityOfImprovement,
            AcquisitionFunction::UpperConfidenceBound,
        ];
        match self {
            Self::ExpectedImprovement => &HEDGE[0..1],
            Self::ProbabilityOfImprovement => &HEDGE[1..2],
            Self::UpperConfidenceBound => &HEDGE[2..3],
            Self::GpHedge => &HEDGE,
        }
    }

    /// Acquisition value at a point with posterior `mean` and `variance`,
    /// given the best observed score. `GpHedge` scores as EI.
    pub fn evaluate(self, mean: f64, variance: f64, best: f64, xi: f64, kappa: f64) -> f64 {
        let std = variance.max(0.0).sqrt();
        match self {
            Self::ExpectedImprovement | Self::GpHedge => {
                if std < 1e-12 {
                    return (mean - best - xi).max(0.0);
                }
                let improvement = mean - best - xi;
                let z = improvement / std;
                improvement * normal_cdf(z) + std * normal_pdf(z)
            }
            Self::ProbabilityOfImprovement => {
                if std < 1e-12 {
                    return if mean > best + xi { 1.0 } else { 0.0 };
                }
                normal_cdf((mean - best - xi) / std)
            }
            Self::UpperConfidenceBound => mean + kappa * std,
        }
    }
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF.
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz-Stegun 7.1.26, max error 1.5e-7.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Gain bookkeeping for the gp_hedge portfolio.
#[derive(Debug, Clone)]
pub struct HedgePortfolio {
    gains: Vec<f64>,
    eta: f64,
}

impl HedgePortfolio {
    pub fn new(n_members: usize, eta: f64) -> Self {
        Self {
            gains: vec![0.0; n_members],
            eta,
        }
    }

    pub fn gains(&self) -> &[f64] {
        &self.gains
    }

    /// Softmax probabilities over the current gains.
    pub fn probabilities(&self) -> Vec<f64> {
        let max = self.gains.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = self
            .gains
            .iter()
            .map(|g| (self.eta * (g - max)).exp())
            .collect();
        let total: f64 = weights.iter().sum();
        weights.iter().map(|w| w / total).collect()
    }

    /// Sample a member index.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let probs = self.probabilities();
        let mut u: f64 = rng.gen();
        for (i, p) in probs.iter().enumerate() {
            if u < *p {
                return i;
            }
            u -= p;
        }
        probs.len() - 1
    }

    /// Credit each member with the model's predicted score at its last proposal.
    pub fn update(&mut self, predicted: &[f64]) {
        for (gain, p) in self.gains.iter_mut().zip(predicted) {
            if p.is_finite() {
                *gain += p;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn cdf_matches_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-3);
        assert!((normal_pdf(0.0) - 0.398_942_28).abs() < 1e-7);
    }

    #[test]
    fn expected_improvement_prefers_uncertainty_at_equal_mean() {
        let ei = AcquisitionFunction::ExpectedImprovement;
        let narrow = ei.evaluate(0.5, 0.01, 0.5, 0.0, 0.0);
        let wide = ei.evaluate(0.5, 0.25, 0.5, 0.0, 0.0);
        assert!(wide > narrow);
        assert!(narrow > 0.0);
        // no variance, no improvement
        assert_eq!(ei.evaluate(0.4, 0.0, 0.5, 0.01, 0.0), 0.0);
    }

    #[test]
    fn ucb_and_pi() {
        let ucb = AcquisitionFunction::UpperConfidenceBound;
        assert!((ucb.evaluate(1.0, 4.0, 0.0, 0.0, 1.96) - 4.92).abs() < 1e-12);

        let pi = AcquisitionFunction::ProbabilityOfImprovement;
        assert!((pi.evaluate(1.0, 1.0, 1.0, 0.0, 0.0) - 0.5).abs() < 1e-7);
        assert_eq!(pi.evaluate(2.0, 0.0, 1.0, 0.0, 0.0), 1.0);
    }

    #[test]
    fn serde_names() {
        let parsed: AcquisitionFunction = serde_json::from_str("\"EI\"").unwrap();
        assert_eq!(parsed, AcquisitionFunction::ExpectedImprovement);
        let parsed: AcquisitionFunction = serde_json::from_str("\"LCB\"").unwrap();
        assert_eq!(parsed, AcquisitionFunction::UpperConfidenceBound);
        assert_eq!(
            serde_json::to_string(&AcquisitionFunction::GpHedge).unwrap(),
            "\"gp_hedge\""
        );
        assert_eq!(AcquisitionFunction::GpHedge.members().len(), 3);
    }

    #[test]
    fn hedge_favors_gaining_member() {
        let mut hedge = HedgePortfolio::new(3, 1.0);
        assert!(hedge.probabilities().iter().all(|p| (p - 1.0 / 3.0).abs() < 1e-12));

        for _ in 0..10 {
            hedge.update(&[0.0, 1.0, 0.0]);
        }
        let probs = hedge.probabilities();
        assert!(probs[1] > 0.99);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let picks = (0..100).filter(|_| hedge.choose(&mut rng) == 1).count();
        assert!(picks > 90);
    }
}
