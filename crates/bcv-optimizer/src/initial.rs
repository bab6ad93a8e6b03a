//! Warm-up point generators used before the surrogate has enough data.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use bcv_types::{BcvResult, Candidate, SearchSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitialPointGenerator {
    /// Independent draws from each dimension's prior.
    #[default]
    Random,
    /// Latin hypercube: each dimension's unit range is cut into `n` strata and
    /// every stratum is hit exactly once.
    Lhs,
}

impl InitialPointGenerator {
    pub fn generate<R: Rng + ?Sized>(
        self,
        space: &SearchSpace,
        n: usize,
        rng: &mut R,
    ) -> BcvResult<Vec<Candidate>> {
        match self {
            Self::Random => Ok((0..n).map(|_| space.sample(rng)).collect()),
            Self::Lhs => latin_hypercube(space, n, rng),
        }
    }
}

fn latin_hypercube<R: Rng + ?Sized>(
    space: &SearchSpace,
    n: usize,
    rng: &mut R,
) -> BcvResult<Vec<Candidate>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let d = space.len();
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(d);
    for _ in 0..d {
        let mut strata: Vec<usize> = (0..n).collect();
        strata.shuffle(rng);
        columns.push(
            strata
                .into_iter()
                .map(|s| (s as f64 + rng.gen::<f64>()) / n as f64)
                .collect(),
        );
    }

    (0..n)
        .map(|i| {
            let unit: Vec<f64> = columns.iter().map(|col| col[i]).collect();
            space.from_unit(&unit)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn space() -> SearchSpace {
        SearchSpace::builder()
            .real("x", 0.0, 1.0)
            .integer("k", 1, 5)
            .categorical("kernel", ["linear", "rbf"])
            .build()
            .unwrap()
    }

    #[test]
    fn random_points_are_in_bounds() {
        let space = space();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let points = InitialPointGenerator::Random.generate(&space, 25, &mut rng).unwrap();
        assert_eq!(points.len(), 25);
        assert!(points.iter().all(|p| space.contains(p)));
    }

    #[test]
    fn lhs_covers_every_stratum() {
        let space = space();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let n = 10;
        let points = InitialPointGenerator::Lhs.generate(&space, n, &mut rng).unwrap();
        assert_eq!(points.len(), n);

        let mut hit = vec![false; n];
        for p in &points {
            let x = p.get_f64("x").unwrap();
            let stratum = ((x * n as f64).floor() as usize).min(n - 1);
            hit[stratum] = true;
        }
        assert!(hit.iter().all(|h| *h));
        assert!(points.iter().all(|p| space.contains(p)));
    }

    #[test]
    fn lhs_is_reproducible() {
        let space = space();
        let a = InitialPointGenerator::Lhs
            .generate(&space, 6, &mut ChaCha8Rng::seed_from_u64(11))
            .unwrap();
        let b = InitialPointGenerator::Lhs
            .generate(&space, 6, &mut ChaCha8Rng::seed_from_u64(11))
            .unwrap();
        assert_eq!(a, b);
        assert!(InitialPointGenerator::Lhs
            .generate(&space, 0, &mut ChaCha8Rng::seed_from_u64(11))
            .unwrap()
            .is_empty());
    }
}
