//! Tests verifying that the ensemble reproduces the moments of a 2D standard Gaussian.
//!
//! With the null resolver every particle is an independent chain whose momentum is refreshed
//! each round, so the pooled samples must match the target for both kernels.

use std::sync::Mutex;

use brownian_mcmc::bmc::{BrownianMonteCarlo, Config};
use brownian_mcmc::collision::Collision;
use brownian_mcmc::distributions::GaussianMixture;
use brownian_mcmc::gradient::{CentralDifference, PotentialEnergy};
use brownian_mcmc::particle::{Masses, Sample};
use brownian_mcmc::sampler::{Sampler, SamplerKind};

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SEED: u64 = 42;

    fn gaussian() -> PotentialEnergy<GaussianMixture, CentralDifference> {
        PotentialEnergy::new(
            GaussianMixture::standard(2).unwrap(),
            CentralDifference::default(),
        )
    }

    /// Runs `rounds` rounds and returns the samples of every round after `burnin`.
    fn collect(
        sampler: Sampler,
        config: Config,
        rounds: usize,
        burnin: usize,
    ) -> (Vec<Sample>, f64) {
        let mut bmc = BrownianMonteCarlo::new(gaussian(), sampler, Collision::None, config)
            .expect("valid configuration");
        let sink = Mutex::new(Vec::<Sample>::new());
        for _ in 0..burnin {
            bmc.round(&sink).unwrap();
        }
        sink.lock().unwrap().clear();
        for _ in 0..rounds {
            bmc.round(&sink).unwrap();
        }
        let acceptance = bmc.summary().acceptance_rate();
        (sink.into_inner().unwrap(), acceptance)
    }

    fn moments(samples: &[Sample], dim: usize) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|s| s.position[dim]).sum::<f64>() / n;
        let var = samples
            .iter()
            .map(|s| (s.position[dim] - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, var)
    }

    #[test]
    fn test_two_d_gaussian_hmc() {
        let config = Config {
            n_particles: 4,
            initial_position: vec![1.0, -1.0],
            seed: Some(SEED),
            ..Config::default()
        };
        let (samples, acceptance) =
            collect(Sampler::from_kind(SamplerKind::Hmc, 0.2, 10), config, 2000, 100);
        assert_eq!(samples.len(), 8000);
        assert!(acceptance > 0.9, "acceptance {acceptance}");
        for dim in 0..2 {
            let (mean, var) = moments(&samples, dim);
            assert_abs_diff_eq!(mean, 0.0, epsilon = 0.15);
            assert_abs_diff_eq!(var, 1.0, epsilon = 0.25);
        }
    }

    #[test]
    fn test_two_d_gaussian_adaptive_nuts() {
        let config = Config {
            n_particles: 4,
            masses: Masses::Scaled(0.5),
            initial_position: vec![0.0, 0.0],
            max_adapt: 200,
            target_accept: 0.8,
            seed: Some(SEED),
            ..Config::default()
        };
        let (samples, _) = collect(Sampler::from_kind(SamplerKind::Nuts, 0.0, 0), config, 1500, 300);
        assert_eq!(samples.len(), 6000);
        for dim in 0..2 {
            let (mean, var) = moments(&samples, dim);
            assert_abs_diff_eq!(mean, 0.0, epsilon = 0.15);
            assert_abs_diff_eq!(var, 1.0, epsilon = 0.25);
        }
    }
}
