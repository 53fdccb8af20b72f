//! One-shot Hamiltonian Monte Carlo proposals for a single particle.
//!
//! Each call integrates a fixed number of leapfrog steps from the particle's current state and
//! applies a Metropolis test on the change in total energy. The particle's momentum is an input
//! (it was refreshed or exchanged by the collision phase of the previous round), so the kernel
//! never draws momenta itself.

use ndarray::Array1;
use rand::Rng;

use crate::gradient::Potential;
use crate::hamiltonian::{kinetic_energy, PhasePoint};
use crate::sampler::Proposal;

/// Hamiltonian Monte Carlo with a fixed trajectory length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HMC {
    /// Leapfrog step size used when the caller passes `0`.
    pub step_size: f64,
    /// Number of leapfrog steps per proposal.
    pub n_leapfrog: usize,
}

impl HMC {
    pub fn new(step_size: f64, n_leapfrog: usize) -> Self {
        Self {
            step_size,
            n_leapfrog,
        }
    }

    /// Proposes a new state for one particle.
    ///
    /// # Parameters
    ///
    /// * `position`, `momentum`: the particle's current state.
    /// * `potential_energy`: the cached `U(position)`.
    /// * `mass`: the particle's mass.
    /// * `step_size`: the leapfrog step, or `0` to use [`HMC::step_size`].
    ///
    /// On acceptance the proposal carries the end point with negated momentum. On rejection it
    /// carries clones of the inputs, untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn propose<P, R>(
        &self,
        position: &Array1<f64>,
        momentum: &Array1<f64>,
        potential_energy: f64,
        mass: f64,
        potential: &P,
        step_size: f64,
        rng: &mut R,
    ) -> Proposal
    where
        P: Potential + ?Sized,
        R: Rng,
    {
        let eps = if step_size == 0.0 {
            self.step_size
        } else {
            step_size
        };
        let h0 = potential_energy + kinetic_energy(momentum, mass);

        let mut point = PhasePoint::new(position.clone(), momentum.clone(), potential);
        for _ in 0..self.n_leapfrog {
            point.leapfrog(eps, mass, potential);
        }
        let delta = point.hamiltonian(mass) - h0;
        let acceptance = acceptance_probability(delta);

        if rng.gen::<f64>() < acceptance {
            point.momentum.mapv_inplace(|v| -v);
            Proposal {
                position: point.position,
                momentum: point.momentum,
                potential: point.potential,
                accepted: true,
                acceptance,
                depth: None,
            }
        } else {
            Proposal::rejected(position, momentum, potential_energy, acceptance)
        }
    }
}

/// `min(1, exp(-ΔH))`, with `0` for a non-finite energy change.
pub(crate) fn acceptance_probability(delta_h: f64) -> f64 {
    if delta_h.is_finite() {
        (-delta_h).exp().min(1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamiltonian::tests::Bowl;
    use crate::hamiltonian::{hamiltonian, sample_momentum};
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn acceptance_is_a_probability() {
        let bowl = Bowl(vec![1.0, 9.0]);
        let hmc = HMC::new(0.3, 10);
        let mut rng = SmallRng::seed_from_u64(42);
        let mut x = arr1(&[1.0, -1.0]);
        let mut u = bowl.energy(&x);
        for _ in 0..200 {
            let p = sample_momentum(2, 1.0, &mut rng).unwrap();
            let proposal = hmc.propose(&x, &p, u, 1.0, &bowl, 0.0, &mut rng);
            assert!((0.0..=1.0).contains(&proposal.acceptance));
            assert!(proposal.depth.is_none());
            x = proposal.position;
            u = proposal.potential;
        }
    }

    #[test]
    fn rejection_returns_input_state_exactly() {
        // A huge step on a stiff bowl blows the energy up, so the proposal cannot be accepted.
        let bowl = Bowl(vec![100.0, 100.0]);
        let hmc = HMC::new(5.0, 20);
        let mut rng = SmallRng::seed_from_u64(0);
        let x = arr1(&[0.123456789, -0.987654321]);
        let p = arr1(&[0.3, 0.7]);
        let u = bowl.energy(&x);
        let proposal = hmc.propose(&x, &p, u, 1.0, &bowl, 0.0, &mut rng);
        assert!(!proposal.accepted);
        assert_eq!(proposal.acceptance, 0.0);
        assert_eq!(proposal.position, x);
        assert_eq!(proposal.momentum, p);
        assert_eq!(proposal.potential.to_bits(), u.to_bits());
    }

    #[test]
    fn accepted_proposal_negates_momentum() {
        // Small steps on a flat-ish bowl conserve energy almost exactly.
        let bowl = Bowl(vec![0.01]);
        let hmc = HMC::new(0.01, 5);
        let mut rng = SmallRng::seed_from_u64(9);
        let x = arr1(&[0.0]);
        let p = arr1(&[1.0]);
        let proposal = hmc.propose(&x, &p, bowl.energy(&x), 1.0, &bowl, 0.0, &mut rng);
        assert!(proposal.accepted);
        assert!(proposal.momentum[0] < 0.0);
        assert_abs_diff_eq!(proposal.position[0], 0.05, epsilon = 1e-4);
        assert_abs_diff_eq!(
            hamiltonian(&proposal.position, &proposal.momentum, 1.0, &bowl),
            hamiltonian(&x, &p, 1.0, &bowl),
            epsilon = 1e-6
        );
    }

    #[test]
    fn step_size_override_replaces_stored_value() {
        let bowl = Bowl(vec![0.0]);
        let hmc = HMC::new(0.01, 1);
        let mut rng = SmallRng::seed_from_u64(1);
        let x = arr1(&[0.0]);
        let p = arr1(&[1.0]);
        let proposal = hmc.propose(&x, &p, 0.0, 2.0, &bowl, 0.5, &mut rng);
        // Free motion: x' = x + eps * p / m.
        assert_abs_diff_eq!(proposal.position[0], 0.25, epsilon = 1e-12);
        assert_eq!(proposal.acceptance, 1.0);
    }

    #[test]
    fn non_finite_energy_change_is_never_accepted() {
        assert_eq!(acceptance_probability(f64::NAN), 0.0);
        assert_eq!(acceptance_probability(f64::INFINITY), 0.0);
        assert_eq!(acceptance_probability(-3.0), 1.0);
        assert_abs_diff_eq!(acceptance_probability(1.0), (-1.0f64).exp());
    }
}
