//! Hamiltonian building blocks shared by the proposal kernels: energies, the leapfrog
//! integrator, and momentum refresh for a particle of mass `m` (covariance `m·I`).

use ndarray::Array1;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{BmcError, Result};
use crate::gradient::Potential;

/// Kinetic energy `K(p) = 0.5 * pᵀ(p / mass)`.
pub fn kinetic_energy(momentum: &Array1<f64>, mass: f64) -> f64 {
    0.5 * momentum.dot(momentum) / mass
}

/// Total energy `H(x, p) = U(x) + K(p)`.
pub fn hamiltonian<P: Potential + ?Sized>(
    position: &Array1<f64>,
    momentum: &Array1<f64>,
    mass: f64,
    potential: &P,
) -> f64 {
    potential.energy(position) + kinetic_energy(momentum, mass)
}

/// One leapfrog step of size `step_size`, in place.
///
/// `grad` must hold `∇U(position)` on entry and holds the gradient at the new position on
/// return. Returns `U` at the new position.
pub fn leapfrog<P: Potential + ?Sized>(
    position: &mut Array1<f64>,
    momentum: &mut Array1<f64>,
    grad: &mut Array1<f64>,
    step_size: f64,
    mass: f64,
    potential: &P,
) -> f64 {
    let half = 0.5 * step_size;
    momentum.scaled_add(-half, &*grad);
    position.scaled_add(step_size / mass, &*momentum);
    let energy = potential.energy_and_grad(position, grad);
    momentum.scaled_add(-half, &*grad);
    energy
}

/// Draws `p ~ N(0, mass·I)`.
///
/// The Cholesky factor of `mass·I` is `sqrt(mass)·I`; a mass that is not strictly positive
/// and finite has none.
pub fn sample_momentum<R: Rng>(dim: usize, mass: f64, rng: &mut R) -> Result<Array1<f64>> {
    if !(mass > 0.0 && mass.is_finite()) {
        return Err(BmcError::NotPositiveDefinite { mass });
    }
    let scale = mass.sqrt();
    Ok(Array1::from_shape_fn(dim, |_| {
        scale * rng.sample::<f64, _>(StandardNormal)
    }))
}

/// A point in phase space with its cached potential energy and gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct PhasePoint {
    pub position: Array1<f64>,
    pub momentum: Array1<f64>,
    pub grad: Array1<f64>,
    pub potential: f64,
}

impl PhasePoint {
    pub fn new<P: Potential + ?Sized>(
        position: Array1<f64>,
        momentum: Array1<f64>,
        potential: &P,
    ) -> Self {
        let mut grad = Array1::zeros(position.len());
        let energy = potential.energy_and_grad(&position, &mut grad);
        Self {
            position,
            momentum,
            grad,
            potential: energy,
        }
    }

    pub fn hamiltonian(&self, mass: f64) -> f64 {
        self.potential + kinetic_energy(&self.momentum, mass)
    }

    /// Advances this point by one leapfrog step.
    pub fn leapfrog<P: Potential + ?Sized>(&mut self, step_size: f64, mass: f64, potential: &P) {
        self.potential = leapfrog(
            &mut self.position,
            &mut self.momentum,
            &mut self.grad,
            step_size,
            mass,
            potential,
        );
    }
}
