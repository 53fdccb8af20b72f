//! Per-particle adaptation: step size (dual averaging) and interaction radius.

use ndarray::Array1;

use crate::gradient::Potential;
use crate::hamiltonian::PhasePoint;

/// Dual averaging for step-size adaptation (Nesterov 2009, Hoffman & Gelman 2014).
///
/// Holds the hyperparameters shared by the ensemble; each particle carries its own
/// [`AdaptationState`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualAveraging {
    pub target_accept: f64,
    pub gamma: f64,
    pub t0: f64,
    pub kappa: f64,
}

impl Default for DualAveraging {
    fn default() -> Self {
        Self::new(0.5)
    }
}

/// Dual-averaging state of one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptationState {
    /// Step size used in the next round.
    pub step_size: f64,
    /// Smoothed step size.
    pub step_size_bar: f64,
    pub h_bar: f64,
    pub mu: f64,
    /// Acceptance statistic consumed by the most recent update.
    pub last_acceptance: f64,
    pub iterations: usize,
}

impl DualAveraging {
    pub fn new(target_accept: f64) -> Self {
        Self {
            target_accept,
            gamma: 0.05,
            t0: 10.0,
            kappa: 0.75,
        }
    }

    /// Fresh state around an initial step size, with `mu = log(10 * eps0)`.
    pub fn init(&self, eps0: f64) -> AdaptationState {
        AdaptationState {
            step_size: eps0,
            step_size_bar: 1.0,
            h_bar: 0.0,
            mu: (10.0 * eps0).ln(),
            last_acceptance: 0.0,
            iterations: 0,
        }
    }

    /// One update at global round `round` (starting at 1) with the round's acceptance.
    pub fn update(&self, state: &mut AdaptationState, round: usize, acceptance: f64) {
        let m = round as f64;
        let w = 1.0 / (m + self.t0);
        state.h_bar = (1.0 - w) * state.h_bar + w * (self.target_accept - acceptance);
        let log_eps = state.mu - (m.sqrt() / self.gamma) * state.h_bar;
        let m_kappa = m.powf(-self.kappa);
        let log_eps_bar = m_kappa * log_eps + (1.0 - m_kappa) * state.step_size_bar.ln();
        state.step_size = log_eps.exp();
        state.step_size_bar = log_eps_bar.exp();
        state.last_acceptance = acceptance;
        state.iterations += 1;
    }
}

const MAX_RESCALINGS: usize = 64;

/// Heuristic initial step size: doubles or halves `ε = 1` until a single leapfrog step from
/// the initial state has an acceptance ratio crossing `0.5`.
pub fn find_reasonable_step_size<P: Potential + ?Sized>(
    position: &Array1<f64>,
    momentum: &Array1<f64>,
    mass: f64,
    potential: &P,
) -> f64 {
    let initial = PhasePoint::new(position.clone(), momentum.clone(), potential);
    let h0 = initial.hamiltonian(mass);
    let ratio = |eps: f64| {
        let mut point = initial.clone();
        point.leapfrog(eps, mass, potential);
        (h0 - point.hamiltonian(mass)).exp()
    };

    let mut eps = 1.0;
    let mut r = ratio(eps);
    let a: f64 = if r > 0.5 { 1.0 } else { -1.0 };
    let factor = 2f64.powf(a);
    for _ in 0..MAX_RESCALINGS {
        if !(r.powf(a) > 2f64.powf(-a)) {
            break;
        }
        eps *= factor;
        r = ratio(eps);
    }
    eps
}

/// Diffusion-style interaction-radius update.
///
/// A particle whose potential energy rises (it moves into a low-density region) grows its
/// radius; one that falls shrinks it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusController {
    /// Potential-energy normalization `S`.
    pub scale: f64,
    pub min_radius: f64,
}

impl RadiusController {
    pub fn new(initial_radius: f64) -> Self {
        Self {
            scale: 50.0 * initial_radius,
            min_radius: 1e-3 * initial_radius,
        }
    }

    /// `radius + (new_u - old_u) / S`, clamped from below.
    pub fn update(&self, radius: f64, new_u: f64, old_u: f64) -> f64 {
        (radius + (new_u - old_u) / self.scale).max(self.min_radius)
    }

    /// Start-up shift of a radius against the highest potential energy in the ensemble.
    pub fn initial_shift(&self, radius: f64, u: f64, max_u: f64) -> f64 {
        self.update(radius, u, max_u)
    }
}
