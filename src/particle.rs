//! Ensemble members and the records they emit.

use std::str::FromStr;

use ndarray::Array1;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::adapt::AdaptationState;
use crate::error::{BmcError, Result};
use crate::hamiltonian::sample_momentum;

/// One position drawn by one particle in one round.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: usize,
    pub position: Vec<f64>,
}

/// How particle masses are assigned.
#[derive(Debug, Clone, PartialEq)]
pub enum Masses {
    /// Every particle has the same mass.
    Uniform(f64),
    /// Particle `i` has mass `m * (i + 1)`.
    Scaled(f64),
    /// One mass per particle.
    Explicit(Vec<f64>),
}

impl Default for Masses {
    fn default() -> Self {
        Self::Uniform(1.0)
    }
}

impl Masses {
    /// Resolves the masses of `n` particles.
    pub fn resolve(&self, n: usize) -> Result<Vec<f64>> {
        let masses = match self {
            Self::Uniform(m) => vec![*m; n],
            Self::Scaled(m) => (0..n).map(|i| m * (i + 1) as f64).collect(),
            Self::Explicit(ms) if ms.len() == n => ms.clone(),
            Self::Explicit(ms) => {
                return Err(BmcError::InvalidConfig(format!(
                    "{} masses given for {n} particles",
                    ms.len()
                )))
            }
        };
        if let Some(bad) = masses.iter().find(|m| !(**m > 0.0 && m.is_finite())) {
            return Err(BmcError::InvalidConfig(format!("mass must be positive, got {bad}")));
        }
        Ok(masses)
    }
}

/// Parses `1.5` (uniform), `scaled:1.5` (per-index scaled) or `1,2,4` (explicit).
impl FromStr for Masses {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self> {
        let number = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| BmcError::InvalidConfig(format!("cannot parse mass `{v}`")))
        };
        if let Some(base) = s.strip_prefix("scaled:") {
            Ok(Self::Scaled(number(base)?))
        } else if s.contains(',') {
            Ok(Self::Explicit(s.split(',').map(number).collect::<Result<_>>()?))
        } else {
            Ok(Self::Uniform(number(s)?))
        }
    }
}

/// A particle of the ensemble.
#[derive(Debug, Clone)]
pub struct Particle {
    pub id: usize,
    pub position: Array1<f64>,
    pub momentum: Array1<f64>,
    pub mass: f64,
    pub radius: f64,
    /// Cached `U(position)`.
    pub potential: f64,
    pub accepted: usize,
    pub rejected: usize,
    pub collisions: usize,
    pub adaptation: AdaptationState,
    pub rng: SmallRng,
}

impl Particle {
    /// Creates a particle at `position` with momentum drawn from `N(0, mass·I)`.
    pub fn new(
        id: usize,
        position: Array1<f64>,
        potential: f64,
        mass: f64,
        radius: f64,
        adaptation: AdaptationState,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let momentum = sample_momentum(position.len(), mass, &mut rng)?;
        Ok(Self {
            id,
            position,
            momentum,
            mass,
            radius,
            potential,
            accepted: 0,
            rejected: 0,
            collisions: 0,
            adaptation,
            rng,
        })
    }

    /// Redraws the momentum from `N(0, mass·I)`.
    pub fn refresh_momentum(&mut self) -> Result<()> {
        self.momentum = sample_momentum(self.position.len(), self.mass, &mut self.rng)?;
        Ok(())
    }

    pub fn kinetic_energy(&self) -> f64 {
        crate::hamiltonian::kinetic_energy(&self.momentum, self.mass)
    }

    pub fn sample(&self) -> Sample {
        Sample {
            id: self.id,
            position: self.position.to_vec(),
        }
    }
}
