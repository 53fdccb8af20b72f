//! The closed set of per-particle proposal kernels.

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use rand::Rng;

use crate::error::BmcError;
use crate::gradient::Potential;
use crate::hmc::HMC;
use crate::nuts::NUTS;

/// Outcome of one proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub position: Array1<f64>,
    pub momentum: Array1<f64>,
    /// `U(position)`.
    pub potential: f64,
    pub accepted: bool,
    /// Acceptance statistic in `[0, 1]`, consumed by step-size adaptation.
    pub acceptance: f64,
    /// Final tree depth, for NUTS.
    pub depth: Option<usize>,
}

impl Proposal {
    /// A rejected proposal: the input state, unchanged.
    pub(crate) fn rejected(
        position: &Array1<f64>,
        momentum: &Array1<f64>,
        potential: f64,
        acceptance: f64,
    ) -> Self {
        Self {
            position: position.clone(),
            momentum: momentum.clone(),
            potential,
            accepted: false,
            acceptance,
            depth: None,
        }
    }
}

/// Kernel names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Hmc,
    Nuts,
}

impl FromStr for SamplerKind {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hmc" => Ok(Self::Hmc),
            "nuts" => Ok(Self::Nuts),
            _ => Err(BmcError::UnknownSampler(s.to_string())),
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hmc => write!(f, "HMC"),
            Self::Nuts => write!(f, "NUTS"),
        }
    }
}

/// A proposal kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampler {
    Hmc(HMC),
    Nuts(NUTS),
}

impl Sampler {
    /// Builds a kernel with the given stored step size. `n_leapfrog` is ignored by NUTS.
    pub fn from_kind(kind: SamplerKind, step_size: f64, n_leapfrog: usize) -> Self {
        match kind {
            SamplerKind::Hmc => Self::Hmc(HMC::new(step_size, n_leapfrog)),
            SamplerKind::Nuts => Self::Nuts(NUTS::new(step_size)),
        }
    }

    pub fn kind(&self) -> SamplerKind {
        match self {
            Self::Hmc(_) => SamplerKind::Hmc,
            Self::Nuts(_) => SamplerKind::Nuts,
        }
    }

    /// The stored step size. `0` asks the orchestrator to adapt it.
    pub fn step_size(&self) -> f64 {
        match self {
            Self::Hmc(hmc) => hmc.step_size,
            Self::Nuts(nuts) => nuts.step_size,
        }
    }

    /// See [`HMC::propose`] and [`NUTS::propose`].
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
        match self {
            Self::Hmc(hmc) => hmc.propose(
                position,
                momentum,
                potential_energy,
                mass,
                potential,
                step_size,
                rng,
            ),
            Self::Nuts(nuts) => nuts.propose(
                position,
                momentum,
                potential_energy,
                mass,
                potential,
                step_size,
                rng,
            ),
        }
    }
}

impl fmt::Display for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}
