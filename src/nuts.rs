//! No-U-Turn proposals for a single particle.
//!
//! A trajectory is grown by repeated doubling in a randomly chosen direction until it turns back
//! on itself, its energy diverges, or the depth limit is hit. The proposal is drawn uniformly
//! from the valid nodes of the slice `{ℓ(x, p) ≥ log u}`, where `ℓ = -H` is the joint log
//! density of position and momentum.
//!
//! The kernel does not refresh the momentum; the particle's momentum after the previous
//! collision phase is the starting momentum.

use ndarray::Array1;
use rand::Rng;

use crate::gradient::Potential;
use crate::hamiltonian::PhasePoint;
use crate::sampler::Proposal;

/// No-U-Turn Sampler hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NUTS {
    /// Leapfrog step size used when the caller passes `0`.
    pub step_size: f64,
    /// Maximum number of doublings per call. `0` means unbounded.
    pub max_depth: usize,
    /// Energy-divergence threshold `Δ`: a node with `ℓ + Δ ≤ log u` stops the tree.
    pub delta_max: f64,
}

impl Default for NUTS {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            max_depth: 10,
            delta_max: 1000.0,
        }
    }
}

impl NUTS {
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            ..Self::default()
        }
    }

    pub fn set_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Proposes a new state for one particle.
    ///
    /// Arguments mirror [`crate::hmc::HMC::propose`]. The returned proposal carries the final
    /// tree depth and the mean acceptance statistic over every leapfrog step of the call.
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
        let initial = PhasePoint::new(position.clone(), momentum.clone(), potential);
        let h0 = initial.hamiltonian(mass);
        let ctx = TreeContext {
            step_size: eps,
            mass,
            log_u: (1.0 - rng.gen::<f64>()).ln() - h0,
            h0,
            delta_max: self.delta_max,
            potential,
        };

        let mut minus = initial.clone();
        let mut plus = initial;
        let mut current: Option<PhasePoint> = None;
        let mut n_valid = 1usize;
        let mut depth = 0usize;
        let (mut alpha_sum, mut n_alpha) = (0.0, 0usize);

        loop {
            let dir = if rng.gen::<bool>() { 1.0 } else { -1.0 };
            let start = if dir > 0.0 { &plus } else { &minus };
            let subtree = build_tree(start, dir, depth, &ctx, rng);
            alpha_sum += subtree.alpha_sum;
            n_alpha += subtree.n_alpha;
            if dir > 0.0 {
                plus = subtree.plus;
            } else {
                minus = subtree.minus;
            }
            if subtree.stop || u_turn(&minus, &plus) {
                break;
            }

            if rng.gen::<f64>() < subtree.n_valid as f64 / n_valid as f64 {
                current = Some(subtree.proposal);
            }
            n_valid += subtree.n_valid;
            depth += 1;
            if self.max_depth != 0 && depth == self.max_depth {
                break;
            }
        }

        let acceptance = if n_alpha > 0 {
            alpha_sum / n_alpha as f64
        } else {
            0.0
        };
        match current {
            Some(point) => Proposal {
                position: point.position,
                momentum: point.momentum,
                potential: point.potential,
                accepted: true,
                acceptance,
                depth: Some(depth),
            },
            None => Proposal {
                depth: Some(depth),
                ..Proposal::rejected(position, momentum, potential_energy, acceptance)
            },
        }
    }
}

/// Quantities fixed for one NUTS call.
pub(crate) struct TreeContext<'a, P: ?Sized> {
    pub step_size: f64,
    pub mass: f64,
    pub log_u: f64,
    /// `H` of the initial state.
    pub h0: f64,
    pub delta_max: f64,
    pub potential: &'a P,
}

/// A balanced binary tree of `2^depth` leapfrog steps.
#[derive(Debug, Clone)]
pub(crate) struct Subtree {
    pub minus: PhasePoint,
    pub plus: PhasePoint,
    pub proposal: PhasePoint,
    pub n_valid: usize,
    pub stop: bool,
    pub alpha_sum: f64,
    pub n_alpha: usize,
}

pub(crate) fn build_tree<P, R>(
    start: &PhasePoint,
    dir: f64,
    depth: usize,
    ctx: &TreeContext<'_, P>,
    rng: &mut R,
) -> Subtree
where
    P: Potential + ?Sized,
    R: Rng,
{
    if depth == 0 {
        let mut node = start.clone();
        node.leapfrog(dir * ctx.step_size, ctx.mass, ctx.potential);
        let h1 = node.hamiltonian(ctx.mass);
        let joint = -h1;
        let alpha = (ctx.h0 - h1).exp().min(1.0);
        return Subtree {
            minus: node.clone(),
            plus: node.clone(),
            proposal: node,
            n_valid: usize::from(joint >= ctx.log_u),
            stop: !(joint + ctx.delta_max > ctx.log_u),
            alpha_sum: if alpha.is_nan() { 0.0 } else { alpha },
            n_alpha: 1,
        };
    }

    let first = build_tree(start, dir, depth - 1, ctx, rng);
    if first.stop {
        return first;
    }
    let outer = if dir > 0.0 { &first.plus } else { &first.minus };
    let second = build_tree(outer, dir, depth - 1, ctx, rng);

    let (minus, plus) = if dir > 0.0 {
        (first.minus, second.plus)
    } else {
        (second.minus, first.plus)
    };
    let n_valid = first.n_valid + second.n_valid;
    let proposal = if rng.gen::<f64>() < second.n_valid as f64 / n_valid.max(1) as f64 {
        second.proposal
    } else {
        first.proposal
    };
    let stop = second.stop || u_turn(&minus, &plus);
    Subtree {
        minus,
        plus,
        proposal,
        n_valid,
        stop,
        alpha_sum: first.alpha_sum + second.alpha_sum,
        n_alpha: first.n_alpha + second.n_alpha,
    }
}

/// True when the span between the two endpoints shrinks under either endpoint's momentum.
pub(crate) fn u_turn(minus: &PhasePoint, plus: &PhasePoint) -> bool {
    let span = &plus.position - &minus.position;
    span.dot(&minus.momentum) < 0.0 || span.dot(&plus.momentum) < 0.0
}

/// Tree-depth usage of NUTS calls.
///
/// `counts[k][0]` is how often a call continued past depth `k`; `counts[k][1]` is how often a
/// call ended at depth `k`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthHistogram {
    pub counts: Vec<[u64; 2]>,
}

impl DepthHistogram {
    pub fn record(&mut self, depth: usize) {
        if self.counts.len() <= depth {
            self.counts.resize(depth + 1, [0, 0]);
        }
        for bin in &mut self.counts[..depth] {
            bin[0] += 1;
        }
        self.counts[depth][1] += 1;
    }

    /// Number of recorded calls.
    pub fn calls(&self) -> u64 {
        self.counts.iter().map(|c| c[1]).sum()
    }

    /// Mean final depth over recorded calls.
    pub fn mean_depth(&self) -> f64 {
        let calls = self.calls();
        if calls == 0 {
            return 0.0;
        }
        let total: u64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(k, c)| k as u64 * c[1])
            .sum();
        total as f64 / calls as f64
    }
}
