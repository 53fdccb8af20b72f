/*!
Momentum exchange between particles.

After every proposal phase the ensemble passes through a collision resolver:

* [`Collision::None`] redraws every momentum from `N(0, m·I)`, which makes the particles
  independent chains.
* [`Collision::Elastic`] lets approaching particles whose interaction spheres overlap bounce
  off each other. Each particle takes part in at most one collision per round, closest pairs
  first. Particles that did not collide get a fresh momentum.

An elastic exchange along the unit normal `n = (x_i - x_j)/|x_i - x_j|` with
`c = ((p_i m_j - p_j m_i)·n) / ((m_i + m_j)/2)` sets `p_i ← p_i - c·n` and `p_j ← p_j + c·n`,
which conserves both the pair's total momentum and its kinetic energy.
*/

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;

use crate::error::{BmcError, Result};
use crate::particle::Particle;

/// Collision resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collision {
    /// Independent momentum refresh.
    None,
    /// Elastic collisions between overlapping, approaching particles.
    #[default]
    Elastic,
}

impl FromStr for Collision {
    type Err = BmcError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "null" | "nocollision" => Ok(Self::None),
            "elastic" | "normalcollision" => Ok(Self::Elastic),
            _ => Err(BmcError::UnknownCollision(s.to_string())),
        }
    }
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Elastic => write!(f, "elastic"),
        }
    }
}

/// What happened in one collision phase. Entries are indices into the ensemble.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionReport {
    pub pairs: Vec<(usize, usize)>,
    pub collided: Vec<usize>,
}

struct Candidate {
    i: usize,
    j: usize,
    distance: f64,
}

impl Collision {
    /// Runs one collision phase over the ensemble.
    pub fn resolve(&self, particles: &mut [Particle]) -> Result<CollisionReport> {
        let mut report = CollisionReport::default();
        if let Self::Elastic = self {
            let mut consumed = vec![false; particles.len()];
            for c in candidates(particles) {
                if consumed[c.i] || consumed[c.j] {
                    continue;
                }
                consumed[c.i] = true;
                consumed[c.j] = true;
                let (left, right) = particles.split_at_mut(c.j);
                exchange(&mut left[c.i], &mut right[0], c.distance);
                report.pairs.push((c.i, c.j));
                report.collided.extend([c.i, c.j]);
            }
            for (particle, consumed) in particles.iter_mut().zip(&consumed) {
                if !consumed {
                    particle.refresh_momentum()?;
                }
            }
            report.collided.sort_unstable();
        } else {
            for particle in particles.iter_mut() {
                particle.refresh_momentum()?;
            }
        }
        Ok(report)
    }
}

/// Approaching pairs `i < j` whose spheres overlap, closest first.
fn candidates(particles: &[Particle]) -> Vec<Candidate> {
    let mut found = Vec::new();
    for i in 0..particles.len() {
        for j in (i + 1)..particles.len() {
            let (a, b) = (&particles[i], &particles[j]);
            let dx = &a.position - &b.position;
            let distance = dx.dot(&dx).sqrt();
            if !(distance > 0.0 && distance < a.radius + b.radius) {
                continue;
            }
            let dp = &a.momentum - &b.momentum;
            if dx.dot(&dp) < 0.0 {
                found.push(Candidate { i, j, distance });
            }
        }
    }
    found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    found
}

fn exchange(a: &mut Particle, b: &mut Particle, distance: f64) {
    let normal: Array1<f64> = (&a.position - &b.position) / distance;
    let avg = 0.5 * (a.mass + b.mass);
    let relative = &a.momentum * b.mass - &b.momentum * a.mass;
    let c = relative.dot(&normal) / avg;
    a.momentum.scaled_add(-c, &normal);
    b.momentum.scaled_add(c, &normal);
    a.collisions += 1;
    b.collisions += 1;
}
