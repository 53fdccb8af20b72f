//! Run summaries.

use std::fmt;

use crate::nuts::DepthHistogram;
use crate::particle::Particle;

/// Final state of one particle.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSummary {
    pub id: usize,
    pub mass: f64,
    pub radius: f64,
    pub step_size: f64,
    pub accepted: usize,
    pub rejected: usize,
    pub collisions: usize,
}

impl ParticleSummary {
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.accepted + self.rejected;
        if total == 0 {
            0.0
        } else {
            self.accepted as f64 / total as f64
        }
    }
}

impl From<&Particle> for ParticleSummary {
    fn from(p: &Particle) -> Self {
        Self {
            id: p.id,
            mass: p.mass,
            radius: p.radius,
            step_size: p.adaptation.step_size,
            accepted: p.accepted,
            rejected: p.rejected,
            collisions: p.collisions,
        }
    }
}

/// What a sampling run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub rounds: usize,
    pub particles: Vec<ParticleSummary>,
    /// Present for NUTS runs.
    pub depth_histogram: Option<DepthHistogram>,
    /// Collided samples that did not fit into the collided stream.
    pub dropped_collisions: usize,
}

impl RunSummary {
    /// Accepted proposals over all proposals of the ensemble.
    pub fn acceptance_rate(&self) -> f64 {
        let (acc, total) = self.particles.iter().fold((0, 0), |(a, t), p| {
            (a + p.accepted, t + p.accepted + p.rejected)
        });
        if total == 0 {
            0.0
        } else {
            acc as f64 / total as f64
        }
    }

    /// Collision events, counting each pair once.
    pub fn collisions(&self) -> usize {
        self.particles.iter().map(|p| p.collisions).sum::<usize>() / 2
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} rounds, acceptance {:.3}, {} collisions",
            self.rounds,
            self.acceptance_rate(),
            self.collisions()
        )?;
        for p in &self.particles {
            writeln!(
                f,
                "  particle {:>3}: mass {:.3} radius {:.4} step {:.4} acceptance {:.3} collisions {}",
                p.id,
                p.mass,
                p.radius,
                p.step_size,
                p.acceptance_rate(),
                p.collisions
            )?;
        }
        if let Some(histogram) = &self.depth_histogram {
            writeln!(f, "  mean tree depth {:.2}", histogram.mean_depth())?;
        }
        if self.dropped_collisions > 0 {
            writeln!(f, "  dropped collided samples: {}", self.dropped_collisions)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: usize, accepted: usize, rejected: usize, collisions: usize) -> ParticleSummary {
        ParticleSummary {
            id,
            mass: 1.0,
            radius: 1.0,
            step_size: 0.1,
            accepted,
            rejected,
            collisions,
        }
    }

    #[test]
    fn rates_and_collision_pairs() {
        let run = RunSummary {
            rounds: 10,
            particles: vec![summary(0, 7, 3, 2), summary(1, 4, 6, 2)],
            depth_histogram: None,
            dropped_collisions: 0,
        };
        assert_eq!(run.particles[0].acceptance_rate(), 0.7);
        assert_eq!(run.acceptance_rate(), 11.0 / 20.0);
        assert_eq!(run.collisions(), 2);
        let text = run.to_string();
        assert!(text.starts_with("10 rounds, acceptance 0.550, 2 collisions"));
        assert!(!text.contains("dropped"));
    }

    #[test]
    fn empty_run_has_zero_rate() {
        assert_eq!(RunSummary::default().acceptance_rate(), 0.0);
        assert_eq!(summary(0, 0, 0, 0).acceptance_rate(), 0.0);
    }
}
