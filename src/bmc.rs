/*!
The Brownian Monte Carlo orchestrator.

An ensemble of particles starts from one shared position. Every round each particle makes one
proposal with its own kernel call (in parallel, one `rayon` task per particle) and emits the
resulting position. After all particles are done the ensemble goes through the collision
phase, which replaces the momenta for the next round, and the step sizes are adapted.

Rounds can be driven one at a time with [`BrownianMonteCarlo::round`], or on a dedicated
thread with [`BrownianMonteCarlo::spawn`], which streams samples through a rendezvous channel:
the simulation advances only as fast as the consumer reads.

# Examples

```rust
use brownian_mcmc::bmc::{BrownianMonteCarlo, Config};
use brownian_mcmc::collision::Collision;
use brownian_mcmc::distributions::GaussianMixture;
use brownian_mcmc::gradient::{CentralDifference, PotentialEnergy};
use brownian_mcmc::sampler::{Sampler, SamplerKind};

let potential = PotentialEnergy::new(
    GaussianMixture::standard(2).unwrap(),
    CentralDifference::default(),
);
let config = Config {
    n_particles: 3,
    initial_position: vec![0.0, 0.0],
    rounds: Some(50),
    seed: Some(42),
    ..Config::default()
};
let bmc = BrownianMonteCarlo::new(
    potential,
    Sampler::from_kind(SamplerKind::Hmc, 0.1, 10),
    Collision::Elastic,
    config,
)
.unwrap();

let finished = bmc.spawn().join().unwrap();
assert_eq!(finished.samples.len(), 150);
assert_eq!(finished.summary.rounds, 50);
```
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use ndarray::Array1;
use rand::{thread_rng, Rng};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::adapt::{find_reasonable_step_size, DualAveraging, RadiusController};
use crate::collision::Collision;
use crate::error::{BmcError, Result};
use crate::gradient::Potential;
use crate::nuts::DepthHistogram;
use crate::particle::{Masses, Particle, Sample};
use crate::sampler::Sampler;
use crate::stats::{ParticleSummary, RunSummary};

/// Ensemble configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub n_particles: usize,
    pub masses: Masses,
    /// Initial interaction radius of every particle.
    pub radius: f64,
    /// Shared starting position; its length is the dimension of the run.
    pub initial_position: Vec<f64>,
    /// Last round whose acceptance feeds step-size adaptation.
    pub max_adapt: usize,
    /// Dual-averaging target acceptance `δ`.
    pub target_accept: f64,
    /// Stop on its own after this many rounds.
    pub rounds: Option<usize>,
    /// Seed of particle `i` is `seed + i`. Drawn from the thread RNG when absent.
    pub seed: Option<u64>,
    /// Slack of the collided-sample stream.
    pub collided_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n_particles: thread::available_parallelism().map_or(1, |n| n.get()),
            masses: Masses::default(),
            radius: 1.0,
            initial_position: vec![0.0; 2],
            max_adapt: 1000,
            target_accept: 0.5,
            rounds: None,
            seed: None,
            collided_capacity: 1024,
        }
    }
}

/// Destination of the per-round samples.
pub trait SampleSink: Sync {
    /// Delivers one sample. Returns `false` once nobody is listening any more.
    fn emit(&self, sample: Sample) -> bool;
}

impl SampleSink for SyncSender<Sample> {
    fn emit(&self, sample: Sample) -> bool {
        self.send(sample).is_ok()
    }
}

impl SampleSink for Mutex<Vec<Sample>> {
    fn emit(&self, sample: Sample) -> bool {
        match self.lock() {
            Ok(mut samples) => {
                samples.push(sample);
                true
            }
            Err(_) => false,
        }
    }
}

/// Outcome of one round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub round: usize,
    /// Acceptance statistic of each particle's proposal, by particle index.
    pub acceptance: Vec<f64>,
    /// Positions of the particles that collided in this round.
    pub collided: Vec<Sample>,
    /// The sink refused a sample.
    pub disconnected: bool,
}

struct Outcome {
    acceptance: f64,
    depth: Option<usize>,
    delivered: bool,
}

/// An ensemble of interacting particles sampling one target.
pub struct BrownianMonteCarlo<P> {
    potential: P,
    sampler: Sampler,
    collision: Collision,
    particles: Vec<Particle>,
    dual: DualAveraging,
    radius_ctl: RadiusController,
    adaptive: bool,
    max_adapt: usize,
    round: usize,
    rounds: Option<usize>,
    seed: u64,
    collided_capacity: usize,
    histogram: Option<DepthHistogram>,
}

impl<P: Potential> BrownianMonteCarlo<P> {
    /// Builds the ensemble: every particle starts at `config.initial_position` with an
    /// independently drawn momentum.
    ///
    /// A sampler whose step size is `0` has its step size adapted per particle.
    pub fn new(
        potential: P,
        sampler: Sampler,
        collision: Collision,
        config: Config,
    ) -> Result<Self> {
        validate(&sampler, &config, potential.dim())?;
        let masses = config.masses.resolve(config.n_particles)?;
        let seed = config.seed.unwrap_or_else(|| thread_rng().gen());
        let adaptive = sampler.step_size() == 0.0;
        let dual = DualAveraging::new(config.target_accept);
        let radius_ctl = RadiusController::new(config.radius);

        let position = Array1::from(config.initial_position);
        let u0 = potential.energy(&position);
        let mut particles = Vec::with_capacity(config.n_particles);
        for (id, mass) in masses.into_iter().enumerate() {
            let mut particle = Particle::new(
                id,
                position.clone(),
                u0,
                mass,
                config.radius,
                dual.init(sampler.step_size()),
                seed.wrapping_add(id as u64),
            )?;
            if adaptive {
                let eps0 = find_reasonable_step_size(
                    &particle.position,
                    &particle.momentum,
                    particle.mass,
                    &potential,
                );
                particle.adaptation = dual.init(eps0);
                trace!(id, eps0, "initial step size");
            }
            particles.push(particle);
        }

        let max_u = particles
            .iter()
            .map(|p| p.potential)
            .fold(f64::NEG_INFINITY, f64::max);
        for particle in &mut particles {
            particle.radius = radius_ctl.initial_shift(particle.radius, particle.potential, max_u);
        }

        let histogram = matches!(sampler, Sampler::Nuts(_)).then(DepthHistogram::default);
        Ok(Self {
            potential,
            sampler,
            collision,
            particles,
            dual,
            radius_ctl,
            adaptive,
            max_adapt: config.max_adapt,
            round: 0,
            rounds: config.rounds,
            seed,
            collided_capacity: config.collided_capacity,
            histogram,
        })
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Rounds completed so far.
    pub fn rounds_done(&self) -> usize {
        self.round
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn depth_histogram(&self) -> Option<&DepthHistogram> {
        self.histogram.as_ref()
    }

    /// Runs one round, emitting one sample per particle into `sink`.
    pub fn round<S: SampleSink + ?Sized>(&mut self, sink: &S) -> Result<RoundReport> {
        if self.round == 0 {
            self.check_counters()?;
        }
        self.round += 1;
        let round = self.round;

        let sampler = &self.sampler;
        let potential = &self.potential;
        let radius_ctl = &self.radius_ctl;
        let adaptive = self.adaptive;
        let outcomes: Vec<Outcome> = self
            .particles
            .par_iter_mut()
            .map(|p| {
                let step_size = if adaptive { p.adaptation.step_size } else { 0.0 };
                let proposal = sampler.propose(
                    &p.position,
                    &p.momentum,
                    p.potential,
                    p.mass,
                    potential,
                    step_size,
                    &mut p.rng,
                );
                if proposal.accepted {
                    p.accepted += 1;
                } else {
                    p.rejected += 1;
                }
                p.radius = radius_ctl.update(p.radius, proposal.potential, p.potential);
                p.position = proposal.position;
                p.momentum = proposal.momentum;
                p.potential = proposal.potential;
                Outcome {
                    acceptance: proposal.acceptance,
                    depth: proposal.depth,
                    delivered: sink.emit(p.sample()),
                }
            })
            .collect();

        if let Some(histogram) = &mut self.histogram {
            outcomes
                .iter()
                .filter_map(|o| o.depth)
                .for_each(|d| histogram.record(d));
        }

        let report = self.collision.resolve(&mut self.particles)?;
        let collided: Vec<Sample> = report
            .collided
            .iter()
            .map(|&i| self.particles[i].sample())
            .collect();

        if self.adaptive && round <= self.max_adapt {
            for (p, o) in self.particles.iter_mut().zip(&outcomes) {
                self.dual.update(&mut p.adaptation, round, o.acceptance);
                trace!(
                    id = p.id,
                    step_size = p.adaptation.step_size,
                    h_bar = p.adaptation.h_bar,
                    acceptance = o.acceptance,
                    "dual averaging"
                );
            }
        }

        debug_assert!(self
            .particles
            .iter()
            .all(|p| p.accepted + p.rejected == round));
        let n = self.particles.len() as f64;
        debug!(
            round,
            collisions = report.pairs.len(),
            mean_step_size = self.particles.iter().map(|p| p.adaptation.step_size).sum::<f64>() / n,
            mean_radius = self.particles.iter().map(|p| p.radius).sum::<f64>() / n,
            "round done"
        );

        Ok(RoundReport {
            round,
            acceptance: outcomes.iter().map(|o| o.acceptance).collect(),
            collided,
            disconnected: outcomes.iter().any(|o| !o.delivered),
        })
    }

    /// Snapshot of the run so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            rounds: self.round,
            particles: self.particles.iter().map(ParticleSummary::from).collect(),
            depth_histogram: self.histogram.clone(),
            dropped_collisions: 0,
        }
    }

    fn check_counters(&self) -> Result<()> {
        match self
            .particles
            .iter()
            .find(|p| p.accepted != 0 || p.rejected != 0 || p.collisions != 0)
        {
            Some(p) => Err(BmcError::CountersNotZeroed { id: p.id }),
            None => Ok(()),
        }
    }

    fn drive(
        mut self,
        samples: SyncSender<Sample>,
        collided: SyncSender<Sample>,
        stop: Arc<AtomicBool>,
    ) -> Result<RunSummary> {
        info!(
            particles = self.particles.len(),
            sampler = %self.sampler,
            collision = %self.collision,
            adaptive = self.adaptive,
            seed = self.seed,
            "starting Brownian Monte Carlo run"
        );
        let mut dropped = 0;
        while !stop.load(Ordering::Acquire) {
            if self.rounds.is_some_and(|limit| self.round >= limit) {
                break;
            }
            let report = self.round(&samples)?;
            let mut dropped_now = 0;
            for sample in report.collided {
                if let Err(TrySendError::Full(_)) = collided.try_send(sample) {
                    dropped_now += 1;
                }
            }
            if dropped_now > 0 {
                warn!(round = report.round, dropped = dropped_now, "collided stream full");
                dropped += dropped_now;
            }
            if report.disconnected {
                warn!(round = report.round, "sample receiver dropped, stopping");
                break;
            }
        }
        let summary = RunSummary {
            dropped_collisions: dropped,
            ..self.summary()
        };
        info!(
            rounds = summary.rounds,
            acceptance = summary.acceptance_rate(),
            collisions = summary.collisions(),
            "run finished"
        );
        Ok(summary)
    }
}

impl<P: Potential + 'static> BrownianMonteCarlo<P> {
    /// Moves the ensemble onto a driver thread and starts sampling.
    pub fn spawn(self) -> SamplingHandle {
        let (samples_tx, samples) = mpsc::sync_channel(0);
        let (collided_tx, collided) = mpsc::sync_channel(self.collided_capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = thread::spawn(move || self.drive(samples_tx, collided_tx, flag));
        SamplingHandle {
            samples,
            collided,
            stop,
            worker,
        }
    }
}

fn validate(sampler: &Sampler, config: &Config, dim: Option<usize>) -> Result<()> {
    let invalid = |msg: String| Err(BmcError::InvalidConfig(msg));
    if config.n_particles == 0 {
        return invalid("at least one particle is required".into());
    }
    if config.initial_position.is_empty() {
        return invalid("initial position is empty".into());
    }
    if let Some(dim) = dim.filter(|&d| d != config.initial_position.len()) {
        return invalid(format!(
            "initial position has {} coordinates, target has {dim}",
            config.initial_position.len()
        ));
    }
    if config.collided_capacity == 0 {
        return invalid("collided stream needs a capacity of at least one".into());
    }
    if !(config.radius > 0.0 && config.radius.is_finite()) {
        return invalid(format!("radius must be positive, got {}", config.radius));
    }
    if !(config.target_accept > 0.0 && config.target_accept < 1.0) {
        return invalid(format!(
            "target acceptance must lie in (0, 1), got {}",
            config.target_accept
        ));
    }
    let step_size = sampler.step_size();
    if !(step_size >= 0.0 && step_size.is_finite()) {
        return invalid(format!("step size must be non-negative, got {step_size}"));
    }
    if let Sampler::Hmc(hmc) = sampler {
        if hmc.n_leapfrog == 0 {
            return invalid("HMC needs at least one leapfrog step".into());
        }
    }
    Ok(())
}

/// What a stopped run left behind.
#[derive(Debug)]
pub struct Finished {
    pub summary: RunSummary,
    /// Samples received while shutting down.
    pub samples: Vec<Sample>,
    /// Collided samples not read before shutdown.
    pub collided: Vec<Sample>,
}

/// Consumer side of a running ensemble.
pub struct SamplingHandle {
    samples: Receiver<Sample>,
    collided: Receiver<Sample>,
    stop: Arc<AtomicBool>,
    worker: JoinHandle<Result<RunSummary>>,
}

impl SamplingHandle {
    /// Blocks for the next sample. `None` once the run has ended.
    pub fn recv(&self) -> Option<Sample> {
        self.samples.recv().ok()
    }

    pub fn samples(&self) -> mpsc::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// The collided-sample stream. Closed together with the primary stream.
    pub fn collided(&self) -> &Receiver<Sample> {
        &self.collided
    }

    /// Requests a stop. The round in flight completes; its samples are drained and returned.
    pub fn stop(self) -> Result<Finished> {
        self.stop.store(true, Ordering::Release);
        self.join()
    }

    /// Waits for the run to end on its own, collecting every remaining sample.
    pub fn join(self) -> Result<Finished> {
        let samples: Vec<Sample> = self.samples.iter().collect();
        let collided: Vec<Sample> = self.collided.iter().collect();
        let summary = self.worker.join().map_err(|_| BmcError::DriverPanicked)??;
        Ok(Finished {
            summary,
            samples,
            collided,
        })
    }
}
