//! End-to-end tests of the threaded driver: round limits, the stop protocol and the collided
//! stream.

use std::sync::mpsc;

use ndarray::Array1;

use brownian_mcmc::bmc::{BrownianMonteCarlo, Config};
use brownian_mcmc::collision::Collision;
use brownian_mcmc::error::BmcError;
use brownian_mcmc::distributions::GaussianMixture;
use brownian_mcmc::gradient::{CentralDifference, Potential, PotentialEnergy};
use brownian_mcmc::particle::Sample;
use brownian_mcmc::sampler::{Sampler, SamplerKind};

fn gaussian() -> PotentialEnergy<GaussianMixture, CentralDifference> {
    PotentialEnergy::new(
        GaussianMixture::standard(2).unwrap(),
        CentralDifference::default(),
    )
}

fn hmc() -> Sampler {
    Sampler::from_kind(SamplerKind::Hmc, 0.1, 10)
}

#[test]
fn round_limit_yields_exactly_that_many_samples() {
    const NUM_SAMPLES: usize = 200;
    let config = Config {
        n_particles: 1,
        initial_position: vec![0.0, 0.0],
        rounds: Some(NUM_SAMPLES),
        seed: Some(3),
        ..Config::default()
    };
    let bmc = BrownianMonteCarlo::new(gaussian(), hmc(), Collision::Elastic, config).unwrap();
    let handle = bmc.spawn();

    let samples: Vec<_> = handle.samples().collect();
    assert_eq!(samples.len(), NUM_SAMPLES);
    assert!(samples.iter().all(|s| s.id == 0 && s.position.len() == 2));

    let finished = handle.join().unwrap();
    assert!(finished.samples.is_empty());
    assert!(finished.collided.is_empty());
    assert_eq!(finished.summary.rounds, NUM_SAMPLES);
    let particle = &finished.summary.particles[0];
    assert_eq!(particle.accepted + particle.rejected, NUM_SAMPLES);
    assert_eq!(particle.collisions, 0);
}

#[test]
fn stop_finishes_the_round_in_flight() {
    let n_particles = 3;
    let config = Config {
        n_particles,
        initial_position: vec![0.0, 0.0],
        seed: Some(11),
        ..Config::default()
    };
    let bmc = BrownianMonteCarlo::new(gaussian(), hmc(), Collision::None, config).unwrap();
    let handle = bmc.spawn();

    let received: Vec<_> = (0..25).map_while(|_| handle.recv()).collect();
    assert_eq!(received.len(), 25);

    let finished = handle.stop().unwrap();
    let rounds = finished.summary.rounds;
    assert!(rounds >= 9, "stopped after {rounds} rounds");
    // Every emitted sample is either received before the stop or drained by it.
    assert_eq!(received.len() + finished.samples.len(), rounds * n_particles);
    for p in &finished.summary.particles {
        assert_eq!(p.accepted + p.rejected, rounds);
    }
}

#[test]
fn full_collided_stream_drops_and_counts() {
    let config = Config {
        n_particles: 8,
        radius: 10.0,
        initial_position: vec![0.0, 0.0],
        rounds: Some(50),
        seed: Some(5),
        collided_capacity: 1,
        ..Config::default()
    };
    let bmc = BrownianMonteCarlo::new(gaussian(), hmc(), Collision::Elastic, config).unwrap();
    let finished = bmc.spawn().join().unwrap();

    assert_eq!(finished.samples.len(), 400);
    assert!(finished.collided.len() <= 1);
    let summary = &finished.summary;
    assert!(summary.collisions() > 0);
    assert_eq!(
        summary.dropped_collisions + finished.collided.len(),
        2 * summary.collisions()
    );
}

#[test]
fn closed_sink_is_reported() {
    let config = Config {
        n_particles: 2,
        initial_position: vec![0.0, 0.0],
        seed: Some(1),
        ..Config::default()
    };
    let mut bmc = BrownianMonteCarlo::new(gaussian(), hmc(), Collision::None, config).unwrap();
    let (tx, rx) = mpsc::sync_channel::<Sample>(0);
    drop(rx);
    let report = bmc.round(&tx).unwrap();
    assert!(report.disconnected);
    assert_eq!(report.round, 1);
}

#[test]
fn initial_position_must_match_target_dimension() {
    let config = Config {
        n_particles: 2,
        initial_position: vec![0.0; 3],
        seed: Some(2),
        ..Config::default()
    };
    let res = BrownianMonteCarlo::new(gaussian(), hmc(), Collision::None, config);
    assert!(matches!(res, Err(BmcError::InvalidConfig(_))));
}

/// A potential whose gradient cannot be evaluated.
struct Unsupported;

impl Potential for Unsupported {
    fn energy(&self, x: &Array1<f64>) -> f64 {
        0.5 * x.dot(x)
    }

    fn energy_and_grad(&self, _x: &Array1<f64>, _grad: &mut Array1<f64>) -> f64 {
        panic!("no gradient available")
    }
}

#[test]
fn panicking_driver_is_reported() {
    let config = Config {
        n_particles: 2,
        initial_position: vec![0.0, 0.0],
        rounds: Some(5),
        seed: Some(4),
        ..Config::default()
    };
    let bmc = BrownianMonteCarlo::new(Unsupported, hmc(), Collision::None, config).unwrap();
    let res = bmc.spawn().join();
    assert!(matches!(res, Err(BmcError::DriverPanicked)));
}
