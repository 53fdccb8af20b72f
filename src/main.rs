//! `bmc`: sample a named target with an ensemble of colliding HMC/NUTS particles and save the
//! samples as CSV.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use brownian_mcmc::bmc::{BrownianMonteCarlo, Config};
use brownian_mcmc::collision::Collision;
use brownian_mcmc::distributions::target_by_name;
use brownian_mcmc::gradient::{Autodiff, CentralDifference, Potential, PotentialEnergy};
use brownian_mcmc::io::csv::{file_stem, save_samples};
use brownian_mcmc::particle::{Masses, Sample};
use brownian_mcmc::sampler::{Sampler, SamplerKind};
use burn::backend::NdArray;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

type BackendType = burn::backend::Autodiff<NdArray<f64>>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GradientKind {
    /// Exact gradients through burn's autodiff backend
    Autodiff,
    /// Central finite differences
    Numeric,
}

#[derive(Parser, Debug)]
#[command(name = "bmc")]
#[command(about = "Brownian Monte Carlo: interacting Hamiltonian samplers")]
#[command(version)]
struct Cli {
    /// Number of particles
    #[arg(long, default_value_t = default_particles())]
    num_particles: usize,

    /// Number of samples to collect over all particles
    #[arg(long, default_value_t = 1000)]
    num_samples: usize,

    /// Leapfrog steps per HMC proposal
    #[arg(long, default_value_t = 10)]
    num_steps: usize,

    /// Leapfrog step size; 0 adapts it per particle by dual averaging
    #[arg(long, default_value_t = 0.1)]
    step_size: f64,

    /// Last round of step-size adaptation
    #[arg(long, default_value_t = 1000)]
    max_adapt: usize,

    /// Target acceptance of step-size adaptation
    #[arg(long, default_value_t = 0.5)]
    target_accept: f64,

    /// Collision variant (elastic, none)
    #[arg(long, default_value = "elastic")]
    collision: Collision,

    /// Proposal kernel (hmc, nuts)
    #[arg(long, default_value = "nuts")]
    mcmc: SamplerKind,

    /// Initial interaction radius
    #[arg(long, default_value_t = 1.0)]
    radius: f64,

    /// Masses: `m` (uniform), `scaled:m` (m·(i+1)) or `m0,m1,...`
    #[arg(long, default_value = "1.0")]
    mass: Masses,

    /// Target distribution (Gaussian, AsymMOG2d, Sym16GM2d, AsymMOG10d)
    #[arg(long, default_value = "Gaussian")]
    dist: String,

    /// Target dimension; `Gaussian` defaults to 2, fixed-dimension targets must match
    #[arg(long)]
    dim: Option<usize>,

    /// Gradient provider
    #[arg(long, value_enum, default_value_t = GradientKind::Autodiff)]
    gradient: GradientKind,

    /// Base seed; particle i uses seed + i
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory of the CSV file
    #[arg(long, default_value = "csv")]
    output: PathBuf,

    /// Print every sample
    #[arg(long)]
    verbose: bool,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
}

fn default_particles() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    let target = target_by_name(&cli.dist, cli.dim)?;
    let config = Config {
        n_particles: cli.num_particles,
        masses: cli.mass.clone(),
        radius: cli.radius,
        initial_position: vec![0.0; target.dim()],
        max_adapt: cli.max_adapt,
        target_accept: cli.target_accept,
        seed: cli.seed,
        ..Config::default()
    };
    let sampler = Sampler::from_kind(cli.mcmc, cli.step_size, cli.num_steps);

    match cli.gradient {
        GradientKind::Autodiff => run(&cli, Autodiff::<BackendType, _>::new(target), sampler, config),
        GradientKind::Numeric => run(
            &cli,
            PotentialEnergy::new(target, CentralDifference::default()),
            sampler,
            config,
        ),
    }
}

/// Share of samples whose position differs from the particle's previous one.
///
/// A lower bound on the acceptance rate seen from the sample stream alone: an accepted
/// proposal that lands on the old position is not counted. The exact per-particle counters
/// are printed with the run summary.
struct MoveRate {
    last: Vec<Vec<f64>>,
    moved: usize,
    seen: usize,
}

impl MoveRate {
    fn new(initial: Vec<f64>, n_particles: usize) -> Self {
        Self {
            last: vec![initial; n_particles],
            moved: 0,
            seen: 0,
        }
    }

    fn observe(&mut self, sample: &Sample) {
        self.seen += 1;
        if let Some(last) = self.last.get_mut(sample.id) {
            if *last != sample.position {
                self.moved += 1;
                last.clone_from(&sample.position);
            }
        }
    }

    fn rate(&self) -> f64 {
        if self.seen == 0 {
            return 0.0;
        }
        self.moved as f64 / self.seen as f64
    }
}

fn run<P: Potential + 'static>(
    cli: &Cli,
    potential: P,
    sampler: Sampler,
    config: Config,
) -> Result<(), Box<dyn Error>> {
    let initial = config.initial_position.clone();
    let bmc = BrownianMonteCarlo::new(potential, sampler, cli.collision, config)?;
    let begin = Instant::now();
    let handle = bmc.spawn();

    let pb = ProgressBar::new(cli.num_samples as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );
    pb.set_prefix(sampler.to_string());

    let mut moves = MoveRate::new(initial, cli.num_particles);
    let mut collided = 0usize;
    let mut samples = Vec::with_capacity(cli.num_samples);
    while samples.len() < cli.num_samples {
        let Some(sample) = handle.recv() else {
            break;
        };
        moves.observe(&sample);
        collided += handle.collided().try_iter().count();
        if cli.verbose {
            pb.println(format!("{} {:?}", samples.len(), sample));
        }
        samples.push(sample);
        pb.set_message(format!(
            "moved ~{:.3}, collided {}",
            moves.rate(),
            collided
        ));
        pb.inc(1);
    }

    let finished = handle.stop()?;
    pb.finish_with_message("Done!");
    println!("[{:.2?}]", begin.elapsed());
    print!("{}", finished.summary);

    fs::create_dir_all(&cli.output)?;
    let stem = file_stem(
        cli.mcmc,
        cli.collision,
        &cli.dist,
        cli.num_particles,
        cli.radius,
        samples.len(),
    );
    let path = cli.output.join(format!("{stem}.csv"));
    save_samples(&samples, &finished.summary, &path)?;
    info!(path = %path.display(), samples = samples.len(), "samples written");
    Ok(())
}
