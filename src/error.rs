//! Error types for the Brownian Monte Carlo sampler.

use thiserror::Error;

/// Errors raised while configuring or running a sampling run.
#[derive(Error, Debug)]
pub enum BmcError {
    /// The proposal kernel name is not one of the registered samplers.
    #[error("unknown sampler `{0}` (expected `hmc` or `nuts`)")]
    UnknownSampler(String),

    /// The collision name is not one of the registered resolvers.
    #[error("unknown collision `{0}` (expected `none` or `elastic`)")]
    UnknownCollision(String),

    /// The target distribution name is not in the registry.
    #[error("unknown target distribution `{0}`")]
    UnknownDistribution(String),

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The momentum covariance `mass * I` has no Cholesky factor.
    #[error("momentum covariance is not positive definite (mass = {mass})")]
    NotPositiveDefinite { mass: f64 },

    /// Statistics counters were touched before the first round.
    #[error("statistics counters of particle {id} are not zero before the first round")]
    CountersNotZeroed { id: usize },

    /// The driver thread panicked before returning a result.
    ///
    /// Only observable when panics unwind; with `panic = "abort"` the process ends instead.
    #[error("sampling thread panicked")]
    DriverPanicked,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BmcError>;
