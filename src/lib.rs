pub mod adapt;
pub mod bmc;
pub mod collision;
pub mod distributions;
pub mod error;
pub mod gradient;
pub mod hamiltonian;
pub mod hmc;
pub mod io;
pub mod nuts;
pub mod particle;
pub mod sampler;
pub mod stats;
