//! Potential energies and the gradient providers that differentiate them.
//!
//! The samplers only see [`Potential`]: a function `U(x)` that can also write `∇U(x)` into a
//! caller-owned buffer. Two ways of building one are provided:
//!
//! * [`PotentialEnergy`] wraps any [`Density`] as `U = -log density` and asks a
//!   [`GradientProvider`] (e.g. [`CentralDifference`]) for the gradient.
//! * [`Autodiff`] evaluates a [`TensorDensity`] on a `burn` autodiff backend and reads the exact
//!   gradient back from the backward pass.

use std::marker::PhantomData;
use std::sync::Arc;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use ndarray::Array1;

use crate::distributions::{Density, TensorDensity};

/// Potential energy `U(x)` together with its gradient.
pub trait Potential: Send + Sync {
    /// Returns `U(x)`.
    fn energy(&self, x: &Array1<f64>) -> f64;

    /// Returns `U(x)` and writes `∇U(x)` into `grad`.
    fn energy_and_grad(&self, x: &Array1<f64>, grad: &mut Array1<f64>) -> f64;

    /// Dimension the potential is defined on, if it is fixed.
    fn dim(&self) -> Option<usize> {
        None
    }
}

impl<P: Potential + ?Sized> Potential for Box<P> {
    fn energy(&self, x: &Array1<f64>) -> f64 {
        (**self).energy(x)
    }

    fn energy_and_grad(&self, x: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        (**self).energy_and_grad(x, grad)
    }

    fn dim(&self) -> Option<usize> {
        (**self).dim()
    }
}

impl<P: Potential + ?Sized> Potential for Arc<P> {
    fn energy(&self, x: &Array1<f64>) -> f64 {
        (**self).energy(x)
    }

    fn energy_and_grad(&self, x: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        (**self).energy_and_grad(x, grad)
    }

    fn dim(&self) -> Option<usize> {
        (**self).dim()
    }
}

/// Computes the gradient of a scalar function at a point.
pub trait GradientProvider: Send + Sync {
    fn gradient(&self, f: &dyn Fn(&Array1<f64>) -> f64, x: &Array1<f64>, grad: &mut Array1<f64>);
}

/// Second-order central differences with a fixed step `h`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralDifference {
    pub h: f64,
}

impl Default for CentralDifference {
    fn default() -> Self {
        Self { h: 1e-5 }
    }
}

impl GradientProvider for CentralDifference {
    fn gradient(&self, f: &dyn Fn(&Array1<f64>) -> f64, x: &Array1<f64>, grad: &mut Array1<f64>) {
        let mut shifted = x.clone();
        for i in 0..x.len() {
            let xi = x[i];
            shifted[i] = xi + self.h;
            let forward = f(&shifted);
            shifted[i] = xi - self.h;
            let backward = f(&shifted);
            shifted[i] = xi;
            grad[i] = (forward - backward) / (2.0 * self.h);
        }
    }
}

/// `U(x) = -log density(x)` with gradients from a [`GradientProvider`].
#[derive(Debug, Clone)]
pub struct PotentialEnergy<D, G> {
    density: D,
    provider: G,
}

impl<D: Density, G: GradientProvider> PotentialEnergy<D, G> {
    pub fn new(density: D, provider: G) -> Self {
        Self { density, provider }
    }

    pub fn density(&self) -> &D {
        &self.density
    }
}

impl<D: Density, G: GradientProvider> Potential for PotentialEnergy<D, G> {
    fn energy(&self, x: &Array1<f64>) -> f64 {
        -self.density.log_density(x)
    }

    fn energy_and_grad(&self, x: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        let f = |y: &Array1<f64>| -self.density.log_density(y);
        self.provider.gradient(&f, x, grad);
        f(x)
    }

    fn dim(&self) -> Option<usize> {
        self.density.dim()
    }
}

/// Exact gradients of `-log density` via a `burn` autodiff backend.
///
/// # Type Parameters
///
/// * `B`: An autodiff backend, e.g. `Autodiff<NdArray<f64>>`.
/// * `D`: The density, written as a tensor program.
pub struct Autodiff<B, D> {
    density: D,
    _backend: PhantomData<fn() -> B>,
}

impl<B, D> Autodiff<B, D>
where
    B: AutodiffBackend,
    D: TensorDensity<B>,
{
    pub fn new(density: D) -> Self {
        Self {
            density,
            _backend: PhantomData,
        }
    }

    fn to_tensor(x: &Array1<f64>) -> Tensor<B, 1> {
        let data = TensorData::new(x.to_vec(), [x.len()]).convert::<B::FloatElem>();
        Tensor::<B, 1>::from_data(data, &B::Device::default())
    }
}

impl<B, D> Potential for Autodiff<B, D>
where
    B: AutodiffBackend,
    D: TensorDensity<B>,
{
    fn energy(&self, x: &Array1<f64>) -> f64 {
        let logp = self.density.log_density_tensor(Self::to_tensor(x));
        -logp.into_scalar().elem::<f64>()
    }

    fn dim(&self) -> Option<usize> {
        self.density.dim()
    }

    fn energy_and_grad(&self, x: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        let position = Self::to_tensor(x).require_grad();
        let logp = self.density.log_density_tensor(position.clone());
        let value = logp.clone().into_scalar().elem::<f64>();
        let grads = logp.backward();
        let values = position
            .grad(&grads)
            .map(|g| g.into_data().convert::<f64>().to_vec::<f64>());
        match values {
            Some(Ok(values)) if values.len() == grad.len() => grad
                .iter_mut()
                .zip(values)
                .for_each(|(g, v)| *g = -v),
            // No gradient reached the input; NaN makes the proposal fail its accept test.
            _ => grad.fill(f64::NAN),
        }
        -value
    }
}
