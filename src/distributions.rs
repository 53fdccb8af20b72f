/*!
Target densities for the ensemble sampler.

A target only has to provide a (possibly unnormalized) density through [`Density`]. The
sampler works with the potential energy `U(x) = -log density(x)`; how its gradient is
obtained is decided by a gradient provider (see [`crate::gradient`]). Targets that can also
be written as `burn` tensor programs implement [`TensorDensity`], which makes exact
autodiff gradients available.

The built-in targets are isotropic Gaussian mixtures, available by name through
[`target_by_name`]:

| name         | dim | modes |
|--------------|-----|-------|
| `Gaussian`   | any | 1 (standard normal) |
| `AsymMOG2d`  | 2   | 3, asymmetric widths |
| `Sym16GM2d`  | 2   | 16 on a 4×4 grid |
| `AsymMOG10d` | 10  | 3 along the diagonal |

# Examples

```rust
use brownian_mcmc::distributions::{target_by_name, Density};
use ndarray::arr1;

let target = target_by_name("Sym16GM2d", None).expect("known target");
let lp = target.log_density(&arr1(&[0.0, 0.0]));
assert!((lp - (1.0_f64 / 16.0).ln()).abs() < 1e-9);
```
*/

use burn::prelude::*;
use burn::tensor::ElementConversion;
use ndarray::Array1;

use crate::error::{BmcError, Result};

/// A continuous target density.
pub trait Density: Send + Sync {
    /// Returns the (unnormalized) density at `x`.
    fn density(&self, x: &Array1<f64>) -> f64;

    /// Returns the log of the (unnormalized) density at `x`.
    ///
    /// Override this when the log can be computed without going through `exp`.
    fn log_density(&self, x: &Array1<f64>) -> f64 {
        self.density(x).ln()
    }

    /// Dimension of the support, when the target has a fixed one.
    fn dim(&self) -> Option<usize> {
        None
    }
}

/// A density expressed as a `burn` tensor program, so gradients can be taken by autodiff.
pub trait TensorDensity<B: Backend>: Send + Sync {
    /// Log density of a single position of shape `[D]`, returned as a tensor of shape `[1]`.
    fn log_density_tensor(&self, x: Tensor<B, 1>) -> Tensor<B, 1>;

    fn dim(&self) -> Option<usize> {
        None
    }
}

/// One isotropic Gaussian bump `weight * exp(-precision/2 * |x - mean|^2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub mean: Array1<f64>,
    pub precision: f64,
    pub weight: f64,
}

/// A mixture of isotropic Gaussian bumps.
///
/// The bumps carry no `(2π)^{-d/2}` normalizer, matching how the named targets are defined;
/// samplers only ever need the density up to a constant.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    components: Vec<Component>,
    dim: usize,
}

impl GaussianMixture {
    /// Creates a mixture from its components. All means must share one dimension.
    pub fn new(components: Vec<Component>) -> Result<Self> {
        let dim = components
            .first()
            .map(|c| c.mean.len())
            .ok_or_else(|| BmcError::InvalidConfig("mixture needs a component".into()))?;
        if dim == 0 {
            return Err(BmcError::InvalidConfig("mixture dimension must be positive".into()));
        }
        if let Some(bad) = components.iter().find(|c| c.mean.len() != dim) {
            return Err(BmcError::InvalidConfig(format!(
                "component mean has dimension {}, expected {dim}",
                bad.mean.len()
            )));
        }
        if components
            .iter()
            .any(|c| !(c.precision > 0.0 && c.weight > 0.0))
        {
            return Err(BmcError::InvalidConfig(
                "mixture precisions and weights must be positive".into(),
            ));
        }
        Ok(Self { components, dim })
    }

    /// Equal-weight mixture of bumps sharing `1/k` weights.
    fn equal_weights(modes: Vec<(Array1<f64>, f64)>) -> Result<Self> {
        let weight = 1.0 / modes.len() as f64;
        Self::new(
            modes
                .into_iter()
                .map(|(mean, precision)| Component {
                    mean,
                    precision,
                    weight,
                })
                .collect(),
        )
    }

    /// Standard normal in `dim` dimensions.
    pub fn standard(dim: usize) -> Result<Self> {
        Self::equal_weights(vec![(Array1::zeros(dim), 1.0)])
    }

    /// Asymmetric three-mode mixture in 2-D with precisions 0.5, 1 and 2.
    pub fn asym_mog_2d() -> Result<Self> {
        let shift = 4.0 * 3.0_f64.sqrt() + 1.0;
        Self::equal_weights(vec![
            (Array1::from(vec![shift, 1.0]), 0.5),
            (Array1::from(vec![-shift, 1.0]), 1.0),
            (Array1::from(vec![3.0, -11.0]), 2.0),
        ])
    }

    /// Sixteen unit-precision modes on the grid `{0, 10, 20, 30}^2`.
    pub fn sym_16_gm_2d() -> Result<Self> {
        let width = 4;
        Self::equal_weights(
            (0..16)
                .map(|i| {
                    let (a, b) = ((i / width) as f64, (i % width) as f64);
                    (Array1::from(vec![a * 10.0, b * 10.0]), 1.0)
                })
                .collect(),
        )
    }

    /// Three unit-precision modes at `0`, `5·1` and `10·1` in `dim` dimensions.
    pub fn asym_mog(dim: usize) -> Result<Self> {
        Self::equal_weights(
            (0..3)
                .map(|i| (Array1::from_elem(dim, i as f64 * 5.0), 1.0))
                .collect(),
        )
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Per-component log terms `ln w_k - precision_k/2 * |x - mu_k|^2`.
    fn log_terms(&self, x: &Array1<f64>) -> Vec<f64> {
        self.components
            .iter()
            .map(|c| {
                let diff = x - &c.mean;
                c.weight.ln() - 0.5 * c.precision * diff.dot(&diff)
            })
            .collect()
    }
}

fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

impl Density for GaussianMixture {
    fn density(&self, x: &Array1<f64>) -> f64 {
        self.log_density(x).exp()
    }

    fn log_density(&self, x: &Array1<f64>) -> f64 {
        log_sum_exp(&self.log_terms(x))
    }

    fn dim(&self) -> Option<usize> {
        Some(self.dim)
    }
}

impl<B: Backend> TensorDensity<B> for GaussianMixture {
    fn dim(&self) -> Option<usize> {
        Some(self.dim)
    }

    fn log_density_tensor(&self, x: Tensor<B, 1>) -> Tensor<B, 1> {
        let device = x.device();
        let terms: Vec<Tensor<B, 1>> = self
            .components
            .iter()
            .map(|c| {
                let data = TensorData::new(c.mean.to_vec(), [self.dim]).convert::<B::FloatElem>();
                let mean = Tensor::<B, 1>::from_data(data, &device);
                (x.clone() - mean)
                    .powi_scalar(2)
                    .sum()
                    .mul_scalar(-0.5 * c.precision)
                    .add_scalar(c.weight.ln())
            })
            .collect();
        let stacked = Tensor::cat(terms, 0);
        // The shift is a constant, so it does not change the gradient.
        let shift = stacked.clone().max().into_scalar().elem::<f64>();
        stacked.sub_scalar(shift).exp().sum().log().add_scalar(shift)
    }
}

/// Looks up a named target.
///
/// `dim` sets the dimension of `Gaussian` (2 when absent). For the fixed-dimension targets it
/// may be omitted, but must match when given.
pub fn target_by_name(name: &str, dim: Option<usize>) -> Result<GaussianMixture> {
    let target = match name {
        "Gaussian" => return GaussianMixture::standard(dim.unwrap_or(2)),
        "AsymMOG2d" => GaussianMixture::asym_mog_2d()?,
        "Sym16GM2d" => GaussianMixture::sym_16_gm_2d()?,
        "AsymMOG10d" => GaussianMixture::asym_mog(10)?,
        _ => return Err(BmcError::UnknownDistribution(name.to_string())),
    };
    match dim {
        Some(d) if d != target.dim() => Err(BmcError::InvalidConfig(format!(
            "{name} is {}-dimensional, got dimension {d}",
            target.dim()
        ))),
        _ => Ok(target),
    }
}
