//! Sources of Gaussian noise
//!
//! Randomness is always passed in explicitly so that two runs with the same
//! seed produce the same samples regardless of what else touched a global RNG.

use burn::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Supplies standard-normal tensors to the sampler
pub trait NoiseSource<B: Backend> {
    /// Draw a tensor of independent N(0, 1) values
    fn standard_normal(&mut self, shape: [usize; 3], device: &B::Device) -> Tensor<B, 3>;
}

/// Host-side noise from a seeded [`StdRng`]
#[derive(Debug, Clone)]
pub struct SeededNoise {
    rng: StdRng,
}

impl SeededNoise {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl<B: Backend> NoiseSource<B> for SeededNoise {
    fn standard_normal(&mut self, shape: [usize; 3], device: &B::Device) -> Tensor<B, 3> {
        let n: usize = shape.iter().product();
        let values: Vec<f32> = (0..n)
            .map(|_| self.rng.sample::<f32, _>(StandardNormal))
            .collect();
        Tensor::from_data(TensorData::new(values, shape), device)
    }
}

/// Fills every draw with the same value
///
/// Useful for checking which parts of a computation depend on the noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantNoise(pub f32);

impl<B: Backend> NoiseSource<B> for ConstantNoise {
    fn standard_normal(&mut self, shape: [usize; 3], device: &B::Device) -> Tensor<B, 3> {
        Tensor::full(shape, self.0, device)
    }
}
