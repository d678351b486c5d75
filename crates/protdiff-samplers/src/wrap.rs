//! Periodic-domain wrapping of sampler states
//!
//! Angular features live on a circle; after every update their values are
//! folded back into `[0, modulus)`.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplingError};

/// Applied to every state the sampler produces, including the starting noise
pub trait WrapPolicy<B: Backend> {
    /// Reject policies that cannot apply to states with `channels` channels
    fn check(&self, _channels: usize) -> Result<()> {
        Ok(())
    }

    fn wrap(&self, x: Tensor<B, 3>) -> Result<Tensor<B, 3>>;
}

/// Modulus for the periodic domain
///
/// Deserializes from either a number or a list with one entry per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoiseModulo {
    /// One modulus for every channel, must be positive
    Scalar(f32),
    /// One modulus per channel; `0.0` leaves that channel unwrapped
    PerChannel(Vec<f32>),
}

impl NoiseModulo {
    /// Convenience for fully angular features
    pub fn two_pi() -> Self {
        Self::Scalar(std::f32::consts::TAU)
    }
}

/// `x mod m` with the sign of `m`, kept strictly below `m` despite rounding
fn floor_mod_scalar<B: Backend>(x: Tensor<B, 3>, m: f32) -> Tensor<B, 3> {
    let r = x.clone() - x.div_scalar(m).floor().mul_scalar(m);
    let r = r.clone().mask_fill(r.clone().lower_elem(0.0), 0.0);
    r.clone().mask_fill(r.greater_equal_elem(m), 0.0)
}

fn floor_mod<B: Backend>(x: Tensor<B, 3>, m: Tensor<B, 3>) -> Tensor<B, 3> {
    let r = x.clone() - (x / m.clone()).floor() * m.clone();
    let r = r.clone().mask_fill(r.clone().lower_elem(0.0), 0.0);
    r.clone().mask_fill(r.greater_equal(m), 0.0)
}

impl<B: Backend> WrapPolicy<B> for NoiseModulo {
    fn check(&self, channels: usize) -> Result<()> {
        match self {
            Self::Scalar(m) => {
                if !(m.is_finite() && *m > 0.0) {
                    return Err(SamplingError::InvalidModulus { value: *m });
                }
            }
            Self::PerChannel(ms) => {
                if ms.len() != channels {
                    return Err(SamplingError::ModuloChannelMismatch {
                        expected: channels,
                        actual: ms.len(),
                    });
                }
                if let Some(m) = ms.iter().find(|m| !(m.is_finite() && **m >= 0.0)) {
                    return Err(SamplingError::InvalidModulus { value: *m });
                }
            }
        }
        Ok(())
    }

    fn wrap(&self, x: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let [batch, len, channels] = x.dims();
        WrapPolicy::<B>::check(self, channels)?;

        match self {
            Self::Scalar(m) => Ok(floor_mod_scalar(x, *m)),
            Self::PerChannel(ms) => {
                let device = x.device();
                let active: Vec<bool> = ms.iter().map(|m| *m > 0.0).collect();
                let divisors: Vec<f32> = ms.iter().map(|m| if *m > 0.0 { *m } else { 1.0 }).collect();

                let divisors = Tensor::<B, 3>::from_data(
                    TensorData::new(divisors, [1, 1, channels]),
                    &device,
                )
                .repeat_dim(0, batch)
                .repeat_dim(1, len);
                let active = Tensor::<B, 3, Bool>::from_data(
                    TensorData::new(active, [1, 1, channels]),
                    &device,
                )
                .repeat_dim(0, batch)
                .repeat_dim(1, len);

                let wrapped = floor_mod(x.clone(), divisors);
                Ok(x.mask_where(active, wrapped))
            }
        }
    }
}

/// `None` leaves states untouched
impl<B: Backend> WrapPolicy<B> for Option<NoiseModulo> {
    fn check(&self, channels: usize) -> Result<()> {
        match self {
            Some(modulo) => WrapPolicy::<B>::check(modulo, channels),
            None => Ok(()),
        }
    }

    fn wrap(&self, x: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        match self {
            Some(modulo) => modulo.wrap(x),
            None => Ok(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn values(x: Tensor<TestBackend, 3>) -> Vec<f32> {
        x.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_scalar_wrap_into_range() {
        let device = Default::default();
        let tau = std::f32::consts::TAU;
        let x = Tensor::<TestBackend, 3>::from_floats(
            [[[-0.5, 7.0], [tau, -tau], [-1e-9, 20.0]]],
            &device,
        );
        let out = values(NoiseModulo::two_pi().wrap(x).unwrap());
        assert!(out.iter().all(|v| (0.0..tau).contains(v)), "{out:?}");
        assert!((out[0] - (tau - 0.5)).abs() < 1e-5);
        assert!((out[1] - (7.0 - tau)).abs() < 1e-5);
    }

    #[test]
    fn test_per_channel_zero_is_unwrapped() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_floats([[[5.0, 5.0], [-3.0, -3.0]]], &device);
        let out = values(NoiseModulo::PerChannel(vec![0.0, 4.0]).wrap(x).unwrap());
        assert_eq!(out, vec![5.0, 1.0, -3.0, 1.0]);
    }

    #[test]
    fn test_per_channel_length_checked() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::zeros([1, 2, 3], &device);
        let err = NoiseModulo::PerChannel(vec![1.0, 1.0]).wrap(x).unwrap_err();
        assert_eq!(
            err,
            SamplingError::ModuloChannelMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_scalar_must_be_positive() {
        let result = WrapPolicy::<TestBackend>::check(&NoiseModulo::Scalar(0.0), 4);
        assert_eq!(result, Err(SamplingError::InvalidModulus { value: 0.0 }));
    }

    #[test]
    fn test_optional_modulo() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_floats([[[-1.0, 9.0]]], &device);

        let unwrapped = WrapPolicy::<TestBackend>::wrap(&None::<NoiseModulo>, x.clone()).unwrap();
        assert_eq!(values(unwrapped), vec![-1.0, 9.0]);
        assert_eq!(WrapPolicy::<TestBackend>::check(&None::<NoiseModulo>, 2), Ok(()));

        let wrapped = WrapPolicy::<TestBackend>::wrap(&Some(NoiseModulo::Scalar(4.0)), x).unwrap();
        assert_eq!(values(wrapped), vec![3.0, 1.0]);
        assert_eq!(
            WrapPolicy::<TestBackend>::check(&Some(NoiseModulo::Scalar(-1.0)), 2),
            Err(SamplingError::InvalidModulus { value: -1.0 })
        );
    }

    #[test]
    fn test_modulo_from_json() {
        let scalar: NoiseModulo = serde_json::from_str("6.283").unwrap();
        assert_eq!(scalar, NoiseModulo::Scalar(6.283));
        let per_channel: NoiseModulo = serde_json::from_str("[0.0, 6.283]").unwrap();
        assert_eq!(per_channel, NoiseModulo::PerChannel(vec![0.0, 6.283]));
    }
}
