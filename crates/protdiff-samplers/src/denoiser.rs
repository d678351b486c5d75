//! The noise-prediction model seen by the sampler

use burn::prelude::*;

use crate::error::{Result, SamplingError};

/// Predicts the noise present in a state at a given timestep
///
/// Receives the state `[batch, len, channels]`, one timestep per batch
/// element and the attention mask `[batch, len]` (`true` = valid position),
/// and returns a noise estimate with the same shape and dtype as the state.
pub trait Denoiser<B: Backend> {
    fn predict_noise(
        &self,
        x: Tensor<B, 3>,
        timesteps: Tensor<B, 1, Int>,
        attention_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3>;
}

impl<B, F> Denoiser<B> for F
where
    B: Backend,
    F: Fn(Tensor<B, 3>, Tensor<B, 1, Int>, Tensor<B, 2, Bool>) -> Tensor<B, 3>,
{
    fn predict_noise(
        &self,
        x: Tensor<B, 3>,
        timesteps: Tensor<B, 1, Int>,
        attention_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        self(x, timesteps, attention_mask)
    }
}

/// Reject a prediction that does not line up with the state it was made from
pub(crate) fn check_prediction<B: Backend>(
    x: &Tensor<B, 3>,
    predicted: &Tensor<B, 3>,
) -> Result<()> {
    if predicted.dims() != x.dims() {
        return Err(SamplingError::DenoiserShape {
            expected: x.dims(),
            actual: predicted.dims(),
        });
    }
    if predicted.dtype() != x.dtype() {
        return Err(SamplingError::DenoiserDType {
            expected: x.dtype(),
            actual: predicted.dtype(),
        });
    }
    Ok(())
}
