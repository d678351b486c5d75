//! Single reverse-diffusion (DDPM ancestral) update

use burn::prelude::*;

use crate::denoiser::{check_prediction, Denoiser};
use crate::error::{Result, SamplingError};
use crate::noise::NoiseSource;
use crate::schedule::{extract, ScheduleTensors};

/// Computes x_{t-1} from x_t
///
/// ```text
/// mean    = sqrt(1/αₜ) · (xₜ - βₜ · ε_θ(xₜ, t) / sqrt(1 - ᾱₜ))
/// x_{t-1} = mean + sqrt(β̃ₜ) · z      for t > 0
/// x_{t-1} = mean                      for t = 0
/// ```
#[derive(Debug, Clone)]
pub struct ReverseStepper<B: Backend> {
    schedule: ScheduleTensors<B>,
}

impl<B: Backend> ReverseStepper<B> {
    pub fn new(schedule: ScheduleTensors<B>) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &ScheduleTensors<B> {
        &self.schedule
    }

    /// Number of timesteps the schedule covers
    pub fn len(&self) -> usize {
        self.schedule.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty()
    }

    /// Denoiser-driven posterior mean at timestep `t_index`
    pub fn model_mean<D>(
        &self,
        denoiser: &D,
        x: Tensor<B, 3>,
        t_index: usize,
        attention_mask: Tensor<B, 2, Bool>,
    ) -> Result<Tensor<B, 3>>
    where
        D: Denoiser<B> + ?Sized,
    {
        self.check_inputs(x.dims(), t_index, &attention_mask)?;
        let t = self.timestep_vector(x.dims()[0], t_index, &x.device());
        self.mean_at(denoiser, x, t, attention_mask)
    }

    /// Perform one reverse step
    ///
    /// The final step (`t_index == 0`) returns the mean and draws no noise.
    pub fn step<D, N>(
        &self,
        denoiser: &D,
        x: Tensor<B, 3>,
        t_index: usize,
        attention_mask: Tensor<B, 2, Bool>,
        noise: &mut N,
    ) -> Result<Tensor<B, 3>>
    where
        D: Denoiser<B> + ?Sized,
        N: NoiseSource<B> + ?Sized,
    {
        let shape = x.dims();
        let device = x.device();
        self.check_inputs(shape, t_index, &attention_mask)?;

        let t = self.timestep_vector(shape[0], t_index, &device);
        let model_mean = self.mean_at(denoiser, x, t.clone(), attention_mask)?;
        if t_index == 0 {
            return Ok(model_mean);
        }

        let posterior_variance_t = extract(self.schedule.posterior_variance.clone(), t, shape);
        let z = noise.standard_normal(shape, &device);
        Ok(model_mean + z * posterior_variance_t.sqrt())
    }

    fn check_inputs(
        &self,
        shape: [usize; 3],
        t_index: usize,
        attention_mask: &Tensor<B, 2, Bool>,
    ) -> Result<()> {
        let [batch, seq_len, _] = shape;
        if t_index >= self.len() {
            return Err(SamplingError::TimestepOutOfRange {
                t_index,
                schedule_len: self.len(),
            });
        }
        if attention_mask.dims() != [batch, seq_len] {
            return Err(SamplingError::MaskShapeMismatch {
                expected: [batch, seq_len],
                actual: attention_mask.dims(),
            });
        }
        Ok(())
    }

    fn mean_at<D>(
        &self,
        denoiser: &D,
        x: Tensor<B, 3>,
        t: Tensor<B, 1, Int>,
        attention_mask: Tensor<B, 2, Bool>,
    ) -> Result<Tensor<B, 3>>
    where
        D: Denoiser<B> + ?Sized,
    {
        let shape = x.dims();
        let betas_t = extract(self.schedule.betas.clone(), t.clone(), shape);
        let sqrt_one_minus_alphas_cumprod_t = extract(
            self.schedule.sqrt_one_minus_alphas_cumprod.clone(),
            t.clone(),
            shape,
        );
        let sqrt_recip_alphas_t = extract(self.schedule.sqrt_recip_alphas.clone(), t.clone(), shape);

        let predicted = denoiser.predict_noise(x.clone(), t, attention_mask);
        check_prediction(&x, &predicted)?;

        Ok((x - predicted * betas_t / sqrt_one_minus_alphas_cumprod_t) * sqrt_recip_alphas_t)
    }

    fn timestep_vector(&self, batch: usize, t_index: usize, device: &B::Device) -> Tensor<B, 1, Int> {
        Tensor::full([batch], t_index as i64, device)
    }
}
