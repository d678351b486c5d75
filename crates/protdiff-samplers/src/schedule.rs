//! Noise schedules for reverse diffusion
//!
//! A [`BetaSchedule`] holds one variance per training timestep. Everything the
//! sampler needs per step is derived from it once ([`DerivedCoefficients`]) and
//! uploaded to the device once ([`ScheduleTensors`]).

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplingError};

// ============================================================================
// Schedule Configuration
// ============================================================================

/// Shape of the beta curve over timesteps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaScheduleKind {
    /// Evenly spaced betas
    Linear,
    /// Improved-DDPM cosine schedule on ᾱ
    #[default]
    Cosine,
    /// Evenly spaced sqrt(beta), squared
    Quadratic,
    /// Sigmoid ramp between `beta_start` and `beta_end`
    Sigmoid,
}

/// Beta schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub kind: BetaScheduleKind,
    /// Number of diffusion timesteps (T)
    pub timesteps: usize,
    /// First beta (linear, quadratic, sigmoid)
    pub beta_start: f64,
    /// Last beta (linear, quadratic, sigmoid)
    pub beta_end: f64,
    /// Offset `s` of the cosine schedule
    pub cosine_s: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            kind: BetaScheduleKind::Cosine,
            timesteps: 250,
            beta_start: 1e-4,
            beta_end: 0.02,
            cosine_s: 0.008,
        }
    }
}

impl ScheduleConfig {
    /// Build the beta schedule described by this config
    pub fn build(&self) -> Result<BetaSchedule> {
        match self.kind {
            BetaScheduleKind::Linear => {
                BetaSchedule::linear(self.timesteps, self.beta_start, self.beta_end)
            }
            BetaScheduleKind::Cosine => BetaSchedule::cosine(self.timesteps, self.cosine_s),
            BetaScheduleKind::Quadratic => {
                BetaSchedule::quadratic(self.timesteps, self.beta_start, self.beta_end)
            }
            BetaScheduleKind::Sigmoid => {
                BetaSchedule::sigmoid(self.timesteps, self.beta_start, self.beta_end)
            }
        }
    }
}

fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    if steps <= 1 {
        return vec![start];
    }
    let delta = (end - start) / (steps - 1) as f64;
    (0..steps).map(|i| start + delta * i as f64).collect()
}

// ============================================================================
// Beta Schedule
// ============================================================================

/// Per-timestep variances, each strictly inside (0, 1)
#[derive(Debug, Clone, PartialEq)]
pub struct BetaSchedule {
    betas: Vec<f32>,
}

impl BetaSchedule {
    /// Wrap explicit betas, rejecting empty schedules and values outside (0, 1)
    pub fn new(betas: Vec<f32>) -> Result<Self> {
        if betas.is_empty() {
            return Err(SamplingError::EmptySchedule);
        }
        if let Some((index, &value)) = betas
            .iter()
            .enumerate()
            .find(|(_, b)| !(**b > 0.0 && **b < 1.0))
        {
            return Err(SamplingError::InvalidBeta { index, value });
        }
        Ok(Self { betas })
    }

    /// Linear schedule from `beta_start` to `beta_end`
    pub fn linear(timesteps: usize, beta_start: f64, beta_end: f64) -> Result<Self> {
        if timesteps == 0 {
            return Err(SamplingError::EmptySchedule);
        }
        Self::new(
            linspace(beta_start, beta_end, timesteps)
                .into_iter()
                .map(|b| b as f32)
                .collect(),
        )
    }

    /// Quadratic schedule: linear in sqrt(beta)
    pub fn quadratic(timesteps: usize, beta_start: f64, beta_end: f64) -> Result<Self> {
        if timesteps == 0 {
            return Err(SamplingError::EmptySchedule);
        }
        Self::new(
            linspace(beta_start.sqrt(), beta_end.sqrt(), timesteps)
                .into_iter()
                .map(|b| (b * b) as f32)
                .collect(),
        )
    }

    /// Sigmoid ramp over [-6, 6] rescaled to [beta_start, beta_end]
    pub fn sigmoid(timesteps: usize, beta_start: f64, beta_end: f64) -> Result<Self> {
        if timesteps == 0 {
            return Err(SamplingError::EmptySchedule);
        }
        Self::new(
            linspace(-6.0, 6.0, timesteps)
                .into_iter()
                .map(|x| {
                    let s = 1.0 / (1.0 + (-x).exp());
                    (s * (beta_end - beta_start) + beta_start) as f32
                })
                .collect(),
        )
    }

    /// Cosine schedule (Nichol & Dhariwal), betas clipped to [1e-4, 0.9999]
    pub fn cosine(timesteps: usize, s: f64) -> Result<Self> {
        if timesteps == 0 {
            return Err(SamplingError::EmptySchedule);
        }
        let n = timesteps as f64;
        let alphas_cumprod: Vec<f64> = (0..=timesteps)
            .map(|x| {
                let angle = ((x as f64 / n) + s) / (1.0 + s) * std::f64::consts::FRAC_PI_2;
                angle.cos().powi(2)
            })
            .collect();

        let betas = alphas_cumprod
            .windows(2)
            .map(|w| {
                let beta = 1.0 - w[1] / w[0];
                beta.clamp(1e-4, 0.9999) as f32
            })
            .collect();
        Self::new(betas)
    }

    pub fn len(&self) -> usize {
        self.betas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.betas.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.betas
    }

    /// Derive alphas and their products from the betas
    pub fn coefficients(&self) -> DerivedCoefficients {
        DerivedCoefficients::from_betas(self)
    }

    /// Variance of the DDPM posterior q(x_{t-1} | x_t, x_0)
    ///
    /// β̃_t = β_t · (1 - ᾱ_{t-1}) / (1 - ᾱ_t), with ᾱ_{-1} = 1
    pub fn posterior_variance(&self) -> Vec<f32> {
        let coeffs = self.coefficients();
        coeffs
            .alphas_cumprod
            .iter()
            .enumerate()
            .map(|(t, &alpha_prod_t)| {
                let alpha_prod_t_prev = if t > 0 {
                    coeffs.alphas_cumprod[t - 1]
                } else {
                    1.0
                };
                self.betas[t] * (1.0 - alpha_prod_t_prev) / (1.0 - alpha_prod_t)
            })
            .collect()
    }
}

// ============================================================================
// Derived Coefficients
// ============================================================================

/// Host-side coefficients, one entry per timestep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedCoefficients {
    pub betas: Vec<f32>,
    /// αₜ = 1 - βₜ
    pub alphas: Vec<f32>,
    /// sqrt(1 / αₜ)
    pub sqrt_recip_alphas: Vec<f32>,
    /// ᾱₜ = ∏_{s ≤ t} αₛ
    pub alphas_cumprod: Vec<f32>,
    /// sqrt(1 - ᾱₜ)
    pub sqrt_one_minus_alphas_cumprod: Vec<f32>,
}

impl DerivedCoefficients {
    pub fn from_betas(schedule: &BetaSchedule) -> Self {
        let betas = schedule.as_slice().to_vec();
        let alphas: Vec<f32> = betas.iter().map(|b| 1.0 - b).collect();
        let sqrt_recip_alphas = alphas.iter().map(|a| (1.0 / a).sqrt()).collect();

        let mut alphas_cumprod = Vec::with_capacity(alphas.len());
        let mut cumprod = 1.0f32;
        for alpha in &alphas {
            cumprod *= alpha;
            alphas_cumprod.push(cumprod);
        }

        let sqrt_one_minus_alphas_cumprod =
            alphas_cumprod.iter().map(|a| (1.0 - a).sqrt()).collect();

        Self {
            betas,
            alphas,
            sqrt_recip_alphas,
            alphas_cumprod,
            sqrt_one_minus_alphas_cumprod,
        }
    }

    pub fn len(&self) -> usize {
        self.betas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.betas.is_empty()
    }
}

// ============================================================================
// Device Tensors
// ============================================================================

/// The coefficients the reverse step reads, resident on the device
#[derive(Debug, Clone)]
pub struct ScheduleTensors<B: Backend> {
    pub betas: Tensor<B, 1>,
    pub sqrt_recip_alphas: Tensor<B, 1>,
    pub sqrt_one_minus_alphas_cumprod: Tensor<B, 1>,
    pub posterior_variance: Tensor<B, 1>,
    len: usize,
}

impl<B: Backend> ScheduleTensors<B> {
    /// Upload the schedule and a caller-supplied posterior variance
    pub fn new(
        schedule: &BetaSchedule,
        posterior_variance: &[f32],
        device: &B::Device,
    ) -> Result<Self> {
        let len = schedule.len();
        if posterior_variance.len() != len {
            return Err(SamplingError::PosteriorVarianceLength {
                expected: len,
                actual: posterior_variance.len(),
            });
        }
        if let Some((index, &value)) = posterior_variance
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v >= 0.0))
        {
            return Err(SamplingError::InvalidPosteriorVariance { index, value });
        }

        let coeffs = schedule.coefficients();
        let upload = |values: &[f32]| {
            Tensor::<B, 1>::from_data(TensorData::new(values.to_vec(), [len]), device)
        };

        Ok(Self {
            betas: upload(&coeffs.betas),
            sqrt_recip_alphas: upload(&coeffs.sqrt_recip_alphas),
            sqrt_one_minus_alphas_cumprod: upload(&coeffs.sqrt_one_minus_alphas_cumprod),
            posterior_variance: upload(posterior_variance),
            len,
        })
    }

    /// Upload the schedule with its own DDPM posterior variance
    pub fn with_posterior_variance(schedule: &BetaSchedule, device: &B::Device) -> Result<Self> {
        Self::new(schedule, &schedule.posterior_variance(), device)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Gather `coefficients[t[b]]` for every batch element and shape the result
/// `[batch, 1, .., 1]` so it broadcasts against a tensor of `shape`
pub fn extract<B: Backend, const D: usize>(
    coefficients: Tensor<B, 1>,
    t: Tensor<B, 1, Int>,
    shape: [usize; D],
) -> Tensor<B, D> {
    let mut dims = [1usize; D];
    dims[0] = shape[0];
    coefficients.select(0, t).reshape(dims)
}
