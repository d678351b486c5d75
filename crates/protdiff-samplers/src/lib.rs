//! Reverse-diffusion sampling for variable-length protein structures
//!
//! Starting from Gaussian noise, a trained denoiser is applied once per
//! timestep (T-1 down to 0) to produce a batch of padded structure
//! representations `[batch, max_len, channels]`, which are then trimmed to the
//! true length of each example.
//!
//! # Modules
//!
//! - [`schedule`] - Beta schedules and the coefficients derived from them
//! - [`mask`] - Attention masks from sequence lengths
//! - [`step`] - One DDPM reverse update
//! - [`sampler`] - The full timestep loop and batch trimming
//! - [`wrap`] - Periodic-domain wrapping for angular features
//! - [`noise`] - Explicit, seedable noise sources
//! - [`denoiser`] - The model interface the sampler calls
//!
//! # Example
//!
//! ```ignore
//! use protdiff_samplers::{BetaSchedule, DiffusionSampler, NoiseModulo, SampleRequest,
//!     SamplerConfig, SeededNoise};
//!
//! let schedule = BetaSchedule::cosine(1000, 0.008)?;
//! let config = SamplerConfig { modulo: Some(NoiseModulo::two_pi()), ..Default::default() };
//! let sampler = DiffusionSampler::new(&schedule, &schedule.posterior_variance(), config, &device)?;
//!
//! let request = SampleRequest::new(vec![64, 128], 128, 4, 1000);
//! let structures = sampler.sample(&model, &request, &mut SeededNoise::new(0))?;
//! ```

pub mod denoiser;
pub mod error;
pub mod mask;
pub mod noise;
pub mod sampler;
pub mod schedule;
pub mod step;
pub mod wrap;

pub use denoiser::Denoiser;
pub use error::{ErrorKind, Result, SamplingError};
pub use mask::{lengths_to_attention_mask, validate_lengths};
pub use noise::{ConstantNoise, NoiseSource, SeededNoise};
pub use sampler::{DiffusionSampler, SampleRequest, SamplerConfig, Trajectory, TrajectoryMode};
pub use schedule::{
    extract, BetaSchedule, BetaScheduleKind, DerivedCoefficients, ScheduleConfig,
    ScheduleTensors,
};
pub use step::ReverseStepper;
pub use wrap::{NoiseModulo, WrapPolicy};
