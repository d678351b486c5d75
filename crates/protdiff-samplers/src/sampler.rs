//! Full reverse-diffusion runs over padded batches
//!
//! [`DiffusionSampler::sample_loop`] walks every timestep from T-1 down to 0
//! and records the trajectory; [`DiffusionSampler::sample`] runs the loop and
//! trims the final state of each example to its true length.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::denoiser::Denoiser;
use crate::error::{Result, SamplingError};
use crate::mask::lengths_to_attention_mask;
use crate::noise::NoiseSource;
use crate::schedule::{BetaSchedule, ScheduleTensors};
use crate::step::ReverseStepper;
use crate::wrap::{NoiseModulo, WrapPolicy};

// ============================================================================
// Configuration
// ============================================================================

/// Which states a run keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryMode {
    /// Record every step's state twice (2T entries), matching reference runs
    #[default]
    Duplicate,
    /// Record every step's state once (T entries)
    Single,
    /// Keep only the most recent state
    FinalOnly,
}

/// Sampler configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub trajectory: TrajectoryMode,
    /// Wrap states into `[0, modulo)` after every step
    pub modulo: Option<NoiseModulo>,
}

/// Shape and length of one batched sampling request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRequest {
    /// True length of each example
    pub lengths: Vec<usize>,
    /// Padded sequence length of the batch
    pub max_len: usize,
    pub batch_size: usize,
    pub channels: usize,
    /// Number of reverse steps (T)
    pub timesteps: usize,
}

impl SampleRequest {
    /// Request with one batch element per length
    pub fn new(lengths: Vec<usize>, max_len: usize, channels: usize, timesteps: usize) -> Self {
        Self {
            batch_size: lengths.len(),
            lengths,
            max_len,
            channels,
            timesteps,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.batch_size, self.max_len, self.channels]
    }
}

// ============================================================================
// Trajectory
// ============================================================================

/// States produced by one run, oldest first
#[derive(Debug, Clone)]
pub struct Trajectory<B: Backend> {
    mode: TrajectoryMode,
    states: Vec<Tensor<B, 3>>,
}

impl<B: Backend> Trajectory<B> {
    fn new(mode: TrajectoryMode, timesteps: usize) -> Self {
        let capacity = match mode {
            TrajectoryMode::Duplicate => 2 * timesteps,
            TrajectoryMode::Single => timesteps,
            TrajectoryMode::FinalOnly => 1,
        };
        Self {
            mode,
            states: Vec::with_capacity(capacity),
        }
    }

    fn record(&mut self, state: Tensor<B, 3>) {
        match self.mode {
            TrajectoryMode::Duplicate => {
                self.states.push(state.clone());
                self.states.push(state);
            }
            TrajectoryMode::Single => self.states.push(state),
            TrajectoryMode::FinalOnly => {
                self.states.clear();
                self.states.push(state);
            }
        }
    }

    pub fn mode(&self) -> TrajectoryMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[Tensor<B, 3>] {
        &self.states
    }

    pub fn last(&self) -> Option<&Tensor<B, 3>> {
        self.states.last()
    }

    pub fn into_last(mut self) -> Option<Tensor<B, 3>> {
        self.states.pop()
    }

    pub fn into_states(self) -> Vec<Tensor<B, 3>> {
        self.states
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// Reverse-diffusion sampler for padded variable-length batches
pub struct DiffusionSampler<B: Backend> {
    stepper: ReverseStepper<B>,
    trajectory: TrajectoryMode,
    wrap: Box<dyn WrapPolicy<B>>,
    device: B::Device,
}

impl<B: Backend> DiffusionSampler<B> {
    /// Build a sampler from a beta schedule and its posterior variance
    ///
    /// Coefficients are derived and uploaded once here and reused by every run.
    pub fn new(
        schedule: &BetaSchedule,
        posterior_variance: &[f32],
        config: SamplerConfig,
        device: &B::Device,
    ) -> Result<Self> {
        let tensors = ScheduleTensors::new(schedule, posterior_variance, device)?;
        Ok(Self {
            stepper: ReverseStepper::new(tensors),
            trajectory: config.trajectory,
            wrap: Box::new(config.modulo),
            device: device.clone(),
        })
    }

    /// Replace the wrap policy applied after every step
    pub fn with_wrap_policy(mut self, policy: impl WrapPolicy<B> + 'static) -> Self {
        self.wrap = Box::new(policy);
        self
    }

    pub fn with_trajectory_mode(mut self, mode: TrajectoryMode) -> Self {
        self.trajectory = mode;
        self
    }

    pub fn stepper(&self) -> &ReverseStepper<B> {
        &self.stepper
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Run T reverse steps from pure noise and return every recorded state
    pub fn sample_loop<D, N>(
        &self,
        denoiser: &D,
        lengths: &[usize],
        shape: [usize; 3],
        timesteps: usize,
        noise: &mut N,
    ) -> Result<Trajectory<B>>
    where
        D: Denoiser<B> + ?Sized,
        N: NoiseSource<B> + ?Sized,
    {
        let [batch, max_len, channels] = shape;
        if shape.contains(&0) {
            return Err(SamplingError::EmptyShape { shape });
        }
        if timesteps == 0 {
            return Err(SamplingError::ZeroTimesteps);
        }
        if timesteps > self.stepper.len() {
            return Err(SamplingError::TimestepsExceedSchedule {
                timesteps,
                schedule_len: self.stepper.len(),
            });
        }
        self.wrap.check(channels)?;
        let attention_mask = lengths_to_attention_mask(batch, max_len, lengths, &self.device)?;

        tracing::info!(
            ?shape,
            timesteps,
            trajectory = ?self.trajectory,
            "sampling from noise"
        );

        let mut state = self.wrap.wrap(noise.standard_normal(shape, &self.device))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let min = state.clone().min_dim(0).min_dim(1).into_data();
            let max = state.clone().max_dim(0).max_dim(1).into_data();
            tracing::debug!(?min, ?max, "starting noise range per channel");
        }

        let mut trajectory = Trajectory::new(self.trajectory, timesteps);
        for t_index in (0..timesteps).rev() {
            state = self
                .stepper
                .step(denoiser, state, t_index, attention_mask.clone(), noise)?;
            state = self.wrap.wrap(state)?;
            trajectory.record(state.clone());
            tracing::debug!(t_index, "reverse step done");
        }
        Ok(trajectory)
    }

    /// Sample a batch and return each example trimmed to `[length, channels]`
    pub fn sample<D, N>(
        &self,
        denoiser: &D,
        request: &SampleRequest,
        noise: &mut N,
    ) -> Result<Vec<Tensor<B, 2>>>
    where
        D: Denoiser<B> + ?Sized,
        N: NoiseSource<B> + ?Sized,
    {
        let final_state = self
            .sample_loop(
                denoiser,
                &request.lengths,
                request.shape(),
                request.timesteps,
                noise,
            )?
            .into_last()
            .ok_or(SamplingError::EmptyTrajectory)?;

        let channels = request.channels;
        Ok(request
            .lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                final_state
                    .clone()
                    .slice([i..i + 1, 0..len, 0..channels])
                    .reshape([len, channels])
            })
            .collect())
    }
}
