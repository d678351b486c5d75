//! Error types for the sampler
//!
//! Every failure aborts the run. Variants carry the values that violated
//! the precondition so the caller can see what went wrong without a debugger.

use burn::tensor::DType;
use thiserror::Error;

/// Broad class of a [`SamplingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad shapes, lengths or schedules supplied by the caller
    Configuration,
    /// The denoiser returned something that does not match its input
    CapabilityContract,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplingError {
    #[error("beta schedule is empty")]
    EmptySchedule,

    #[error("beta[{index}] = {value} is outside (0, 1)")]
    InvalidBeta { index: usize, value: f32 },

    #[error("posterior variance has {actual} entries, beta schedule has {expected}")]
    PosteriorVarianceLength { expected: usize, actual: usize },

    #[error("posterior variance[{index}] = {value} is negative or not finite")]
    InvalidPosteriorVariance { index: usize, value: f32 },

    #[error("requested {timesteps} timesteps but the schedule only has {schedule_len}")]
    TimestepsExceedSchedule { timesteps: usize, schedule_len: usize },

    #[error("timestep count must be at least 1")]
    ZeroTimesteps,

    #[error("timestep index {t_index} is out of range for a schedule of {schedule_len}")]
    TimestepOutOfRange { t_index: usize, schedule_len: usize },

    #[error("batch size {batch_size} does not match {lengths} sequence lengths")]
    BatchSizeMismatch { batch_size: usize, lengths: usize },

    #[error("sequence length {length} at index {index} exceeds max length {max_len}")]
    LengthExceedsMax {
        index: usize,
        length: usize,
        max_len: usize,
    },

    #[error("sequence length at index {index} is zero")]
    ZeroLength { index: usize },

    #[error("sample shape {shape:?} has an empty dimension")]
    EmptyShape { shape: [usize; 3] },

    #[error("state shape {actual:?} does not match mask shape {expected:?}")]
    MaskShapeMismatch {
        expected: [usize; 2],
        actual: [usize; 2],
    },

    #[error("modulus {value} must be finite and non-negative")]
    InvalidModulus { value: f32 },

    #[error("modulo has {actual} channel entries, state has {expected} channels")]
    ModuloChannelMismatch { expected: usize, actual: usize },

    #[error("denoiser returned shape {actual:?}, expected {expected:?}")]
    DenoiserShape {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("denoiser returned dtype {actual:?}, expected {expected:?}")]
    DenoiserDType { expected: DType, actual: DType },

    #[error("sampling produced an empty trajectory")]
    EmptyTrajectory,
}

impl SamplingError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DenoiserShape { .. } | Self::DenoiserDType { .. } => {
                ErrorKind::CapabilityContract
            }
            _ => ErrorKind::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, SamplingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denoiser_errors_are_contract_violations() {
        let err = SamplingError::DenoiserShape {
            expected: [2, 3, 4],
            actual: [2, 3, 1],
        };
        assert_eq!(err.kind(), ErrorKind::CapabilityContract);
        assert!(err.to_string().contains("[2, 3, 1]"));
    }

    #[test]
    fn test_length_errors_are_configuration() {
        let err = SamplingError::LengthExceedsMax {
            index: 1,
            length: 9,
            max_len: 5,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
