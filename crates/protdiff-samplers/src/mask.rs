//! Attention masks for padded variable-length batches

use burn::prelude::*;

use crate::error::{Result, SamplingError};

/// Check that `lengths` describes a batch of `batch_size` sequences that fit in `max_len`
pub fn validate_lengths(lengths: &[usize], batch_size: usize, max_len: usize) -> Result<()> {
    if lengths.len() != batch_size {
        return Err(SamplingError::BatchSizeMismatch {
            batch_size,
            lengths: lengths.len(),
        });
    }
    for (index, &length) in lengths.iter().enumerate() {
        if length == 0 {
            return Err(SamplingError::ZeroLength { index });
        }
        if length > max_len {
            return Err(SamplingError::LengthExceedsMax {
                index,
                length,
                max_len,
            });
        }
    }
    Ok(())
}

/// Build a `[batch, max_len]` mask where `true` marks a valid (non-padding) position
///
/// Row `i` is `true` on `0..lengths[i]` and `false` after.
pub fn lengths_to_attention_mask<B: Backend>(
    batch_size: usize,
    max_len: usize,
    lengths: &[usize],
    device: &B::Device,
) -> Result<Tensor<B, 2, Bool>> {
    validate_lengths(lengths, batch_size, max_len)?;

    let mut values = vec![false; batch_size * max_len];
    for (row, &len) in values.chunks_mut(max_len.max(1)).zip(lengths) {
        row[..len].fill(true);
    }
    Ok(Tensor::from_data(
        TensorData::new(values, [batch_size, max_len]),
        device,
    ))
}
