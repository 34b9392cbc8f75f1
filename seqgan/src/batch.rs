// Epoch partitioning and padded batch assembly.
//
// Each epoch draws one Fisher-Yates permutation of the sequence indices and
// cuts it into consecutive batches of `batch_size`. The permutation indexes
// sequences and lengths together, so they never drift apart. A trailing
// partial batch is dropped; an exactly full trailing batch is kept.
//
// A batch is padded to its own longest true length. Real rows are copied in,
// everything past a sequence's length is zero. The matching noise batch has
// one Gaussian(0.5, 0.2) draw per real timestep and zeros after it.

use crate::data::TrainingSet;
use crate::error::Result;
use candle_core::{Device, Tensor};
use seqgan_prng::SeqRng;

/// Mean of the generator's input noise.
pub const NOISE_MEAN: f32 = 0.5;

/// Standard deviation of the generator's input noise.
pub const NOISE_STDDEV: f32 = 0.2;

/// Shuffle `0..count` and split it into full batches of `batch_size`.
pub fn epoch_partition(count: usize, batch_size: usize, rng: &mut SeqRng) -> Vec<Vec<usize>> {
    if batch_size == 0 {
        return Vec::new();
    }
    let order = rng.permutation(count);
    order
        .chunks_exact(batch_size)
        .map(<[usize]>::to_vec)
        .collect()
}

/// Real sequences of one batch, zero-padded to a common length.
#[derive(Clone, Debug)]
pub struct SequenceBatch {
    /// `(batch, max_len, features)`.
    pub targets: Tensor,
    /// True length of each row of `targets`.
    pub lengths: Vec<usize>,
}

impl SequenceBatch {
    /// Gather `indices` from `set` into one padded tensor.
    pub fn assemble(
        set: &TrainingSet,
        indices: &[usize],
        feature_count: usize,
        device: &Device,
    ) -> Result<Self> {
        let lengths: Vec<usize> = indices.iter().map(|&i| set.lengths()[i]).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);

        let mut data = vec![0.0f32; indices.len() * max_len * feature_count];
        for (b, &i) in indices.iter().enumerate() {
            let rows = &set.sequences()[i][..lengths[b]];
            for (t, row) in rows.iter().enumerate() {
                let start = (b * max_len + t) * feature_count;
                data[start..start + feature_count].copy_from_slice(row);
            }
        }

        let targets = Tensor::from_vec(data, (indices.len(), max_len, feature_count), device)?;
        Ok(SequenceBatch { targets, lengths })
    }

    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn max_len(&self) -> usize {
        self.lengths.iter().copied().max().unwrap_or(0)
    }

    /// Noise input for the generator matching this batch's lengths.
    pub fn noise(&self, rng: &mut SeqRng) -> Result<Tensor> {
        noise_batch(&self.lengths, self.max_len(), rng, self.targets.device())
    }
}

/// `(lengths.len(), steps, 1)` noise: Gaussian(0.5, 0.2) while
/// `t < lengths[i]`, zero after.
pub fn noise_batch(
    lengths: &[usize],
    steps: usize,
    rng: &mut SeqRng,
    device: &Device,
) -> Result<Tensor> {
    let mut data = Vec::with_capacity(lengths.len() * steps);
    for &len in lengths {
        let real = len.min(steps);
        data.extend(rng.normal_vec(real, NOISE_MEAN, NOISE_STDDEV));
        data.extend(std::iter::repeat_n(0.0, steps - real));
    }
    Ok(Tensor::from_vec(data, (lengths.len(), steps, 1), device)?)
}
