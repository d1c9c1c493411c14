//! Tensor helpers for ragged batches.
use candle::{DType, Device, Result, Tensor, D};

/// Number of mel frames covering `audio_length` samples.
pub fn mel_length(audio_length: usize, hop_length: usize) -> usize {
    audio_length / hop_length
}

/// Number of latent frames covering `audio_length` samples once the mel frames have been
/// downsampled by `total_stride`.
///
/// Both divisions round toward zero, `feature_length(64000, 640, 2) == 50`.
pub fn feature_length(audio_length: usize, hop_length: usize, total_stride: usize) -> usize {
    audio_length / hop_length / total_stride
}

/// Builds a validity mask of shape `(lengths.len(), max_len)` where `mask[i, t] = t < lengths[i]`.
///
/// Arguments
///
/// * [lengths]: a rank 1 tensor of integer lengths, any integer dtype.
/// * [max_len]: the size of the time axis being masked.
///
/// The resulting tensor has dtype `u8`.
pub fn sequence_mask(lengths: &Tensor, max_len: usize) -> Result<Tensor> {
    let lengths = match lengths.dtype() {
        DType::U32 => lengths.clone(),
        DType::U8 | DType::I64 => lengths.to_dtype(DType::U32)?,
        dtype => candle::bail!("sequence_mask expects integer lengths, got {dtype:?}"),
    };
    let _ = lengths.dims1()?;
    let positions = Tensor::arange(0u32, max_len as u32, lengths.device())?.unsqueeze(0)?;
    positions.broadcast_lt(&lengths.unsqueeze(1)?)
}

/// Same as [`sequence_mask`] for lengths held on the host.
pub fn sequence_mask_from_lengths(
    lengths: &[usize],
    max_len: usize,
    device: &Device,
) -> Result<Tensor> {
    let lengths = lengths.iter().map(|&l| l as u32).collect::<Vec<_>>();
    let lengths = Tensor::new(lengths.as_slice(), device)?;
    sequence_mask(&lengths, max_len)
}

/// Nearest neighbor interpolation along the last axis of a `(batch, channels, time)` tensor.
///
/// Output position `j` reads input position `floor(j * time / size)`. The op is built on
/// `index_select` so gradients flow back to the input.
pub fn interpolate_nearest1d(xs: &Tensor, size: usize) -> Result<Tensor> {
    let (_b, _c, t) = xs.dims3()?;
    if t == size {
        return Ok(xs.clone());
    }
    if t == 0 {
        candle::bail!("interpolate_nearest1d on an empty time axis")
    }
    let ids = (0..size)
        .map(|j| ((j * t) / size).min(t - 1) as u32)
        .collect::<Vec<_>>();
    let ids = Tensor::new(ids.as_slice(), xs.device())?;
    xs.index_select(&ids, D::Minus1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_upsample_by_two() -> Result<()> {
        let xs = Tensor::new(&[[[1f32, 2., 3.]]], &Device::Cpu)?;
        let ys = interpolate_nearest1d(&xs, 6)?;
        assert_eq!(ys.to_vec3::<f32>()?, [[[1., 1., 2., 2., 3., 3.]]]);
        let ys = interpolate_nearest1d(&xs, 4)?;
        assert_eq!(ys.to_vec3::<f32>()?, [[[1., 1., 2., 3.]]]);
        Ok(())
    }
}
