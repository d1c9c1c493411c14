//! Fixed size windows cut out of batched waveforms.
//!
//! Windows that run past the end of the available samples are zero padded so the result always
//! has `segment_size` samples on the time axis. This covers both a `segment_size` larger than the
//! buffer and an offset drawn for the ground truth that overshoots a shorter generated waveform.
use candle::{IndexOp, Result, Tensor, D};
use rand::Rng;

/// Extracts `segment_size` samples starting at `starts[i]` from each example of a
/// `(batch, channels, time)` tensor.
pub fn slice_segments(xs: &Tensor, starts: &[usize], segment_size: usize) -> Result<Tensor> {
    let (b_sz, channels, time) = xs.dims3()?;
    if starts.len() != b_sz {
        candle::bail!(
            "slice_segments: {} offsets for a batch of {b_sz}",
            starts.len()
        )
    }
    let mut segments = Vec::with_capacity(b_sz);
    for (idx, &start) in starts.iter().enumerate() {
        let available = time.saturating_sub(start).min(segment_size);
        let segment = if available == 0 {
            Tensor::zeros((channels, segment_size), xs.dtype(), xs.device())?
        } else {
            let segment = xs.i(idx)?.narrow(D::Minus1, start, available)?;
            if available < segment_size {
                segment.pad_with_zeros(D::Minus1, 0, segment_size - available)?
            } else {
                segment
            }
        };
        segments.push(segment);
    }
    Tensor::stack(&segments, 0)
}

/// Draws one start offset per example, uniformly in `[0, lengths[i] - segment_size]` (or `0` when
/// the example is not longer than the window), and slices the windows.
///
/// The offsets are returned so that an aligned tensor can be cut at the same positions with
/// [`slice_segments`].
pub fn rand_slice_segments<R: Rng + ?Sized>(
    xs: &Tensor,
    lengths: &[usize],
    segment_size: usize,
    rng: &mut R,
) -> Result<(Tensor, Vec<usize>)> {
    let b_sz = xs.dim(0)?;
    if lengths.len() != b_sz {
        candle::bail!(
            "rand_slice_segments: {} lengths for a batch of {b_sz}",
            lengths.len()
        )
    }
    let starts = lengths
        .iter()
        .map(|&len| rng.gen_range(0..=len.saturating_sub(segment_size)))
        .collect::<Vec<_>>();
    let segments = slice_segments(xs, &starts, segment_size)?;
    Ok((segments, starts))
}
