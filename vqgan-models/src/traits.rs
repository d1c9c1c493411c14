//! Seams between the training loops and the networks they drive.
//!
//! All tensors use the `(batch, channels, time)` layout. Masks are float tensors of shape
//! `(batch, 1, time)` holding ones on valid frames.
use candle::{Result, Tensor};

/// Strided reduction of the mel frame rate applied before encoding.
pub trait Downsample {
    /// Product of all strides, the ratio between mel frames and feature frames.
    fn total_stride(&self) -> usize;
    fn forward(&self, features: &Tensor) -> Result<Tensor>;
}

pub trait MaskedEncoder {
    fn forward(&self, features: &Tensor, mask: &Tensor) -> Result<Tensor>;
}

/// Output of a [`Quantizer`].
#[derive(Debug, Clone)]
pub struct Quantized {
    /// Quantized features, same shape as the input features.
    pub features: Tensor,
    /// Codebook index per frame, `(batch, time)` u32.
    pub indices: Tensor,
    /// Scalar codebook and commitment loss.
    pub loss: Tensor,
}

pub trait Quantizer {
    fn forward(&self, features: &Tensor, mask: &Tensor) -> Result<Quantized>;
}

pub trait MelDecoder {
    /// `speaker` is `(batch, speaker_channels, 1)` when conditioning is available. Decoders
    /// must accept `None` and skip the conditioning entirely.
    fn forward(&self, features: &Tensor, mask: &Tensor, speaker: Option<&Tensor>)
        -> Result<Tensor>;
}

pub trait SpeakerEncoder {
    /// Maps a ground truth mel to a `(batch, embedding_dim, 1)` embedding.
    fn forward(&self, mel: &Tensor, mask: &Tensor) -> Result<Tensor>;
}

pub trait Vocoder {
    /// Number of audio samples produced per mel frame.
    fn upsample_factor(&self) -> usize;
    /// Maps `(batch, n_mels, frames)` to `(batch, 1, frames * upsample_factor)` audio.
    fn forward(&self, mel: &Tensor) -> Result<Tensor>;
}

/// Scores and intermediate feature maps of every discriminator head, in head order.
#[derive(Debug, Clone, Default)]
pub struct DiscriminatorOutput {
    pub real_scores: Vec<Tensor>,
    pub fake_scores: Vec<Tensor>,
    pub real_fmaps: Vec<Vec<Tensor>>,
    pub fake_fmaps: Vec<Vec<Tensor>>,
}

pub trait Discriminator {
    fn forward(&self, real: &Tensor, fake: &Tensor) -> Result<DiscriminatorOutput>;
}
