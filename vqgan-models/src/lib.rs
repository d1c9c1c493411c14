//! Mel transform and reference networks for the VQGAN audio codec.
//!
//! The training loops only talk to the networks through the traits in [`traits`], the
//! implementations here are small convolutional networks that satisfy the shape contracts.
pub mod config;
pub mod discriminator;
pub mod encoders;
pub mod generator;
pub mod mel;
pub mod quantizer;
pub mod traits;
pub mod with_tracing;

pub use config::ModelConfig;
pub use discriminator::EnsembleDiscriminator;
pub use encoders::{ConvDownSampler, ConvEncoder, ConvSpeakerEncoder};
pub use generator::Generator;
pub use mel::{LogMelSpectrogram, MelConfig};
pub use quantizer::VqEncoder;
pub use traits::{
    Discriminator, DiscriminatorOutput, Downsample, MaskedEncoder, MelDecoder, Quantized,
    Quantizer, SpeakerEncoder, Vocoder,
};
