//! Encode and decode path shared by the adversarial and the reconstruction-only loops.
use candle::{DType, Module, Tensor};
use vqgan_models::{
    ConvDownSampler, ConvEncoder, ConvSpeakerEncoder, Downsample, LogMelSpectrogram,
    MaskedEncoder, MelConfig, MelDecoder, ModelConfig, Quantized, Quantizer, SpeakerEncoder,
    VqEncoder,
};
use vqgan_nn::ops::{feature_length, mel_length, sequence_mask_from_lengths};
use vqgan_nn::interpolate_nearest1d;

use crate::params::{Group, ParamGroups};
use crate::{Batch, Result};

/// Output of [`CodecStack::encode`].
#[derive(Debug, Clone)]
pub struct Encoded {
    /// Ground truth log-mel `(batch, n_mels, frames)`, detached from the graph.
    pub gt_mels: Tensor,
    pub mel_lengths: Vec<usize>,
    /// `(batch, 1, frames)` f32.
    pub mel_mask: Tensor,
    pub feature_lengths: Vec<usize>,
    /// `(batch, 1, feature_frames)` f32.
    pub feature_mask: Tensor,
    pub quantized: Quantized,
}

pub struct CodecStack {
    pub mel_transform: LogMelSpectrogram,
    pub downsample: Option<Box<dyn Downsample>>,
    pub mel_encoder: Box<dyn MaskedEncoder>,
    pub vq_encoder: Box<dyn Quantizer>,
    pub speaker_encoder: Option<Box<dyn SpeakerEncoder>>,
    pub decoder: Box<dyn MelDecoder>,
    hop_length: usize,
    span: tracing::Span,
}

impl CodecStack {
    /// Builds the reference networks, registering their variables in `groups`.
    pub fn new(mel: MelConfig, cfg: &ModelConfig, groups: &mut ParamGroups) -> Result<Self> {
        let mel_transform = LogMelSpectrogram::new(mel, groups.device())?;
        let hop_length = mel_transform.config().hop_length;
        let downsample = match &cfg.downsample {
            Some(ds) => {
                let vb = groups.var_builder(Group::Downsample);
                Some(Box::new(ConvDownSampler::new(cfg.n_mels, ds, vb)?) as Box<dyn Downsample>)
            }
            None => None,
        };
        let mel_encoder = ConvEncoder::new(
            cfg.feature_channels(),
            cfg.latent_channels,
            None,
            &cfg.mel_encoder,
            groups.var_builder(Group::MelEncoder),
        )?;
        let vq_encoder = VqEncoder::new(
            cfg.latent_channels,
            &cfg.quantizer,
            groups.var_builder(Group::VqEncoder),
        )?;
        let speaker_encoder = match &cfg.speaker_encoder {
            Some(spk) => {
                let vb = groups.var_builder(Group::SpeakerEncoder);
                let spk = ConvSpeakerEncoder::new(cfg.n_mels, spk, vb)?;
                Some(Box::new(spk) as Box<dyn SpeakerEncoder>)
            }
            None => None,
        };
        let decoder = ConvEncoder::new(
            cfg.latent_channels,
            cfg.n_mels,
            cfg.speaker_encoder.as_ref().map(|s| s.embedding_dim),
            &cfg.decoder,
            groups.var_builder(Group::Decoder),
        )?;
        Ok(Self {
            mel_transform,
            downsample,
            mel_encoder: Box::new(mel_encoder),
            vq_encoder: Box::new(vq_encoder),
            speaker_encoder,
            decoder: Box::new(decoder),
            hop_length,
            span: tracing::span!(tracing::Level::TRACE, "codec-stack"),
        })
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn total_stride(&self) -> usize {
        self.downsample.as_ref().map_or(1, |ds| ds.total_stride())
    }

    /// Ground truth mel, masks at mel and feature rate, then mel encoder and quantizer.
    pub fn encode(&self, batch: &Batch) -> Result<Encoded> {
        let _enter = self.span.enter();
        let audios = batch.audios();
        let device = audios.device();
        let gt_mels = self.mel_transform.forward(audios)?.detach();
        let features = match &self.downsample {
            Some(ds) => ds.forward(&gt_mels)?,
            None => gt_mels.clone(),
        };

        let stride = self.total_stride();
        let mel_lengths = batch
            .audio_lengths()
            .iter()
            .map(|&l| mel_length(l, self.hop_length))
            .collect::<Vec<_>>();
        let feature_lengths = batch
            .audio_lengths()
            .iter()
            .map(|&l| feature_length(l, self.hop_length, stride))
            .collect::<Vec<_>>();
        let feature_mask = sequence_mask_from_lengths(&feature_lengths, features.dim(2)?, device)?
            .unsqueeze(1)?
            .to_dtype(DType::F32)?;
        let mel_mask = sequence_mask_from_lengths(&mel_lengths, gt_mels.dim(2)?, device)?
            .unsqueeze(1)?
            .to_dtype(DType::F32)?;

        let latents = self.mel_encoder.forward(&features, &feature_mask)?;
        let quantized = self.vq_encoder.forward(&latents, &feature_mask)?;
        Ok(Encoded {
            gt_mels,
            mel_lengths,
            mel_mask,
            feature_lengths,
            feature_mask,
            quantized,
        })
    }

    /// `None` when no speaker encoder is configured.
    pub fn speaker_embedding(&self, encoded: &Encoded) -> Result<Option<Tensor>> {
        match &self.speaker_encoder {
            Some(spk) => Ok(Some(spk.forward(&encoded.gt_mels, &encoded.mel_mask)?)),
            None => Ok(None),
        }
    }

    /// Stretches the quantized features to the mel frame count and decodes them.
    pub fn decode(&self, encoded: &Encoded, speaker: Option<&Tensor>) -> Result<Tensor> {
        let _enter = self.span.enter();
        let frames = encoded.gt_mels.dim(2)?;
        let features = interpolate_nearest1d(&encoded.quantized.features, frames)?;
        Ok(self
            .decoder
            .forward(&features, &encoded.mel_mask, speaker)?)
    }
}
