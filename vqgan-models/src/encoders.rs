use candle::{Module, Result, Tensor};
use candle_nn::{Conv1dConfig, VarBuilder};

use crate::config::{DownsampleConfig, EncoderConfig, SpeakerEncoderConfig};
use crate::traits::{Downsample, MaskedEncoder, MelDecoder, SpeakerEncoder};
use crate::with_tracing::{conv1d, conv1d_same, Conv1d};

/// Stack of strided convolutions, each one dividing the frame rate by its stride.
#[derive(Debug, Clone)]
pub struct ConvDownSampler {
    convs: Vec<Conv1d>,
    total_stride: usize,
    span: tracing::Span,
}

impl ConvDownSampler {
    pub fn new(in_channels: usize, cfg: &DownsampleConfig, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("convs");
        let mut convs = Vec::with_capacity(cfg.strides.len());
        let mut channels = in_channels;
        for (idx, &stride) in cfg.strides.iter().enumerate() {
            // kernel 2s+1 with padding s gives ceil(len / s) frames.
            let conv_cfg = Conv1dConfig {
                padding: stride,
                stride,
                ..Default::default()
            };
            convs.push(conv1d(channels, cfg.channels, 2 * stride + 1, conv_cfg, vb.pp(idx))?);
            channels = cfg.channels;
        }
        let span = tracing::span!(tracing::Level::TRACE, "downsample");
        Ok(Self {
            convs,
            total_stride: cfg.strides.iter().product(),
            span,
        })
    }
}

impl Downsample for ConvDownSampler {
    fn total_stride(&self) -> usize {
        self.total_stride
    }

    fn forward(&self, features: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        let mut xs = features.clone();
        for conv in self.convs.iter() {
            xs = conv.forward(&xs)?.gelu()?;
        }
        Ok(xs)
    }
}

#[derive(Debug, Clone)]
struct ResidualLayer {
    dilated: Conv1d,
    pointwise: Conv1d,
}

impl ResidualLayer {
    fn new(channels: usize, kernel_size: usize, dilation: usize, vb: VarBuilder) -> Result<Self> {
        let dilated = conv1d_same(channels, channels, kernel_size, dilation, vb.pp("dilated"))?;
        let pointwise = conv1d_same(channels, channels, 1, 1, vb.pp("pointwise"))?;
        Ok(Self { dilated, pointwise })
    }

    fn forward(&self, xs: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let ys = self.dilated.forward(&xs.broadcast_mul(mask)?)?.gelu()?;
        let ys = self.pointwise.forward(&ys)?;
        (xs + ys)?.broadcast_mul(mask)
    }
}

/// Masked stack of dilated residual convolutions.
///
/// Serves as the mel encoder and, with a conditioning projection, as the decoder.
#[derive(Debug, Clone)]
pub struct ConvEncoder {
    pre: Conv1d,
    cond: Option<Conv1d>,
    layers: Vec<ResidualLayer>,
    proj: Conv1d,
    span: tracing::Span,
}

impl ConvEncoder {
    /// `cond_channels` adds a 1x1 projection of the speaker embedding added after the input
    /// projection.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        cond_channels: Option<usize>,
        cfg: &EncoderConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let hidden = cfg.hidden_channels;
        let pre = conv1d_same(in_channels, hidden, 1, 1, vb.pp("pre"))?;
        let cond = match cond_channels {
            Some(c) => Some(conv1d_same(c, hidden, 1, 1, vb.pp("cond"))?),
            None => None,
        };
        let vb_l = vb.pp("layers");
        let mut layers = Vec::with_capacity(cfg.n_layers);
        let mut dilation = 1;
        for idx in 0..cfg.n_layers {
            layers.push(ResidualLayer::new(hidden, cfg.kernel_size, dilation, vb_l.pp(idx))?);
            dilation *= cfg.dilation_rate.max(1);
        }
        let proj = conv1d_same(hidden, out_channels, 1, 1, vb.pp("proj"))?;
        let span = tracing::span!(tracing::Level::TRACE, "conv-encoder");
        Ok(Self {
            pre,
            cond,
            layers,
            proj,
            span,
        })
    }

    fn forward_cond(&self, xs: &Tensor, mask: &Tensor, g: Option<&Tensor>) -> Result<Tensor> {
        let _enter = self.span.enter();
        let mut xs = self.pre.forward(&xs.broadcast_mul(mask)?)?;
        match (&self.cond, g) {
            (Some(cond), Some(g)) => xs = xs.broadcast_add(&cond.forward(g)?)?,
            (None, Some(_)) => {
                candle::bail!("speaker embedding given to an encoder built without conditioning")
            }
            (_, None) => {}
        }
        for layer in self.layers.iter() {
            xs = layer.forward(&xs, mask)?;
        }
        self.proj.forward(&xs)?.broadcast_mul(mask)
    }
}

impl MaskedEncoder for ConvEncoder {
    fn forward(&self, features: &Tensor, mask: &Tensor) -> Result<Tensor> {
        self.forward_cond(features, mask, None)
    }
}

impl MelDecoder for ConvEncoder {
    fn forward(
        &self,
        features: &Tensor,
        mask: &Tensor,
        speaker: Option<&Tensor>,
    ) -> Result<Tensor> {
        self.forward_cond(features, mask, speaker)
    }
}

/// Convolutional stack followed by a masked mean over time.
#[derive(Debug, Clone)]
pub struct ConvSpeakerEncoder {
    convs: Vec<Conv1d>,
    out: Conv1d,
    span: tracing::Span,
}

impl ConvSpeakerEncoder {
    pub fn new(n_mels: usize, cfg: &SpeakerEncoderConfig, vb: VarBuilder) -> Result<Self> {
        let vb_c = vb.pp("convs");
        let mut convs = Vec::with_capacity(cfg.n_layers);
        let mut channels = n_mels;
        for idx in 0..cfg.n_layers {
            convs.push(conv1d_same(channels, cfg.hidden_channels, 5, 1, vb_c.pp(idx))?);
            channels = cfg.hidden_channels;
        }
        let out = conv1d_same(channels, cfg.embedding_dim, 1, 1, vb.pp("out"))?;
        let span = tracing::span!(tracing::Level::TRACE, "speaker-encoder");
        Ok(Self { convs, out, span })
    }
}

impl SpeakerEncoder for ConvSpeakerEncoder {
    fn forward(&self, mel: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        let mut xs = mel.broadcast_mul(mask)?;
        for conv in self.convs.iter() {
            xs = conv.forward(&xs)?.gelu()?.broadcast_mul(mask)?;
        }
        let frames = mask.sum_keepdim(2)?.maximum(1f32)?;
        let pooled = xs.sum_keepdim(2)?.broadcast_div(&frames)?;
        self.out.forward(&pooled)
    }
}
