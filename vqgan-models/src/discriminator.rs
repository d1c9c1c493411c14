use candle::{Module, Result, Tensor};
use candle_nn::ops::leaky_relu;
use candle_nn::{Conv1dConfig, VarBuilder};

use crate::config::DiscriminatorConfig;
use crate::traits::{Discriminator, DiscriminatorOutput};
use crate::with_tracing::{conv1d, conv1d_same, Conv1d};

const LRELU_SLOPE: f64 = 0.1;

/// Strided convolution stack shared by the period and scale heads.
#[derive(Debug, Clone)]
struct ConvStack {
    convs: Vec<Conv1d>,
    conv_post: Conv1d,
}

impl ConvStack {
    fn new(cfg: &DiscriminatorConfig, vb: VarBuilder) -> Result<Self> {
        let vb_c = vb.pp("convs");
        let mut convs = Vec::with_capacity(cfg.channels.len());
        let mut in_channels = 1;
        for (idx, &out_channels) in cfg.channels.iter().enumerate() {
            let conv_cfg = Conv1dConfig {
                padding: cfg.kernel_size / 2,
                stride: cfg.stride,
                ..Default::default()
            };
            convs.push(conv1d(in_channels, out_channels, cfg.kernel_size, conv_cfg, vb_c.pp(idx))?);
            in_channels = out_channels;
        }
        let conv_post = conv1d_same(in_channels, 1, 3, 1, vb.pp("conv_post"))?;
        Ok(Self { convs, conv_post })
    }

    /// Returns the raw scores `(n, 1, frames)` and every intermediate activation.
    fn forward(&self, xs: &Tensor) -> Result<(Tensor, Vec<Tensor>)> {
        let mut fmaps = Vec::with_capacity(self.convs.len() + 1);
        let mut xs = xs.clone();
        for conv in self.convs.iter() {
            xs = leaky_relu(&conv.forward(&xs)?, LRELU_SLOPE)?;
            fmaps.push(xs.clone());
        }
        let xs = self.conv_post.forward(&xs)?;
        fmaps.push(xs.clone());
        Ok((xs, fmaps))
    }
}

/// Views the waveform as `period` interleaved sub-sequences and scores each of them.
#[derive(Debug, Clone)]
struct PeriodHead {
    period: usize,
    stack: ConvStack,
    span: tracing::Span,
}

impl PeriodHead {
    fn forward(&self, xs: &Tensor) -> Result<(Tensor, Vec<Tensor>)> {
        let _enter = self.span.enter();
        let (b_sz, _, time) = xs.dims3()?;
        let p = self.period;
        let xs = if time % p != 0 {
            xs.pad_with_zeros(2, 0, p - time % p)?
        } else {
            xs.clone()
        };
        let time = xs.dim(2)?;
        // xs[b, 0, n * p + j] -> (b * p + j, 1, n)
        let xs = xs
            .reshape((b_sz, time / p, p))?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b_sz * p, 1, time / p))?;
        let (score, fmaps) = self.stack.forward(&xs)?;
        Ok((score.reshape((b_sz, ()))?, fmaps))
    }
}

/// Scores the waveform after `2^level` rounds of average pooling.
#[derive(Debug, Clone)]
struct ScaleHead {
    level: usize,
    stack: ConvStack,
    span: tracing::Span,
}

fn avg_pool2x(xs: &Tensor) -> Result<Tensor> {
    let (b_sz, c, time) = xs.dims3()?;
    let xs = if time % 2 == 1 {
        xs.pad_with_zeros(2, 0, 1)?
    } else {
        xs.clone()
    };
    xs.reshape((b_sz, c, (time + 1) / 2, 2))?.mean(3)
}

impl ScaleHead {
    fn forward(&self, xs: &Tensor) -> Result<(Tensor, Vec<Tensor>)> {
        let _enter = self.span.enter();
        let mut xs = xs.clone();
        for _ in 0..self.level {
            xs = avg_pool2x(&xs)?;
        }
        let b_sz = xs.dim(0)?;
        let (score, fmaps) = self.stack.forward(&xs)?;
        Ok((score.reshape((b_sz, ()))?, fmaps))
    }
}

#[derive(Debug, Clone)]
enum Head {
    Period(PeriodHead),
    Scale(ScaleHead),
}

impl Head {
    fn forward(&self, xs: &Tensor) -> Result<(Tensor, Vec<Tensor>)> {
        match self {
            Self::Period(h) => h.forward(xs),
            Self::Scale(h) => h.forward(xs),
        }
    }
}

/// Multi-period and multi-scale discriminator ensemble.
#[derive(Debug, Clone)]
pub struct EnsembleDiscriminator {
    heads: Vec<Head>,
    span: tracing::Span,
}

impl EnsembleDiscriminator {
    pub fn new(cfg: &DiscriminatorConfig, vb: VarBuilder) -> Result<Self> {
        let mut heads = Vec::with_capacity(cfg.periods.len() + cfg.scales);
        let vb_p = vb.pp("periods");
        for (idx, &period) in cfg.periods.iter().enumerate() {
            if period == 0 {
                candle::bail!("discriminator period must be positive")
            }
            heads.push(Head::Period(PeriodHead {
                period,
                stack: ConvStack::new(cfg, vb_p.pp(idx))?,
                span: tracing::span!(tracing::Level::TRACE, "period-head", period),
            }));
        }
        let vb_s = vb.pp("scales");
        for level in 0..cfg.scales {
            heads.push(Head::Scale(ScaleHead {
                level,
                stack: ConvStack::new(cfg, vb_s.pp(level))?,
                span: tracing::span!(tracing::Level::TRACE, "scale-head", level),
            }));
        }
        if heads.is_empty() {
            candle::bail!("discriminator needs at least one period or scale head")
        }
        let span = tracing::span!(tracing::Level::TRACE, "discriminator");
        Ok(Self { heads, span })
    }

    pub fn num_heads(&self) -> usize {
        self.heads.len()
    }
}

impl Discriminator for EnsembleDiscriminator {
    fn forward(&self, real: &Tensor, fake: &Tensor) -> Result<DiscriminatorOutput> {
        let _enter = self.span.enter();
        let mut out = DiscriminatorOutput::default();
        for head in self.heads.iter() {
            let (score, fmaps) = head.forward(real)?;
            out.real_scores.push(score);
            out.real_fmaps.push(fmaps);
            let (score, fmaps) = head.forward(fake)?;
            out.fake_scores.push(score);
            out.fake_fmaps.push(fmaps);
        }
        Ok(out)
    }
}
