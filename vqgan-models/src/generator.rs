//! HiFi-GAN style vocoder.
//!
//! Upsampling uses nearest neighbor interpolation followed by a convolution rather than a
//! transposed convolution, so each stage multiplies the time axis by exactly its rate.
use candle::{Module, Result, Tensor};
use candle_nn::ops::leaky_relu;
use candle_nn::VarBuilder;
use vqgan_nn::interpolate_nearest1d;

use crate::config::GeneratorConfig;
use crate::traits::Vocoder;
use crate::with_tracing::{conv1d_same, Conv1d};

const LRELU_SLOPE: f64 = 0.1;

#[derive(Debug, Clone)]
struct ResBlock {
    convs: Vec<Conv1d>,
}

impl ResBlock {
    fn new(channels: usize, kernel_size: usize, dilations: &[usize], vb: VarBuilder) -> Result<Self> {
        let convs = dilations
            .iter()
            .enumerate()
            .map(|(idx, &d)| conv1d_same(channels, channels, kernel_size, d, vb.pp(idx)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { convs })
    }
}

impl Module for ResBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for conv in self.convs.iter() {
            let ys = conv.forward(&leaky_relu(&xs, LRELU_SLOPE)?)?;
            xs = (xs + ys)?;
        }
        Ok(xs)
    }
}

#[derive(Debug, Clone)]
struct UpsampleStage {
    rate: usize,
    conv: Conv1d,
    resblocks: Vec<ResBlock>,
}

impl UpsampleStage {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = leaky_relu(xs, LRELU_SLOPE)?;
        let time = xs.dim(2)?;
        let xs = interpolate_nearest1d(&xs, time * self.rate)?;
        let xs = self.conv.forward(&xs)?;
        let mut acc: Option<Tensor> = None;
        for block in self.resblocks.iter() {
            let ys = block.forward(&xs)?;
            acc = Some(match acc {
                None => ys,
                Some(acc) => (acc + ys)?,
            });
        }
        match acc {
            None => Ok(xs),
            Some(acc) => acc / self.resblocks.len() as f64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generator {
    conv_pre: Conv1d,
    stages: Vec<UpsampleStage>,
    conv_post: Conv1d,
    upsample_factor: usize,
    span: tracing::Span,
}

impl Generator {
    pub fn new(n_mels: usize, cfg: &GeneratorConfig, vb: VarBuilder) -> Result<Self> {
        if cfg.resblock_kernel_sizes.len() != cfg.resblock_dilations.len() {
            candle::bail!(
                "{} resblock kernel sizes for {} dilation lists",
                cfg.resblock_kernel_sizes.len(),
                cfg.resblock_dilations.len()
            )
        }
        let conv_pre = conv1d_same(n_mels, cfg.initial_channels, 7, 1, vb.pp("conv_pre"))?;
        let vb_u = vb.pp("ups");
        let mut stages = Vec::with_capacity(cfg.upsample_rates.len());
        let mut channels = cfg.initial_channels;
        for (idx, &rate) in cfg.upsample_rates.iter().enumerate() {
            let vb = vb_u.pp(idx);
            let out_channels = (channels / 2).max(1);
            let conv = conv1d_same(channels, out_channels, cfg.upsample_kernel_size, 1, vb.pp("conv"))?;
            let resblocks = cfg
                .resblock_kernel_sizes
                .iter()
                .zip(cfg.resblock_dilations.iter())
                .enumerate()
                .map(|(j, (&k, d))| ResBlock::new(out_channels, k, d, vb.pp("resblocks").pp(j)))
                .collect::<Result<Vec<_>>>()?;
            stages.push(UpsampleStage {
                rate,
                conv,
                resblocks,
            });
            channels = out_channels;
        }
        let conv_post = conv1d_same(channels, 1, 7, 1, vb.pp("conv_post"))?;
        let span = tracing::span!(tracing::Level::TRACE, "generator");
        Ok(Self {
            conv_pre,
            stages,
            conv_post,
            upsample_factor: cfg.upsample_rates.iter().product(),
            span,
        })
    }
}

impl Vocoder for Generator {
    fn upsample_factor(&self) -> usize {
        self.upsample_factor
    }

    fn forward(&self, mel: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        let mut xs = self.conv_pre.forward(mel)?;
        for stage in self.stages.iter() {
            xs = stage.forward(&xs)?;
        }
        let xs = leaky_relu(&xs, 0.01)?;
        self.conv_post.forward(&xs)?.tanh()
    }
}
