use candle::{Module, Result, Tensor};
use candle_nn::{Conv1dConfig, VarBuilder};

#[derive(Debug, Clone)]
pub struct Conv1d {
    inner: candle_nn::Conv1d,
    span: tracing::Span,
}

impl Module for Conv1d {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        self.inner.forward(xs)
    }
}

pub fn conv1d(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    cfg: Conv1dConfig,
    vb: VarBuilder,
) -> Result<Conv1d> {
    let span = tracing::span!(tracing::Level::TRACE, "conv1d");
    let inner = candle_nn::conv1d(in_channels, out_channels, kernel_size, cfg, vb)?;
    Ok(Conv1d { inner, span })
}

/// Stride 1 convolution whose output keeps the input length (odd kernel sizes).
pub fn conv1d_same(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    dilation: usize,
    vb: VarBuilder,
) -> Result<Conv1d> {
    let cfg = Conv1dConfig {
        padding: dilation * (kernel_size - 1) / 2,
        dilation,
        ..Default::default()
    };
    conv1d(in_channels, out_channels, kernel_size, cfg, vb)
}
