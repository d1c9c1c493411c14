use candle::{Module, Result, Tensor, D};
use candle_nn::{Init, VarBuilder};

use crate::config::QuantizerConfig;
use crate::traits::{Quantized, Quantizer};
use crate::with_tracing::{conv1d_same, Conv1d};

/// Single codebook vector quantizer with a learnable codebook.
///
/// Features are projected to the codebook width, snapped to their nearest code and projected
/// back. Gradients reach the encoder through the straight-through estimator, the codebook is
/// trained by the codebook term of the loss.
#[derive(Debug, Clone)]
pub struct VqEncoder {
    in_proj: Conv1d,
    out_proj: Conv1d,
    codebook: Tensor,
    commitment_weight: f64,
    span: tracing::Span,
}

impl VqEncoder {
    pub fn new(channels: usize, cfg: &QuantizerConfig, vb: VarBuilder) -> Result<Self> {
        let in_proj = conv1d_same(channels, cfg.codebook_dim, 1, 1, vb.pp("in_proj"))?;
        let out_proj = conv1d_same(cfg.codebook_dim, channels, 1, 1, vb.pp("out_proj"))?;
        let bound = 1. / cfg.codebook_size as f64;
        let codebook = vb.get_with_hints(
            (cfg.codebook_size, cfg.codebook_dim),
            "codebook",
            Init::Uniform {
                lo: -bound,
                up: bound,
            },
        )?;
        let span = tracing::span!(tracing::Level::TRACE, "vq");
        Ok(Self {
            in_proj,
            out_proj,
            codebook,
            commitment_weight: cfg.commitment_weight,
            span,
        })
    }

    pub fn codebook(&self) -> &Tensor {
        &self.codebook
    }

    /// Nearest code for every row of `xs` (shape `(n, codebook_dim)`).
    fn nearest(&self, xs: &Tensor) -> Result<Tensor> {
        let xs_sq = xs.sqr()?.sum_keepdim(1)?;
        let cb_sq = self.codebook.sqr()?.sum_keepdim(1)?.t()?;
        let dots = xs.matmul(&self.codebook.t()?)?;
        let distances = xs_sq.broadcast_sub(&(dots * 2.)?)?.broadcast_add(&cb_sq)?;
        distances.detach().argmin(D::Minus1)
    }
}

impl Quantizer for VqEncoder {
    fn forward(&self, features: &Tensor, mask: &Tensor) -> Result<Quantized> {
        let _enter = self.span.enter();
        let z_e = self.in_proj.forward(features)?;
        let (b_sz, dim, time) = z_e.dims3()?;
        let flat = z_e.transpose(1, 2)?.reshape((b_sz * time, dim))?;
        let indices = self.nearest(&flat)?;
        let z_q = self
            .codebook
            .index_select(&indices, 0)?
            .reshape((b_sz, time, dim))?
            .transpose(1, 2)?;

        let mask = mask.to_dtype(z_e.dtype())?;
        let valid = mask.sum_all()?.to_scalar::<f32>()? as f64 * dim as f64;
        let masked_mse = |a: &Tensor, b: &Tensor| -> Result<Tensor> {
            (a - b)?.sqr()?.broadcast_mul(&mask)?.sum_all()? / valid.max(1.)
        };
        let codebook_loss = masked_mse(&z_q, &z_e.detach())?;
        let commitment_loss = masked_mse(&z_e, &z_q.detach())?;
        let loss = (codebook_loss + (commitment_loss * self.commitment_weight)?)?;

        let z_q = (&z_e + (z_q - &z_e)?.detach())?;
        let features = self.out_proj.forward(&z_q)?.broadcast_mul(&mask)?;
        Ok(Quantized {
            features,
            indices: indices.reshape((b_sz, time))?,
            loss,
        })
    }
}
