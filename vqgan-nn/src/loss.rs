//! Losses used to train the codec and its adversarial vocoder.
//!
//! The adversarial terms follow the least-squares GAN formulation used by HiFi-GAN. Every
//! function takes slices so that any number of discriminator heads can be plugged in.
use candle::{Result, Tensor};

/// The discriminator objective, with the per-head terms kept around for logging.
#[derive(Debug, Clone)]
pub struct DiscriminatorLoss {
    pub total: Tensor,
    pub real_losses: Vec<Tensor>,
    pub fake_losses: Vec<Tensor>,
}

fn sum_terms(terms: &[Tensor], op: &'static str) -> Result<Tensor> {
    let mut iter = terms.iter();
    let first = match iter.next() {
        Some(first) => first.clone(),
        None => candle::bail!("{op} expects at least one discriminator head"),
    };
    iter.try_fold(first, |acc, t| acc + t)
}

/// `sum_k mean((real_k - 1)^2) + mean(fake_k^2)`.
pub fn discriminator_loss(real_scores: &[Tensor], fake_scores: &[Tensor]) -> Result<DiscriminatorLoss> {
    if real_scores.len() != fake_scores.len() {
        candle::bail!(
            "discriminator_loss: {} real heads vs {} fake heads",
            real_scores.len(),
            fake_scores.len()
        )
    }
    let mut real_losses = Vec::with_capacity(real_scores.len());
    let mut fake_losses = Vec::with_capacity(fake_scores.len());
    let mut heads = Vec::with_capacity(real_scores.len());
    for (dr, dg) in real_scores.iter().zip(fake_scores.iter()) {
        let r_loss = dr.affine(1., -1.)?.sqr()?.mean_all()?;
        let g_loss = dg.sqr()?.mean_all()?;
        heads.push((&r_loss + &g_loss)?);
        real_losses.push(r_loss);
        fake_losses.push(g_loss);
    }
    let total = sum_terms(&heads, "discriminator_loss")?;
    Ok(DiscriminatorLoss {
        total,
        real_losses,
        fake_losses,
    })
}

/// `sum_k mean((fake_k - 1)^2)`, returns the total and the per-head terms.
pub fn generator_loss(fake_scores: &[Tensor]) -> Result<(Tensor, Vec<Tensor>)> {
    let gen_losses = fake_scores
        .iter()
        .map(|dg| dg.affine(1., -1.)?.sqr()?.mean_all())
        .collect::<Result<Vec<_>>>()?;
    let total = sum_terms(&gen_losses, "generator_loss")?;
    Ok((total, gen_losses))
}

/// Feature matching: `2 * sum_k sum_l mean(|real_kl - fake_kl|)`.
///
/// The real feature maps are detached, gradients only reach the generator through the fake side.
pub fn feature_loss(real_fmaps: &[Vec<Tensor>], fake_fmaps: &[Vec<Tensor>]) -> Result<Tensor> {
    if real_fmaps.len() != fake_fmaps.len() {
        candle::bail!(
            "feature_loss: {} real heads vs {} fake heads",
            real_fmaps.len(),
            fake_fmaps.len()
        )
    }
    let mut terms = Vec::new();
    for (dr, dg) in real_fmaps.iter().zip(fake_fmaps.iter()) {
        if dr.len() != dg.len() {
            candle::bail!("feature_loss: layer count mismatch {} vs {}", dr.len(), dg.len())
        }
        for (rl, gl) in dr.iter().zip(dg.iter()) {
            terms.push((rl.detach() - gl)?.abs()?.mean_all()?);
        }
    }
    sum_terms(&terms, "feature_loss")? * 2.
}

/// KL divergence between the posterior `(z_p, logs_q)` and the prior `(m_p, logs_p)`, all of
/// shape `(batch, channels, time)`, summed over valid positions and normalized by the mask sum.
pub fn kl_loss(
    z_p: &Tensor,
    logs_q: &Tensor,
    m_p: &Tensor,
    logs_p: &Tensor,
    z_mask: &Tensor,
) -> Result<Tensor> {
    let kl = ((logs_p - logs_q)? - 0.5)?;
    let kl = (kl + ((z_p - m_p)?.sqr()? * (logs_p * -2.)?.exp()?)?.affine(0.5, 0.)?)?;
    let z_mask = z_mask.to_dtype(kl.dtype())?;
    let kl = kl.broadcast_mul(&z_mask)?.sum_all()?;
    kl / z_mask.sum_all()?.to_scalar::<f32>()? as f64
}

/// L1 loss between two tensors after zeroing their padded positions.
///
/// `mask` broadcasts against both inputs, typically `(batch, 1, time)`. The mean runs over every
/// element so the padded positions contribute zeros, whatever values they held.
pub fn masked_l1_loss(target: &Tensor, prediction: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let mask = mask.to_dtype(target.dtype())?;
    let target = target.broadcast_mul(&mask)?;
    let prediction = prediction.broadcast_mul(&mask)?;
    (target - prediction)?.abs()?.mean_all()
}
