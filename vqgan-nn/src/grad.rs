//! Gradient norm utilities operating on a `GradStore` restricted to one parameter group.
use candle::backprop::GradStore;
use candle::{DType, Result, Tensor, Var};

/// Total L2 norm of the gradients held for `vars`. Variables without a gradient are skipped.
pub fn grad_norm(grads: &GradStore, vars: &[Var]) -> Result<f64> {
    let squares = vars
        .iter()
        .filter_map(|var| grads.get(var))
        .map(|g| g.to_dtype(DType::F32)?.sqr()?.sum_all())
        .collect::<Result<Vec<_>>>()?;
    if squares.is_empty() {
        return Ok(0.);
    }
    let total = Tensor::stack(&squares, 0)?.sum_all()?.to_scalar::<f32>()?;
    Ok((total as f64).sqrt())
}

/// Rescales the gradients of `vars` in place so that their total L2 norm is at most `max_norm`.
///
/// Returns the norm measured before clipping. A non-finite norm leaves the gradients untouched,
/// the caller decides what to do with the update.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> Result<f64> {
    let total_norm = grad_norm(grads, vars)?;
    if !total_norm.is_finite() {
        return Ok(total_norm);
    }
    let clip_coef = max_norm / (total_norm + 1e-6);
    if clip_coef < 1. {
        for var in vars.iter() {
            if let Some(grad) = grads.remove(var) {
                grads.insert(var, (grad * clip_coef)?);
            }
        }
    }
    Ok(total_norm)
}
