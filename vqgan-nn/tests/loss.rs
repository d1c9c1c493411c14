use candle::test_utils::to_vec0_round;
use candle::{Device, Result, Tensor};
use vqgan_nn::loss::{
    discriminator_loss, feature_loss, generator_loss, kl_loss, masked_l1_loss,
};

#[test]
fn discriminator_loss_values() -> Result<()> {
    let cpu = Device::Cpu;
    let real = Tensor::new(&[[0.8f32; 10]], &cpu)?;
    let fake = Tensor::new(&[[0.2f32; 10]], &cpu)?;
    let loss = discriminator_loss(&[real.clone()], &[fake.clone()])?;
    assert_eq!(to_vec0_round(&loss.total, 4)?, 0.08);
    assert_eq!(loss.real_losses.len(), 1);
    assert_eq!(to_vec0_round(&loss.real_losses[0], 4)?, 0.04);
    assert_eq!(to_vec0_round(&loss.fake_losses[0], 4)?, 0.04);

    // Heads are summed and may have different shapes.
    let real2 = Tensor::new(&[[1f32, 0.], [1., 1.]], &cpu)?;
    let fake2 = Tensor::new(&[[0f32, 1.], [0., 0.]], &cpu)?;
    let loss = discriminator_loss(&[real, real2], &[fake, fake2])?;
    assert_eq!(to_vec0_round(&loss.total, 4)?, 0.58);
    Ok(())
}

#[test]
fn discriminator_loss_is_zero_only_at_optimum() -> Result<()> {
    let cpu = Device::Cpu;
    let ones = Tensor::ones((2, 5), candle::DType::F32, &cpu)?;
    let zeros = Tensor::zeros((2, 5), candle::DType::F32, &cpu)?;
    let loss = discriminator_loss(&[ones.clone()], &[zeros.clone()])?;
    assert_eq!(loss.total.to_scalar::<f32>()?, 0.);

    let noisy = Tensor::randn(0f32, 1., (2, 5), &cpu)?;
    for (real, fake) in [(&noisy, &zeros), (&ones, &noisy), (&noisy, &noisy)] {
        let loss = discriminator_loss(&[real.clone()], &[fake.clone()])?;
        assert!(loss.total.to_scalar::<f32>()? > 0.);
    }
    Ok(())
}

#[test]
fn discriminator_loss_needs_matching_heads() -> Result<()> {
    let t = Tensor::new(&[0f32], &Device::Cpu)?;
    assert!(discriminator_loss(&[t.clone()], &[]).is_err());
    assert!(discriminator_loss(&[], &[]).is_err());
    Ok(())
}

#[test]
fn generator_loss_values() -> Result<()> {
    let cpu = Device::Cpu;
    let a = Tensor::new(&[[0.5f32; 4]], &cpu)?;
    let b = Tensor::new(&[1f32, 3.], &cpu)?;
    let (total, per_head) = generator_loss(&[a, b])?;
    assert_eq!(per_head.len(), 2);
    assert_eq!(to_vec0_round(&per_head[0], 4)?, 0.25);
    assert_eq!(to_vec0_round(&per_head[1], 4)?, 2.);
    assert_eq!(to_vec0_round(&total, 4)?, 2.25);
    Ok(())
}

#[test]
fn feature_loss_is_doubled_l1() -> Result<()> {
    let cpu = Device::Cpu;
    let r1 = Tensor::new(&[1f32, 2., 3.], &cpu)?;
    let g1 = Tensor::new(&[1f32, 1., 1.], &cpu)?;
    let r2 = Tensor::new(&[[0f32, 0.]], &cpu)?;
    let g2 = Tensor::new(&[[0.5f32, -0.5]], &cpu)?;
    let r3 = Tensor::new(&[2f32], &cpu)?;
    let g3 = Tensor::new(&[0f32], &cpu)?;
    // head 0: mean(|[0, 1, 2]|) = 1, mean(|[-.5, .5]|) = .5; head 1: 2.
    let loss = feature_loss(&[vec![r1, r2], vec![r3]], &[vec![g1, g2], vec![g3]])?;
    assert_eq!(to_vec0_round(&loss, 4)?, 7.);
    Ok(())
}

#[test]
fn feature_loss_only_differentiates_the_fake_side() -> Result<()> {
    let cpu = Device::Cpu;
    let real = candle::Var::new(&[1f32, 2.], &cpu)?;
    let fake = candle::Var::new(&[0f32, 0.], &cpu)?;
    let loss = feature_loss(
        &[vec![real.as_tensor().clone()]],
        &[vec![fake.as_tensor().clone()]],
    )?;
    let grads = loss.backward()?;
    assert!(grads.get(&real).is_none());
    assert_eq!(grads.get(&fake).unwrap().to_vec1::<f32>()?, [-1., -1.]);
    Ok(())
}

#[test]
fn masked_l1_ignores_padding() -> Result<()> {
    let cpu = Device::Cpu;
    let mask = Tensor::new(&[[[1f32, 1., 0., 0.]]], &cpu)?;
    let target = Tensor::new(&[[[1f32, 2., 3., 4.], [1., 1., 1., 1.]]], &cpu)?;
    let pred = Tensor::new(&[[[0f32, 2., 9., -7.], [0., 0., 5., 5.]]], &cpu)?;
    let loss = masked_l1_loss(&target, &pred, &mask)?;
    // |1| + |1| + |1| over 8 elements
    assert_eq!(to_vec0_round(&loss, 4)?, 0.375);

    let pred_other_padding = Tensor::new(&[[[0f32, 2., -100., 3.], [0., 0., 42., 0.]]], &cpu)?;
    let target_other_padding = Tensor::new(&[[[1f32, 2., 0., 0.], [1., 1., 7., 7.]]], &cpu)?;
    let other = masked_l1_loss(&target_other_padding, &pred_other_padding, &mask)?;
    assert_eq!(loss.to_scalar::<f32>()?, other.to_scalar::<f32>()?);
    Ok(())
}

#[test]
fn kl_loss_matches_reference() -> Result<()> {
    let cpu = Device::Cpu;
    let z_p = Tensor::new(&[[[1f32, 2., 5.]]], &cpu)?;
    let m_p = Tensor::new(&[[[0f32, 0., 0.]]], &cpu)?;
    let logs_p = Tensor::new(&[[[0f32, 0., 0.]]], &cpu)?;
    let logs_q = Tensor::new(&[[[0f32, 0., 0.]]], &cpu)?;
    let mask = Tensor::new(&[[[1f32, 1., 0.]]], &cpu)?;
    // kl = -0.5 + 0.5 * z^2 -> [0, 1.5, 12] masked -> 1.5 / 2
    let loss = kl_loss(&z_p, &logs_q, &m_p, &logs_p, &mask)?;
    assert_eq!(to_vec0_round(&loss, 4)?, 0.75);
    Ok(())
}
