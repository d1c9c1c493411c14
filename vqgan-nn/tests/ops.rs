use candle::{DType, Device, Result, Tensor};
use vqgan_nn::ops::{feature_length, mel_length, sequence_mask, sequence_mask_from_lengths};

#[test]
fn mask_rows_sum_to_clamped_lengths() -> Result<()> {
    let lengths = [0usize, 1, 4, 7, 9];
    let max_len = 7;
    let mask = sequence_mask_from_lengths(&lengths, max_len, &Device::Cpu)?;
    assert_eq!(mask.dims(), &[5, 7]);
    assert_eq!(mask.dtype(), DType::U8);
    let sums = mask.to_dtype(DType::U32)?.sum(1)?.to_vec1::<u32>()?;
    let expected = lengths
        .iter()
        .map(|&l| l.min(max_len) as u32)
        .collect::<Vec<_>>();
    assert_eq!(sums, expected);
    Ok(())
}

#[test]
fn mask_edge_rows() -> Result<()> {
    let lengths = Tensor::new(&[0i64, 3], &Device::Cpu)?;
    let mask = sequence_mask(&lengths, 3)?.to_vec2::<u8>()?;
    assert_eq!(mask, [[0, 0, 0], [1, 1, 1]]);
    Ok(())
}

#[test]
fn mask_prefix_is_contiguous() -> Result<()> {
    let lengths = Tensor::new(&[2u32, 5], &Device::Cpu)?;
    let mask = sequence_mask(&lengths, 6)?.to_vec2::<u8>()?;
    assert_eq!(mask, [[1, 1, 0, 0, 0, 0], [1, 1, 1, 1, 1, 0]]);
    Ok(())
}

#[test]
fn mask_rejects_float_lengths() -> Result<()> {
    let lengths = Tensor::new(&[2f32], &Device::Cpu)?;
    assert!(sequence_mask(&lengths, 4).is_err());
    Ok(())
}

#[test]
fn length_derivations_round_down() {
    assert_eq!(feature_length(64000, 640, 2), 50);
    assert_eq!(feature_length(64639, 640, 2), 50);
    assert_eq!(feature_length(1279, 640, 2), 0);
    assert_eq!(feature_length(8000, 640, 1), 12);
    assert_eq!(mel_length(16000, 640), 25);
    assert_eq!(mel_length(8000, 640), 12);
    assert_eq!(mel_length(639, 640), 0);
}
