use candle::{DType, Device, IndexOp, Result, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use vqgan_nn::{rand_slice_segments, slice_segments};

// Each sample holds its own time index so a slice tells where it was taken from.
fn tagged(b_sz: usize, channels: usize, time: usize) -> Result<Tensor> {
    Tensor::arange(0f32, time as f32, &Device::Cpu)?
        .reshape((1, 1, time))?
        .broadcast_as((b_sz, channels, time))?
        .contiguous()
}

#[test]
fn offsets_are_shared_between_tensors() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let real = tagged(3, 1, 64)?;
    let fake = (tagged(3, 1, 64)? + 1000.)?;
    let lengths = [64, 40, 20];
    for _ in 0..20 {
        let (y, starts) = rand_slice_segments(&real, &lengths, 16, &mut rng)?;
        let y_hat = slice_segments(&fake, &starts, 16)?;
        assert_eq!(y.dims(), y_hat.dims());
        assert_eq!(y.dims(), &[3, 1, 16]);
        let y = y.to_vec3::<f32>()?;
        let y_hat = y_hat.to_vec3::<f32>()?;
        for (idx, &start) in starts.iter().enumerate() {
            assert!(start + 16 <= lengths[idx]);
            assert_eq!(y[idx][0][0], start as f32);
            for t in 0..16 {
                assert_eq!(y[idx][0][t] + 1000., y_hat[idx][0][t]);
            }
        }
    }
    Ok(())
}

#[test]
fn short_examples_start_at_zero() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0);
    let xs = tagged(2, 1, 32)?;
    let (_, starts) = rand_slice_segments(&xs, &[8, 16], 16, &mut rng)?;
    assert_eq!(starts, [0, 0]);
    Ok(())
}

#[test]
fn overlong_windows_are_zero_padded() -> Result<()> {
    let xs = (tagged(1, 2, 10)? + 1.)?;
    let ys = slice_segments(&xs, &[6], 8)?;
    assert_eq!(ys.dims(), &[1, 2, 8]);
    assert_eq!(
        ys.i((0, 1))?.to_vec1::<f32>()?,
        [7., 8., 9., 10., 0., 0., 0., 0.]
    );
    let ys = slice_segments(&xs, &[12], 4)?;
    assert_eq!(ys.sum_all()?.to_scalar::<f32>()?, 0.);
    let ys = slice_segments(&xs, &[0], 16)?;
    assert_eq!(ys.dims(), &[1, 2, 16]);
    assert_eq!(ys.dtype(), DType::F32);
    Ok(())
}

#[test]
fn offset_count_must_match_batch() -> Result<()> {
    let xs = tagged(2, 1, 10)?;
    assert!(slice_segments(&xs, &[0], 4).is_err());
    Ok(())
}
