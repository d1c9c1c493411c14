//! Log-mel spectrogram computed with plain tensor ops so it stays differentiable.
//!
//! The short time Fourier transform is expressed as a strided 1d convolution against a bank of
//! windowed cosine and sine kernels, which lets the mel loss on generated audio backpropagate into
//! the vocoder.
use candle::{DType, Device, Module, Result, Tensor, D};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MelConfig {
    pub sample_rate: usize,
    pub n_fft: usize,
    pub win_length: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub f_min: f64,
    /// Defaults to the Nyquist frequency.
    pub f_max: Option<f64>,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32000,
            n_fft: 2048,
            win_length: 2048,
            hop_length: 640,
            n_mels: 128,
            f_min: 0.,
            f_max: None,
        }
    }
}

impl MelConfig {
    pub fn n_freqs(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Left and right reflect padding, `n_fft - hop_length` samples in total.
    pub fn padding(&self) -> (usize, usize) {
        let total = self.n_fft - self.hop_length;
        let left = total / 2;
        (left, total - left)
    }
}

const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = 15.0;
const F_SP: f64 = 200.0 / 3.0;

fn logstep() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    if hz < MIN_LOG_HZ {
        hz / F_SP
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep()
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel < MIN_LOG_MEL {
        mel * F_SP
    } else {
        MIN_LOG_HZ * ((mel - MIN_LOG_MEL) * logstep()).exp()
    }
}

/// Slaney style triangular filterbank with area normalization, `n_mels x n_freqs` row major.
pub fn mel_filterbank(
    sample_rate: usize,
    n_fft: usize,
    n_mels: usize,
    f_min: f64,
    f_max: f64,
) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let fft_freqs = (0..n_freqs)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect::<Vec<_>>();
    let (mel_min, mel_max) = (hz_to_mel(f_min), hz_to_mel(f_max));
    let hz_points = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect::<Vec<_>>();
    let mut weights = vec![0f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let (lo, center, hi) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        let enorm = 2.0 / (hi - lo);
        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - lo) / (center - lo);
            let upper = (hi - f) / (hi - center);
            let w = lower.min(upper).max(0.0);
            weights[m * n_freqs + k] = (w * enorm) as f32;
        }
    }
    weights
}

/// Periodic Hann window of `win_length` samples centered in a frame of `n_fft` samples.
fn padded_window(win_length: usize, n_fft: usize) -> Vec<f64> {
    let offset = (n_fft - win_length) / 2;
    let mut window = vec![0f64; n_fft];
    for n in 0..win_length {
        let phase = 2.0 * std::f64::consts::PI * n as f64 / win_length as f64;
        window[offset + n] = 0.5 - 0.5 * phase.cos();
    }
    window
}

#[derive(Debug, Clone)]
pub struct LogMelSpectrogram {
    config: MelConfig,
    // (2 * n_freqs, 1, n_fft), real parts first.
    dft_kernel: Tensor,
    // (n_mels, n_freqs)
    mel_basis: Tensor,
    span: tracing::Span,
}

impl LogMelSpectrogram {
    pub fn new(config: MelConfig, device: &Device) -> Result<Self> {
        if config.hop_length == 0 || config.hop_length > config.n_fft {
            candle::bail!(
                "hop_length {} must be in 1..={}",
                config.hop_length,
                config.n_fft
            )
        }
        if config.win_length > config.n_fft {
            candle::bail!(
                "win_length {} is larger than n_fft {}",
                config.win_length,
                config.n_fft
            )
        }
        let n_fft = config.n_fft;
        let n_freqs = config.n_freqs();
        let window = padded_window(config.win_length, n_fft);
        let mut kernel = vec![0f32; 2 * n_freqs * n_fft];
        for k in 0..n_freqs {
            for (n, w) in window.iter().enumerate() {
                let angle = 2.0 * std::f64::consts::PI * (k * n % n_fft) as f64 / n_fft as f64;
                kernel[k * n_fft + n] = (w * angle.cos()) as f32;
                kernel[(n_freqs + k) * n_fft + n] = (-w * angle.sin()) as f32;
            }
        }
        let dft_kernel = Tensor::from_vec(kernel, (2 * n_freqs, 1, n_fft), device)?;
        let f_max = config.f_max.unwrap_or(config.sample_rate as f64 / 2.0);
        let mel_basis = mel_filterbank(
            config.sample_rate,
            n_fft,
            config.n_mels,
            config.f_min,
            f_max,
        );
        let mel_basis = Tensor::from_vec(mel_basis, (config.n_mels, n_freqs), device)?;
        let span = tracing::span!(tracing::Level::TRACE, "log-mel");
        Ok(Self {
            config,
            dft_kernel,
            mel_basis,
            span,
        })
    }

    pub fn config(&self) -> &MelConfig {
        &self.config
    }

    fn reflect_pad(&self, xs: &Tensor) -> Result<Tensor> {
        let time = xs.dim(D::Minus1)?;
        let (left, right) = self.config.padding();
        if time <= left.max(right) {
            candle::bail!(
                "waveform of {time} samples is too short for reflect padding of ({left}, {right})"
            )
        }
        let ids = (0..left)
            .map(|i| left - i)
            .chain(0..time)
            .chain((0..right).map(|i| time - 2 - i))
            .map(|i| i as u32)
            .collect::<Vec<_>>();
        let ids = Tensor::new(ids.as_slice(), xs.device())?;
        xs.index_select(&ids, D::Minus1)
    }
}

impl Module for LogMelSpectrogram {
    /// Maps `(batch, time)` or `(batch, 1, time)` audio to `(batch, n_mels, time / hop_length)`.
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        let xs = match xs.rank() {
            2 => xs.unsqueeze(1)?,
            3 if xs.dim(1)? == 1 => xs.clone(),
            _ => candle::bail!("expected (batch, time) or (batch, 1, time) audio, got {xs:?}"),
        };
        let xs = self.reflect_pad(&xs.to_dtype(DType::F32)?)?;
        let spec = xs.conv1d(&self.dft_kernel, 0, self.config.hop_length, 1, 1)?;
        let n_freqs = self.config.n_freqs();
        let re = spec.narrow(1, 0, n_freqs)?;
        let im = spec.narrow(1, n_freqs, n_freqs)?;
        let magnitude = ((re.sqr()? + im.sqr()?)? + 1e-6)?.sqrt()?;
        let mel = self.mel_basis.broadcast_matmul(&magnitude)?;
        mel.maximum(1e-5f32)?.log()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_scale_round_trips() {
        for hz in [0., 440., 999., 1000., 4000., 16000.] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
    }

    #[test]
    fn padding_splits_the_hop_remainder() {
        let cfg = MelConfig::default();
        assert_eq!(cfg.padding(), (704, 704));
        let cfg = MelConfig {
            n_fft: 65,
            win_length: 65,
            hop_length: 16,
            ..MelConfig::default()
        };
        assert_eq!(cfg.padding(), (24, 25));
    }

    #[test]
    fn filterbank_rows_are_non_negative() {
        let fb = mel_filterbank(16000, 64, 8, 0., 8000.);
        assert_eq!(fb.len(), 8 * 33);
        assert!(fb.iter().all(|w| *w >= 0.));
        for row in fb.chunks(33) {
            assert!(row.iter().any(|w| *w > 0.));
        }
    }
}
