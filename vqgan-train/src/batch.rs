use candle::{DType, Device, Tensor};

use crate::{Error, Result};

/// A batch of zero padded waveforms.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(batch, time)` f32 samples.
    audios: Tensor,
    /// Valid samples per example, never larger than `time`.
    audio_lengths: Vec<usize>,
}

impl Batch {
    pub fn new(audios: Tensor, audio_lengths: Vec<usize>) -> Result<Self> {
        let (b_sz, time) = audios.dims2()?;
        if audio_lengths.len() != b_sz {
            return Err(Error::InvalidBatch(format!(
                "{} lengths for {b_sz} waveforms",
                audio_lengths.len()
            )));
        }
        if let Some(idx) = audio_lengths.iter().position(|&l| l > time) {
            return Err(Error::InvalidBatch(format!(
                "example {idx} claims {} samples but the buffer holds {time}",
                audio_lengths[idx]
            )));
        }
        let audios = audios.to_dtype(DType::F32)?;
        Ok(Self {
            audios,
            audio_lengths,
        })
    }

    /// Zero pads `waveforms` to the longest one.
    pub fn from_waveforms(waveforms: &[Vec<f32>], device: &Device) -> Result<Self> {
        if waveforms.is_empty() {
            return Err(Error::InvalidBatch("no waveforms".to_string()));
        }
        let time = waveforms.iter().map(|w| w.len()).max().unwrap_or(0);
        let mut data = vec![0f32; waveforms.len() * time];
        for (row, wave) in data.chunks_mut(time.max(1)).zip(waveforms.iter()) {
            row[..wave.len()].copy_from_slice(wave);
        }
        let audios = Tensor::from_vec(data, (waveforms.len(), time), device)?;
        let lengths = waveforms.iter().map(|w| w.len()).collect();
        Self::new(audios, lengths)
    }

    pub fn audios(&self) -> &Tensor {
        &self.audios
    }

    pub fn audio_lengths(&self) -> &[usize] {
        &self.audio_lengths
    }

    pub fn len(&self) -> usize {
        self.audio_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio_lengths.is_empty()
    }

    pub fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(Self {
            audios: self.audios.to_device(device)?,
            audio_lengths: self.audio_lengths.clone(),
        })
    }
}
