use serde::Deserialize;
use vqgan_models::{MelConfig, ModelConfig};
use vqgan_nn::{OptimizerConfig, SchedulerConfig};

use crate::{Error, Result};

/// Configuration shared by both training loops, usually read from a json file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VqganConfig {
    pub sample_rate: usize,
    pub hop_length: usize,
    /// Length in samples of the waveform crops scored by the discriminator.
    pub segment_size: usize,
    /// Stage 1: only the encoder side and the decoder learn, the vocoder and the
    /// discriminator stay fixed.
    pub freeze_hifigan: bool,
    /// Stage 2: downsampler, mel encoder and quantizer stay fixed.
    pub freeze_vq: bool,
    pub grad_clip: f64,
    pub mel: MelConfig,
    pub model: ModelConfig,
    pub optimizer: OptimizerConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for VqganConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32000,
            hop_length: 640,
            segment_size: 20480,
            freeze_hifigan: false,
            freeze_vq: false,
            grad_clip: 1.0,
            mel: MelConfig::default(),
            model: ModelConfig::default(),
            optimizer: OptimizerConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl VqganConfig {
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&config)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the mel transform, the vocoder and the training loop agree on rates.
    pub fn validate(&self) -> Result<()> {
        let err = |msg: String| Err(Error::InvalidConfig(msg));
        if self.hop_length == 0 || self.segment_size == 0 {
            return err("hop_length and segment_size must be positive".to_string());
        }
        if self.mel.hop_length != self.hop_length {
            return err(format!(
                "mel hop_length {} differs from hop_length {}",
                self.mel.hop_length, self.hop_length
            ));
        }
        if self.mel.sample_rate != self.sample_rate {
            return err(format!(
                "mel sample_rate {} differs from sample_rate {}",
                self.mel.sample_rate, self.sample_rate
            ));
        }
        if self.mel.n_mels != self.model.n_mels {
            return err(format!(
                "mel n_mels {} differs from model n_mels {}",
                self.mel.n_mels, self.model.n_mels
            ));
        }
        if self.model.hop_length() != self.hop_length {
            return err(format!(
                "generator upsamples by {} but hop_length is {}",
                self.model.hop_length(),
                self.hop_length
            ));
        }
        if self.model.total_stride() == 0 {
            return err("downsample strides must be positive".to_string());
        }
        Ok(())
    }
}
