use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DownsampleConfig {
    pub channels: usize,
    pub strides: Vec<usize>,
}

impl Default for DownsampleConfig {
    fn default() -> Self {
        Self {
            channels: 512,
            strides: vec![2],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub hidden_channels: usize,
    pub n_layers: usize,
    pub kernel_size: usize,
    /// Dilation of layer `i` is `dilation_rate^i`.
    pub dilation_rate: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            hidden_channels: 512,
            n_layers: 6,
            kernel_size: 5,
            dilation_rate: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    pub codebook_size: usize,
    pub codebook_dim: usize,
    pub commitment_weight: f64,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            codebook_size: 2048,
            codebook_dim: 32,
            commitment_weight: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeakerEncoderConfig {
    pub hidden_channels: usize,
    pub n_layers: usize,
    pub embedding_dim: usize,
}

impl Default for SpeakerEncoderConfig {
    fn default() -> Self {
        Self {
            hidden_channels: 192,
            n_layers: 3,
            embedding_dim: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub initial_channels: usize,
    /// Their product must equal the hop length of the mel transform.
    pub upsample_rates: Vec<usize>,
    pub upsample_kernel_size: usize,
    pub resblock_kernel_sizes: Vec<usize>,
    pub resblock_dilations: Vec<Vec<usize>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            initial_channels: 512,
            upsample_rates: vec![8, 5, 4, 4],
            upsample_kernel_size: 7,
            resblock_kernel_sizes: vec![3, 7, 11],
            resblock_dilations: vec![vec![1, 3, 5], vec![1, 3, 5], vec![1, 3, 5]],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiscriminatorConfig {
    pub periods: Vec<usize>,
    /// Number of multi-scale heads, head `i` sees the audio average pooled `2^i` times.
    pub scales: usize,
    pub channels: Vec<usize>,
    pub kernel_size: usize,
    pub stride: usize,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            periods: vec![2, 3, 5, 7, 11],
            scales: 1,
            channels: vec![32, 128, 512, 1024],
            kernel_size: 5,
            stride: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub n_mels: usize,
    /// Width of the encoder output, the quantized features and the decoder input.
    pub latent_channels: usize,
    pub downsample: Option<DownsampleConfig>,
    pub mel_encoder: EncoderConfig,
    pub quantizer: QuantizerConfig,
    pub decoder: EncoderConfig,
    pub speaker_encoder: Option<SpeakerEncoderConfig>,
    pub generator: GeneratorConfig,
    pub discriminator: DiscriminatorConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_mels: 128,
            latent_channels: 256,
            downsample: Some(DownsampleConfig::default()),
            mel_encoder: EncoderConfig::default(),
            quantizer: QuantizerConfig::default(),
            decoder: EncoderConfig::default(),
            speaker_encoder: Some(SpeakerEncoderConfig::default()),
            generator: GeneratorConfig::default(),
            discriminator: DiscriminatorConfig::default(),
        }
    }
}

impl ModelConfig {
    /// Channel count of the features handed to the mel encoder.
    pub fn feature_channels(&self) -> usize {
        match &self.downsample {
            Some(ds) => ds.channels,
            None => self.n_mels,
        }
    }

    pub fn total_stride(&self) -> usize {
        self.downsample
            .as_ref()
            .map_or(1, |ds| ds.strides.iter().product())
    }

    pub fn hop_length(&self) -> usize {
        self.generator.upsample_rates.iter().product()
    }
}
