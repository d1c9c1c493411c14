/// Main library error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The real and generated waveform crops handed to the discriminator differ in shape.
    #[error("segment shape mismatch: real {real:?} vs generated {generated:?}")]
    SegmentShapeMismatch {
        real: Vec<usize>,
        generated: Vec<usize>,
    },

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("checkpoint {}: {msg}", path.display())]
    Checkpoint {
        path: std::path::PathBuf,
        msg: String,
    },

    #[error(transparent)]
    Candle(#[from] candle::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    SafeTensor(#[from] safetensors::SafeTensorError),
}

pub type Result<T> = std::result::Result<T, Error>;
