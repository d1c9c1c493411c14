use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid parent level {0}, expected 1 or 2")]
    InvalidParentLevel(usize),

    #[error("truncated record: expected {expected} bytes, got {got}")]
    TruncatedRecord { expected: usize, got: usize },

    #[error("phonemization failed: {0}")]
    Phonemize(String),

    #[error("unsupported code array of shape {0:?}, expected one or two dimensions")]
    CodeArrayRank(Vec<usize>),

    #[error("code value {0} does not fit a u32")]
    CodeValue(i64),

    #[error("{path:?}: sample rate {got}, expected {expected}")]
    SampleRate {
        path: PathBuf,
        expected: u32,
        got: u32,
    },

    #[error("no group has any sentence")]
    EmptyDataset,

    #[error("packer worker panicked")]
    WorkerPanic,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Candle(#[from] candle::Error),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A file the packer skipped, kept in the report next to the reason.
#[derive(Debug)]
pub struct PackError {
    pub path: PathBuf,
    pub error: Error,
}

impl std::fmt::Display for PackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}
