//! Training loops for the VQGAN audio codec.
//!
//! [`VqganTrainer`] trains the whole codec adversarially with two hand stepped optimizers,
//! [`VqNaiveTrainer`] only trains the reconstruction path against a fixed vocoder.
mod batch;
mod config;
mod context;
mod error;
pub mod logger;
pub mod naive;
pub mod params;
pub mod plot;
pub mod stack;
pub mod vqgan;

pub use batch::Batch;
pub use config::VqganConfig;
pub use context::TrainingContext;
pub use error::{Error, Result};
pub use logger::{FileSink, LogSink, TracingSink};
pub use naive::{NaiveStepReport, VqNaiveTrainer};
pub use params::{CheckpointState, Group, ParamGroups, Partition};
pub use vqgan::{VqganStepReport, VqganTrainer};
