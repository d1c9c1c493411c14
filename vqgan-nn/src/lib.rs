// This crate shares its error type with candle-core, the tensor level helpers here only ever fail
// with shape or dtype errors coming from candle itself.
pub mod grad;
pub mod loss;
pub mod ops;
pub mod optim;
pub mod scheduler;
pub mod segment;

pub use grad::{clip_grad_norm, grad_norm};
pub use ops::{feature_length, interpolate_nearest1d, mel_length, sequence_mask};
pub use optim::{OptimizerConfig, ScheduledOptimizer, UpdateReport};
pub use scheduler::{LrScheduler, SchedulerConfig};
pub use segment::{rand_slice_segments, slice_segments};
