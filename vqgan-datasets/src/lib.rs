//! Datasets for VQGAN training: the packed text/phoneme/code corpus and raw audio folders.
pub mod audio;
mod error;
pub mod files;
pub mod pack;
pub mod protos;
pub mod sampler;
pub mod stream;
pub mod text;

pub use audio::{read_wav, AudioFolder};
pub use error::{Error, PackError, Result};
pub use pack::{discover_groups, pack_dataset, run_task, DatasetSource, GroupTask, PackReport};
pub use sampler::GroupSampler;
pub use stream::{pack_pb_stream, read_pb_stream, write_pb_stream, PbStream};
pub use text::{GraphemePhonemizer, Phonemizer, TextCleaner};
