//! Mono waveforms read from a directory of WAV files.
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::files::list_files;
use crate::{Error, Result};

pub fn read_wav<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate != sample_rate {
        return Err(Error::SampleRate {
            path: path.to_path_buf(),
            expected: sample_rate,
            got: spec.sample_rate,
        });
    }
    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    let channels = spec.channels.max(1) as usize;
    if channels == 1 {
        return Ok(samples);
    }
    Ok(samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

#[derive(Debug, Clone)]
pub struct AudioFolder {
    files: Vec<PathBuf>,
    sample_rate: u32,
    max_samples: Option<usize>,
}

impl AudioFolder {
    pub fn new<P: AsRef<Path>>(
        root: P,
        sample_rate: u32,
        max_samples: Option<usize>,
    ) -> Result<Self> {
        let files = list_files(root, &["wav"], true)?;
        if files.is_empty() {
            return Err(Error::EmptyDataset);
        }
        Ok(Self {
            files,
            sample_rate,
            max_samples,
        })
    }

    /// Drops files holding fewer than `min_samples` frames, judged from the WAV header.
    pub fn with_min_samples(mut self, min_samples: usize) -> Result<Self> {
        let mut kept = Vec::with_capacity(self.files.len());
        for file in self.files {
            let frames = WavReader::open(&file)?.duration() as usize;
            if frames < min_samples {
                tracing::warn!(?file, frames, min_samples, "skipping short clip");
            } else {
                kept.push(file);
            }
        }
        if kept.is_empty() {
            return Err(Error::EmptyDataset);
        }
        self.files = kept;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The waveform of file `idx`, cropped to its first `max_samples` samples.
    pub fn load(&self, idx: usize) -> Result<Vec<f32>> {
        let mut wav = read_wav(&self.files[idx], self.sample_rate)?;
        if let Some(max) = self.max_samples {
            wav.truncate(max);
        }
        Ok(wav)
    }

    /// Shuffled batches covering the folder once, the last one may be smaller.
    pub fn batches<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> AudioBatches<'_> {
        let mut order: Vec<usize> = (0..self.files.len()).collect();
        order.shuffle(rng);
        AudioBatches {
            folder: self,
            order,
            batch_size: batch_size.max(1),
            pos: 0,
        }
    }
}

pub struct AudioBatches<'a> {
    folder: &'a AudioFolder,
    order: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl Iterator for AudioBatches<'_> {
    type Item = Result<Vec<Vec<f32>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = usize::min(self.pos + self.batch_size, self.order.len());
        let batch = self.order[self.pos..end]
            .iter()
            .map(|&idx| self.folder.load(idx))
            .collect();
        self.pos = end;
        Some(batch)
    }
}
