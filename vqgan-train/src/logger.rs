//! Experiment logging sinks.
//!
//! Training loops only use the [`LogSink`] trait, the backend is picked by whoever builds the
//! [`crate::TrainingContext`].
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::Result;

pub trait LogSink {
    fn log_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()>;

    fn log_image(&mut self, name: &str, image: &RgbImage, caption: &str, step: usize)
        -> Result<()>;

    /// `samples` is a mono clip in `[-1, 1]`.
    fn log_audio(&mut self, name: &str, samples: &[f32], sample_rate: u32, step: usize)
        -> Result<()>;
}

/// Emits every record as a `tracing` event, media payloads are summarized rather than stored.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
        tracing::info!(target: "vqgan::metrics", step, metric = name, value);
        Ok(())
    }

    fn log_image(&mut self, name: &str, image: &RgbImage, caption: &str, step: usize) -> Result<()> {
        tracing::debug!(
            target: "vqgan::metrics",
            step,
            metric = name,
            caption,
            width = image.width(),
            height = image.height(),
            "image"
        );
        Ok(())
    }

    fn log_audio(&mut self, name: &str, samples: &[f32], sample_rate: u32, step: usize) -> Result<()> {
        tracing::debug!(
            target: "vqgan::metrics",
            step,
            metric = name,
            samples = samples.len(),
            sample_rate,
            "audio"
        );
        Ok(())
    }
}

/// Writes scalars to `metrics.jsonl`, images as PNG and audio as 32-bit float WAV under
/// `media/<name>/`.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    metrics: BufWriter<File>,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let metrics = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("metrics.jsonl"))?;
        Ok(Self {
            dir,
            metrics: BufWriter::new(metrics),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn media_path(&self, name: &str, step: usize, ext: &str) -> Result<PathBuf> {
        let dir = name
            .split('/')
            .filter(|p| !p.is_empty() && *p != "..")
            .fold(self.dir.join("media"), |dir, p| dir.join(p));
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("step-{step:08}.{ext}")))
    }

    fn record(&mut self, record: serde_json::Value) -> Result<()> {
        serde_json::to_writer(&mut self.metrics, &record)?;
        self.metrics.write_all(b"\n")?;
        self.metrics.flush()?;
        Ok(())
    }
}

impl LogSink for FileSink {
    fn log_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
        self.record(serde_json::json!({ "step": step, "name": name, "value": value }))
    }

    fn log_image(&mut self, name: &str, image: &RgbImage, caption: &str, step: usize) -> Result<()> {
        let path = self.media_path(name, step, "png")?;
        image.save(&path)?;
        self.record(serde_json::json!({
            "step": step,
            "name": name,
            "caption": caption,
            "path": path.strip_prefix(&self.dir).unwrap_or(&path),
        }))
    }

    fn log_audio(&mut self, name: &str, samples: &[f32], sample_rate: u32, step: usize) -> Result<()> {
        let path = self.media_path(name, step, "wav")?;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        self.record(serde_json::json!({
            "step": step,
            "name": name,
            "sample_rate": sample_rate,
            "path": path.strip_prefix(&self.dir).unwrap_or(&path),
        }))
    }
}
