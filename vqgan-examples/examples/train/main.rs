use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use vqgan_datasets::AudioFolder;
use vqgan_train::{
    Batch, FileSink, LogSink, TracingSink, TrainingContext, VqNaiveTrainer, VqganConfig,
    VqganTrainer,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Which {
    /// Adversarial training of the full codec.
    Vqgan,
    /// Reconstruction only, against a fixed vocoder.
    Naive,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Sink {
    /// Metrics as json lines, images and audio clips under `--log-dir`.
    File,
    /// Metrics as `tracing` events on the `vqgan::metrics` target.
    Tracing,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON training configuration, defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of WAV files at the configured sample rate.
    #[arg(long)]
    data_dir: PathBuf,

    /// Directory of WAV files used for validation, the first training batch otherwise.
    #[arg(long)]
    val_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Which::Vqgan)]
    which: Which,

    /// Where metrics, media and checkpoints are written.
    #[arg(long, default_value = "runs/vqgan")]
    log_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Sink::File)]
    sink: Sink,

    #[arg(long, default_value_t = 100_000)]
    steps: usize,

    #[arg(long, default_value_t = 8)]
    batch_size: usize,

    /// Crop training clips to this many samples.
    #[arg(long, default_value_t = 32000 * 6)]
    max_samples: usize,

    #[arg(long, default_value_t = 1000)]
    val_every: usize,

    #[arg(long, default_value_t = 5000)]
    save_every: usize,

    /// Resume from a checkpoint directory.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Generator weights used as the fixed vocoder by `--which naive`.
    #[arg(long)]
    vocoder: Option<PathBuf>,

    #[arg(long, default_value_t = 299792458)]
    seed: u64,

    /// Run on CPU rather than on GPU.
    #[arg(long)]
    cpu: bool,

    /// Enable tracing (generates a trace-timestamp.json file).
    #[arg(long)]
    tracing: bool,
}

enum Trainer {
    Vqgan(VqganTrainer),
    Naive(VqNaiveTrainer),
}

impl Trainer {
    fn step(&mut self, batch: &Batch, ctx: &mut TrainingContext) -> Result<f64> {
        let loss = match self {
            Self::Vqgan(t) => t.train_step(batch, ctx)?.loss,
            Self::Naive(t) => t.fit_step(batch, ctx)?.loss,
        };
        Ok(loss)
    }

    fn validate(&self, batch: &Batch, ctx: &mut TrainingContext) -> Result<f64> {
        let loss = match self {
            Self::Vqgan(t) => t.validation_step(batch, ctx)?,
            Self::Naive(t) => t.validation_step(batch, ctx)?,
        };
        Ok(loss)
    }

    fn save(&self, dir: &std::path::Path, step: usize) -> Result<()> {
        match self {
            Self::Vqgan(t) => t.save_checkpoint(dir, step)?,
            Self::Naive(t) => t.save_checkpoint(dir, step)?,
        }
        Ok(())
    }

    fn load(&mut self, dir: &std::path::Path) -> Result<usize> {
        let step = match self {
            Self::Vqgan(t) => t.load_checkpoint(dir)?,
            Self::Naive(t) => t.load_checkpoint(dir)?,
        };
        Ok(step)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = vqgan_examples::init_tracing(args.tracing);
    let device = vqgan_examples::device(args.cpu)?;

    let config = match &args.config {
        Some(path) => VqganConfig::from_json_file(path)?,
        None => VqganConfig::default(),
    };
    let sample_rate = config.sample_rate as u32;
    // The mel transform reflect pads every clip, shorter clips cannot be transformed.
    let (left, right) = config.mel.padding();
    let min_samples = left.max(right) + 1;
    let train = AudioFolder::new(&args.data_dir, sample_rate, Some(args.max_samples))?
        .with_min_samples(min_samples)?;
    let val = match &args.val_dir {
        Some(dir) => AudioFolder::new(dir, sample_rate, Some(args.max_samples))?
            .with_min_samples(min_samples)?,
        None => train.clone(),
    };
    let val_batch = {
        let n = usize::min(args.batch_size, val.len());
        let waves = (0..n).map(|i| val.load(i)).collect::<vqgan_datasets::Result<Vec<_>>>()?;
        Batch::from_waveforms(&waves, &device)?
    };
    tracing::info!(train = train.len(), val = val_batch.len(), "audio files");

    let mut trainer = match args.which {
        Which::Vqgan => Trainer::Vqgan(VqganTrainer::new(config, &device)?),
        Which::Naive => {
            let trainer = VqNaiveTrainer::new(config, &device)?;
            match &args.vocoder {
                Some(path) => trainer.load_vocoder(path)?,
                None => tracing::warn!("no --vocoder given, decoding with an untrained vocoder"),
            }
            Trainer::Naive(trainer)
        }
    };

    let sink: Box<dyn LogSink> = match args.sink {
        Sink::File => Box::new(FileSink::new(&args.log_dir)?),
        Sink::Tracing => Box::new(TracingSink),
    };
    let mut ctx = TrainingContext::new(sink, device.clone(), args.seed);
    if let Some(dir) = &args.resume {
        ctx.global_step = trainer.load(dir)?;
        tracing::info!(step = ctx.global_step, "resumed from {}", dir.display());
    }

    let checkpoints = args.log_dir.join("checkpoints");
    let val_every = args.val_every.max(1);
    let save_every = args.save_every.max(1);
    let mut shuffle = StdRng::seed_from_u64(args.seed.wrapping_add(1));
    while ctx.global_step < args.steps {
        for waves in train.batches(args.batch_size, &mut shuffle) {
            let batch = Batch::from_waveforms(&waves?, &device)?;
            let loss = trainer.step(&batch, &mut ctx)?;
            let step = ctx.global_step;
            if step % 100 == 0 {
                tracing::info!(epoch = ctx.epoch, step, loss, "train");
            }
            if step % val_every == 0 {
                let loss = trainer.validate(&val_batch, &mut ctx)?;
                tracing::info!(step, loss, "validation");
            }
            if step % save_every == 0 {
                trainer.save(&checkpoints.join(format!("step-{step:08}")), step)?;
            }
            if step >= args.steps {
                break;
            }
        }
        ctx.epoch += 1;
    }
    trainer.save(&checkpoints.join("last"), ctx.global_step)?;
    Ok(())
}
