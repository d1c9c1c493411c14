use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use vqgan_datasets::{pack_dataset, DatasetSource, GraphemePhonemizer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON list of sources: `[{"root": ..., "name": ..., "languages": [...], "extension": ".lab"}]`.
    #[arg(long)]
    config: PathBuf,

    #[arg(long, default_value = "data/quantized-dataset.protos")]
    output: PathBuf,

    /// Number of packing threads, defaults to the number of cores.
    #[arg(long)]
    workers: Option<usize>,

    /// Enable tracing (generates a trace-timestamp.json file).
    #[arg(long)]
    tracing: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = vqgan_examples::init_tracing(args.tracing);

    let sources = DatasetSource::from_json_file(&args.config)?;
    if sources.is_empty() {
        bail!("no source in {}", args.config.display())
    }
    if let Some(dir) = args.output.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let workers = args
        .workers
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));
    let mut writer = BufWriter::new(std::fs::File::create(&args.output)?);
    let report = pack_dataset(&sources, &GraphemePhonemizer, workers, &mut writer)?;
    for error in report.errors.iter() {
        tracing::warn!("skipped {error}");
    }
    println!(
        "packed {} sentences from {} groups into {} ({} bytes), {} unpaired files, {} failures",
        report.sentences,
        report.groups,
        args.output.display(),
        report.bytes,
        report.unpaired,
        report.errors.len()
    );
    Ok(())
}
