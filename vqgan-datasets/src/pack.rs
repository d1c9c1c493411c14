//! Builds the packed corpus: one [`TextData`] record per (source, group) with the cleaned
//! transcript, its phonemes and the quantized codes of every utterance.
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use candle::{DType, Tensor};
use serde::Deserialize;

use crate::files::{list_files, with_suffix, AUDIO_EXTENSIONS};
use crate::protos::{Semantics, Sentence, TextData};
use crate::stream::pack_pb_stream;
use crate::text::{Phonemizer, TextCleaner};
use crate::{Error, PackError, Result};

fn default_parent_level() -> usize {
    1
}

/// A directory of audio files with paired transcripts and `.npy` codes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetSource {
    pub root: PathBuf,
    pub name: String,
    pub languages: Vec<String>,
    /// Transcript extension, e.g. `.lab` or `.normalized.txt`.
    pub extension: String,
    /// Files are grouped by their parent (1) or grandparent (2) directory name.
    #[serde(default = "default_parent_level")]
    pub parent_level: usize,
}

impl DatasetSource {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let sources = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&sources)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupTask {
    pub source: String,
    pub name: String,
    pub languages: Vec<String>,
    pub extension: String,
    pub files: Vec<PathBuf>,
}

fn group_name(path: &Path, parent_level: usize) -> String {
    let mut dir = path;
    for _ in 0..parent_level {
        dir = dir.parent().unwrap_or(Path::new(""));
    }
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lists the audio files of `source` and groups them by directory name.
pub fn discover_groups(source: &DatasetSource) -> Result<Vec<GroupTask>> {
    if !(1..=2).contains(&source.parent_level) {
        return Err(Error::InvalidParentLevel(source.parent_level));
    }
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for file in list_files(&source.root, AUDIO_EXTENSIONS, true)? {
        let name = group_name(&file, source.parent_level);
        groups.entry(name).or_default().push(file);
    }
    tracing::info!(root = ?source.root, groups = groups.len(), "found groups");
    Ok(groups
        .into_iter()
        .map(|(name, files)| GroupTask {
            source: source.name.clone(),
            name,
            languages: source.languages.clone(),
            extension: source.extension.clone(),
            files,
        })
        .collect())
}

/// Reads a `.npy` code array: each row of a 2d array is one code vector, a 1d array is a single
/// vector.
pub fn load_codes<P: AsRef<Path>>(path: P) -> Result<Vec<Semantics>> {
    let codes = Tensor::read_npy(path)?.to_dtype(DType::I64)?;
    let rows = match codes.rank() {
        1 => vec![codes.to_vec1::<i64>()?],
        2 => codes.to_vec2::<i64>()?,
        _ => return Err(Error::CodeArrayRank(codes.dims().to_vec())),
    };
    rows.into_iter()
        .map(|row| {
            let values = row
                .into_iter()
                .map(|v| u32::try_from(v).map_err(|_| Error::CodeValue(v)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Semantics { values })
        })
        .collect()
}

/// Result of packing one group.
#[derive(Debug)]
pub struct TaskOutput {
    pub source: String,
    pub name: String,
    /// The length prefixed record.
    pub bytes: Vec<u8>,
    pub sentences: usize,
    /// Audio files without a transcript or code array.
    pub unpaired: usize,
    pub errors: Vec<PackError>,
}

fn parse_file(
    file: &Path,
    text_file: &Path,
    codes_file: &Path,
    languages: &[String],
    cleaner: &TextCleaner,
    phonemizer: &dyn Phonemizer,
) -> Result<Sentence> {
    let text = cleaner.clean(&std::fs::read_to_string(text_file)?);
    let phones = phonemizer.phonemize(&text, languages)?;
    let semantics = load_codes(codes_file)?;
    tracing::trace!(?file, phones = phones.len(), codes = semantics.len());
    Ok(Sentence {
        text,
        phones,
        semantics,
    })
}

pub fn run_task(task: &GroupTask, cleaner: &TextCleaner, phonemizer: &dyn Phonemizer) -> TaskOutput {
    let mut sentences = vec![];
    let mut unpaired = 0;
    let mut errors = vec![];
    for file in task.files.iter() {
        let codes_file = with_suffix(file, ".npy");
        let text_file = with_suffix(file, &task.extension);
        if !codes_file.exists() || !text_file.exists() {
            unpaired += 1;
            continue;
        }
        match parse_file(file, &text_file, &codes_file, &task.languages, cleaner, phonemizer) {
            Ok(sentence) => sentences.push(sentence),
            Err(error) => {
                tracing::error!(?file, %error, "failed to parse");
                errors.push(PackError {
                    path: file.clone(),
                    error,
                });
            }
        }
    }
    let record = TextData {
        source: task.source.clone(),
        name: task.name.clone(),
        languages: task.languages.clone(),
        sentences,
    };
    TaskOutput {
        source: task.source.clone(),
        name: task.name.clone(),
        bytes: pack_pb_stream(&record),
        sentences: record.sentences.len(),
        unpaired,
        errors,
    }
}

#[derive(Debug, Default)]
pub struct PackReport {
    pub groups: usize,
    pub sentences: usize,
    pub unpaired: usize,
    pub bytes: u64,
    pub errors: Vec<PackError>,
}

/// Packs every group of `sources` on a pool of `workers` threads.
///
/// Records are appended to `writer` by the calling thread as groups complete, so their order
/// varies between runs while their content does not.
pub fn pack_dataset<W: Write>(
    sources: &[DatasetSource],
    phonemizer: &dyn Phonemizer,
    workers: usize,
    writer: &mut W,
) -> Result<PackReport> {
    let cleaner = TextCleaner::new()?;
    let mut tasks = vec![];
    for source in sources {
        tasks.extend(discover_groups(source)?);
    }
    let total = tasks.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("packer-{i}"))
        .build()?;

    let (tx, rx) = std::sync::mpsc::channel::<TaskOutput>();
    let mut report = PackReport::default();
    std::thread::scope(|scope| -> Result<()> {
        let tasks = &tasks;
        let cleaner = &cleaner;
        let producer = scope.spawn(move || {
            pool.scope(|s| {
                for task in tasks.iter() {
                    let tx = tx.clone();
                    s.spawn(move |_| {
                        // The receiver only hangs up after a write error, the output is moot then.
                        let _ = tx.send(run_task(task, cleaner, phonemizer));
                    });
                }
            });
        });
        for output in rx {
            writer.write_all(&output.bytes)?;
            report.groups += 1;
            report.sentences += output.sentences;
            report.unpaired += output.unpaired;
            report.bytes += output.bytes.len() as u64;
            report.errors.extend(output.errors);
            tracing::info!(
                source = %output.source,
                group = %output.name,
                sentences = output.sentences,
                "packed {}/{total}",
                report.groups
            );
        }
        producer.join().map_err(|_| Error::WorkerPanic)
    })?;
    writer.flush()?;
    tracing::info!(
        groups = report.groups,
        sentences = report.sentences,
        unpaired = report.unpaired,
        errors = report.errors.len(),
        "done"
    );
    Ok(report)
}
