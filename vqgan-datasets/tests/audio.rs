use std::path::{Path, PathBuf};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use vqgan_datasets::{read_wav, AudioFolder, Error};

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

fn folder(name: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("vqgan-audio-{name}-{}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    std::fs::create_dir_all(dir.join("nested"))?;
    Ok(dir)
}

#[test]
fn stereo_is_mixed_down() -> Result<()> {
    let dir = folder("stereo")?;
    let path = dir.join("a.wav");
    write_wav(&path, 16000, 2, &[16384, 0, -16384, -16384, 32767, 32767])?;
    let wav = read_wav(&path, 16000)?;
    assert_eq!(wav.len(), 3);
    assert!((wav[0] - 0.25).abs() < 1e-4);
    assert!((wav[1] + 0.5).abs() < 1e-4);
    assert!(wav[2] > 0.99);

    let err = read_wav(&path, 32000).unwrap_err();
    assert!(matches!(
        err,
        Error::SampleRate {
            expected: 32000,
            got: 16000,
            ..
        }
    ));
    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn folder_batches() -> Result<()> {
    let dir = folder("batches")?;
    write_wav(&dir.join("a.wav"), 16000, 1, &[100; 50])?;
    write_wav(&dir.join("b.wav"), 16000, 1, &[100; 10])?;
    write_wav(&dir.join("nested").join("c.wav"), 16000, 1, &[100; 30])?;
    std::fs::write(dir.join("notes.txt"), "ignored")?;

    let audio = AudioFolder::new(&dir, 16000, Some(20))?;
    assert_eq!(audio.len(), 3);
    assert_eq!(audio.load(0)?.len(), 20);
    assert_eq!(audio.load(1)?.len(), 10);

    let mut rng = StdRng::seed_from_u64(0);
    let batches = audio.batches(2, &mut rng).collect::<vqgan_datasets::Result<Vec<_>>>()?;
    let sizes: Vec<_> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, [2, 1]);
    let mut lengths: Vec<_> = batches.iter().flatten().map(|w| w.len()).collect();
    lengths.sort();
    assert_eq!(lengths, [10, 20, 20]);

    let empty = folder("empty")?;
    assert!(matches!(
        AudioFolder::new(&empty, 16000, None),
        Err(Error::EmptyDataset)
    ));
    std::fs::remove_dir_all(dir)?;
    std::fs::remove_dir_all(empty)?;
    Ok(())
}

#[test]
fn short_clips_are_dropped() -> Result<()> {
    let dir = folder("short")?;
    write_wav(&dir.join("long.wav"), 16000, 1, &[100; 64])?;
    write_wav(&dir.join("short.wav"), 16000, 1, &[100; 8])?;
    write_wav(&dir.join("nested").join("stereo.wav"), 16000, 2, &[100; 40])?;

    let audio = AudioFolder::new(&dir, 16000, None)?.with_min_samples(32)?;
    let names = audio
        .files()
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, ["long.wav"]);

    assert!(matches!(
        AudioFolder::new(&dir, 16000, None)?.with_min_samples(100),
        Err(Error::EmptyDataset)
    ));
    std::fs::remove_dir_all(dir)?;
    Ok(())
}
