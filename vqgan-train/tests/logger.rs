use anyhow::Result;
use image::{Rgb, RgbImage};
use vqgan_train::{FileSink, LogSink, TracingSink};

#[test]
fn file_sink_writes_metrics_and_media() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("vqgan-filesink-{}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    let mut sink = FileSink::new(&dir)?;
    sink.log_scalar("train/generator/loss", 1.5, 3)?;
    let image = RgbImage::from_pixel(4, 2, Rgb([1, 2, 3]));
    sink.log_image("sample-0/mels", &image, "Generated | Ground-Truth", 3)?;
    sink.log_audio("sample-0/wavs/gt", &[0.0, 0.5, -0.5], 16000, 3)?;

    let metrics = std::fs::read_to_string(dir.join("metrics.jsonl"))?;
    let records = metrics
        .lines()
        .map(serde_json::from_str::<serde_json::Value>)
        .collect::<serde_json::Result<Vec<_>>>()?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["name"], "train/generator/loss");
    assert_eq!(records[0]["value"], 1.5);
    assert_eq!(records[1]["caption"], "Generated | Ground-Truth");

    let png = dir.join("media/sample-0/mels/step-00000003.png");
    assert_eq!(image::open(&png)?.to_rgb8(), image);
    let wav = dir.join("media/sample-0/wavs/gt/step-00000003.wav");
    let samples = hound::WavReader::open(&wav)?
        .samples::<f32>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    assert_eq!(samples, [0.0, 0.5, -0.5]);
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn tracing_sink_accepts_everything() -> Result<()> {
    let mut sink = TracingSink;
    sink.log_scalar("val/mel_loss", 0.25, 0)?;
    sink.log_image("sample-0/mels", &RgbImage::new(1, 1), "", 0)?;
    sink.log_audio("sample-0/wavs/gt", &[], 16000, 0)?;
    Ok(())
}
