//! Renders mel spectrograms side by side for visual inspection.
use candle::{DType, Tensor};
use image::{Rgb, RgbImage};

use crate::{Error, Result};

const VIRIDIS: [[f32; 3]; 5] = [
    [68., 1., 84.],
    [59., 82., 139.],
    [33., 145., 140.],
    [94., 201., 98.],
    [253., 231., 37.],
];

const SEPARATOR: u32 = 2;

fn colormap(v: f32) -> Rgb<u8> {
    let v = v.clamp(0., 1.) * (VIRIDIS.len() - 1) as f32;
    let lo = (v.floor() as usize).min(VIRIDIS.len() - 2);
    let t = v - lo as f32;
    let (a, b) = (VIRIDIS[lo], VIRIDIS[lo + 1]);
    let mix = |i: usize| (a[i] + (b[i] - a[i]) * t).round() as u8;
    Rgb([mix(0), mix(1), mix(2)])
}

/// Stacks `(n_mels, frames)` spectrograms vertically, low frequencies at the bottom of each
/// panel. Each panel is normalized to its own value range.
///
/// The titles are not drawn, they are joined into the caption returned next to the image.
pub fn plot_mels(mels: &[Tensor], titles: &[&str]) -> Result<(RgbImage, String)> {
    if mels.is_empty() || mels.len() != titles.len() {
        return Err(Error::InvalidBatch(format!(
            "{} mels for {} titles",
            mels.len(),
            titles.len()
        )));
    }
    let panels = mels
        .iter()
        .map(|m| m.to_dtype(DType::F32)?.to_vec2::<f32>())
        .collect::<candle::Result<Vec<_>>>()?;
    let height = panels.iter().map(|p| p.len()).max().unwrap_or(0) as u32;
    let width = panels
        .iter()
        .flat_map(|p| p.first().map(|row| row.len()))
        .max()
        .unwrap_or(0)
        .max(1) as u32;
    let n = panels.len() as u32;
    let mut img = RgbImage::from_pixel(
        width,
        (height * n + SEPARATOR * (n - 1)).max(1),
        Rgb([255, 255, 255]),
    );
    for (idx, panel) in panels.iter().enumerate() {
        let (lo, hi) = panel
            .iter()
            .flatten()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = if hi > lo { hi - lo } else { 1. };
        let top = idx as u32 * (height + SEPARATOR);
        let rows = panel.len() as u32;
        for (r, row) in panel.iter().enumerate() {
            let y = top + rows - 1 - r as u32;
            for (x, &v) in row.iter().enumerate() {
                img.put_pixel(x as u32, y, colormap((v - lo) / range));
            }
        }
    }
    Ok((img, titles.join(" | ")))
}
