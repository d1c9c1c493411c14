use std::path::{Path, PathBuf};

use crate::Result;

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "m4a", "wma", "aac", "aiff", "aif", "aifc",
];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Files under `root` whose extension is in `extensions` (case insensitive, no leading dot),
/// sorted by path.
pub fn list_files<P: AsRef<Path>>(
    root: P,
    extensions: &[&str],
    recursive: bool,
) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    let mut pending = vec![root.as_ref().to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if has_extension(&path, extensions) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Sibling of `path` sharing its stem, `extension` may carry several dots (`.normalized.txt`).
pub fn with_suffix(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_replacement() {
        let p = Path::new("a/b/utt_01.wav");
        assert_eq!(with_suffix(p, ".npy"), Path::new("a/b/utt_01.npy"));
        assert_eq!(
            with_suffix(p, ".normalized.txt"),
            Path::new("a/b/utt_01.normalized.txt")
        );
        assert!(has_extension(Path::new("x.WAV"), AUDIO_EXTENSIONS));
        assert!(!has_extension(Path::new("x.npy"), AUDIO_EXTENSIONS));
    }
}
