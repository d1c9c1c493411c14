use regex::Regex;

use crate::{Error, Result};

/// Removes `{...}` and `<...>` annotations and normalizes whitespace.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    braces: Regex,
    angles: Regex,
    spaces: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            braces: Regex::new(r"\{.*?\}")?,
            angles: Regex::new(r"<.*?>")?,
            spaces: Regex::new(r"\s+")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let text = self.braces.replace_all(text.trim(), " ");
        let text = self.angles.replace_all(&text, " ");
        let text = self.spaces.replace_all(&text, " ");
        text.trim().to_string()
    }
}

/// Text to phoneme conversion used by the packer.
pub trait Phonemizer: Sync {
    /// `languages` lists the languages to try, in order of preference.
    fn phonemize(&self, text: &str, languages: &[String]) -> Result<Vec<String>>;
}

/// Fallback phonemizer emitting one symbol per non whitespace character, lowercased.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphemePhonemizer;

impl Phonemizer for GraphemePhonemizer {
    fn phonemize(&self, text: &str, languages: &[String]) -> Result<Vec<String>> {
        if languages.is_empty() {
            return Err(Error::Phonemize(format!("no language given for {text:?}")));
        }
        Ok(text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(|c| c.to_lowercase())
            .map(|c| c.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphemes() -> Result<()> {
        let phones = GraphemePhonemizer.phonemize("Hi yo", &["EN".to_string()])?;
        assert_eq!(phones, ["h", "i", "y", "o"]);
        assert!(GraphemePhonemizer.phonemize("Hi", &[]).is_err());
        Ok(())
    }
}
