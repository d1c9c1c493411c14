use std::path::Path;

use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::protos::{Sentence, TextData};
use crate::stream::read_pb_stream;
use crate::{Error, Result};

/// Draws sentences from a packed corpus, picking each group with probability proportional to
/// its sentence count.
#[derive(Debug)]
pub struct GroupSampler {
    groups: Vec<TextData>,
    weights: WeightedIndex<usize>,
}

impl GroupSampler {
    pub fn new(groups: Vec<TextData>) -> Result<Self> {
        let counts = groups.iter().map(|g| g.sentences.len());
        let weights = WeightedIndex::new(counts).map_err(|_| Error::EmptyDataset)?;
        Ok(Self { groups, weights })
    }

    /// Loads and concatenates several packed files.
    pub fn from_files<P: AsRef<Path>>(files: &[P]) -> Result<Self> {
        let mut groups = vec![];
        for file in files {
            let reader = std::io::BufReader::new(std::fs::File::open(file)?);
            groups.extend(read_pb_stream(reader)?);
        }
        tracing::info!(
            groups = groups.len(),
            sentences = groups.iter().map(|g| g.sentences.len()).sum::<usize>(),
            "loaded packed corpus"
        );
        Self::new(groups)
    }

    pub fn groups(&self) -> &[TextData] {
        &self.groups
    }

    /// A group and up to `n` distinct sentences from it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> (&TextData, Vec<&Sentence>) {
        let group = &self.groups[self.weights.sample(rng)];
        let sentences = group.sentences.choose_multiple(rng, n).collect();
        (group, sentences)
    }
}
