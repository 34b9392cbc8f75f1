// Training data: variable-length feature sequences plus their true lengths.
//
// A sequence is a list of timesteps, each a row of `feature_count` values.
// `lengths[i]` is the number of leading rows of sequence `i` that are real;
// rows beyond it are ignored when batching. The training loop only ever
// reads a `TrainingSet`; it never parses source formats itself.
//
// JSON layout accepted by `from_json_file`:
//
//   { "sequences": [[[f32, ...], ...], ...], "lengths": [usize, ...] }
//
// `lengths` may be omitted, in which case every row counts. Deserializing
// goes through the same size check as `TrainingSet::new`.

use crate::error::{GanError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TrainingSetFile")]
pub struct TrainingSet {
    sequences: Vec<Vec<Vec<f32>>>,
    lengths: Vec<usize>,
}

#[derive(Deserialize)]
struct TrainingSetFile {
    sequences: Vec<Vec<Vec<f32>>>,
    #[serde(default)]
    lengths: Option<Vec<usize>>,
}

impl TryFrom<TrainingSetFile> for TrainingSet {
    type Error = GanError;

    fn try_from(file: TrainingSetFile) -> Result<Self> {
        match file.lengths {
            Some(lengths) => Self::new(file.sequences, lengths),
            None => Ok(Self::from_sequences(file.sequences)),
        }
    }
}

impl TrainingSet {
    /// Pair sequences with explicit true lengths. Fails when the two lists
    /// differ in size.
    pub fn new(sequences: Vec<Vec<Vec<f32>>>, lengths: Vec<usize>) -> Result<Self> {
        if sequences.len() != lengths.len() {
            return Err(GanError::LengthMetadataMismatch {
                sequences: sequences.len(),
                lengths: lengths.len(),
            });
        }
        Ok(TrainingSet { sequences, lengths })
    }

    /// Every row of every sequence is real.
    pub fn from_sequences(sequences: Vec<Vec<Vec<f32>>>) -> Self {
        let lengths = sequences.iter().map(Vec::len).collect();
        TrainingSet { sequences, lengths }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn sequences(&self) -> &[Vec<Vec<f32>>] {
        &self.sequences
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Longest true length in the set (0 when empty).
    pub fn max_length(&self) -> usize {
        self.lengths.iter().copied().max().unwrap_or(0)
    }

    /// Check every sequence against a model's feature width: each true
    /// length is in `1..=rows`, and each real row has `feature_count` values.
    pub fn validate(&self, feature_count: usize) -> Result<()> {
        for (index, (seq, &length)) in self.sequences.iter().zip(&self.lengths).enumerate() {
            if length == 0 || length > seq.len() {
                return Err(GanError::InvalidLength {
                    index,
                    length,
                    rows: seq.len(),
                });
            }
            if let Some(row) = seq[..length].iter().find(|r| r.len() != feature_count) {
                return Err(GanError::FeatureMismatch {
                    index,
                    found: row.len(),
                    expected: feature_count,
                });
            }
        }
        Ok(())
    }
}
