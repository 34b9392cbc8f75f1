// Progress samples: generated sequences written to disk for inspection.
//
// Each report writes into its own directory
//
//   <progress_root>/<model_name>/<tag stem>/<i>.<ext>
//
// one file per generated sequence, through a `SequenceWriter`. Two writers
// ship with the crate: MIDI (piano-roll rendering via `seqgan_midi`, which
// needs rows of exactly `seqgan_midi::FEATURE_COUNT` values) and JSON (raw
// values, any width).

use crate::checkpoint::{CheckpointTag, timestamp};
use crate::error::Result;
use candle_core::Tensor;
use seqgan_midi::RenderOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Serialises one generated sequence (`steps` rows of feature values).
pub trait SequenceWriter {
    /// File extension, without the dot.
    fn extension(&self) -> &str;

    fn write(&self, sequence: &[Vec<f32>], path: &Path) -> Result<()>;
}

/// Renders sequences as Standard MIDI Files.
#[derive(Clone, Debug, Default)]
pub struct MidiSequenceWriter {
    pub options: RenderOptions,
}

impl SequenceWriter for MidiSequenceWriter {
    fn extension(&self) -> &str {
        "mid"
    }

    fn write(&self, sequence: &[Vec<f32>], path: &Path) -> Result<()> {
        seqgan_midi::write_state_matrix(sequence, path, &self.options)?;
        Ok(())
    }
}

/// Dumps raw values as a JSON array of rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSequenceWriter;

impl SequenceWriter for JsonSequenceWriter {
    fn extension(&self) -> &str {
        "json"
    }

    fn write(&self, sequence: &[Vec<f32>], path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string(sequence)?)?;
        Ok(())
    }
}

/// On-disk format of progress and generated samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    #[default]
    Midi,
    Json,
}

impl SampleFormat {
    pub fn writer(self) -> Box<dyn SequenceWriter> {
        match self {
            SampleFormat::Midi => Box::new(MidiSequenceWriter::default()),
            SampleFormat::Json => Box::new(JsonSequenceWriter),
        }
    }
}

/// Split a `(count, steps, features)` tensor into per-sequence row lists.
pub fn tensor_to_sequences(samples: &Tensor) -> Result<Vec<Vec<Vec<f32>>>> {
    Ok(samples.to_vec3::<f32>()?)
}

/// Write each sequence to `dir/<i>.<ext>`, creating `dir` first. Returns the
/// written paths in order.
pub fn write_sequences(
    dir: &Path,
    sequences: &[Vec<Vec<f32>>],
    writer: &dyn SequenceWriter,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(sequences.len());
    for (i, seq) in sequences.iter().enumerate() {
        let path = dir.join(format!("{i}.{}", writer.extension()));
        writer.write(seq, &path)?;
        paths.push(path);
    }
    Ok(paths)
}

/// Progress-sample directory of one model.
pub struct ProgressSampleStore {
    dir: PathBuf,
    model_name: String,
    writer: Box<dyn SequenceWriter>,
}

impl ProgressSampleStore {
    pub fn new(root: &Path, model_name: &str, writer: Box<dyn SequenceWriter>) -> Self {
        ProgressSampleStore {
            dir: root.join(model_name),
            model_name: model_name.to_string(),
            writer,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `samples` (`(count, steps, features)`) under a directory named
    /// after `tag`. Returns that directory.
    pub fn write(&self, tag: &CheckpointTag, samples: &Tensor) -> Result<PathBuf> {
        let dir = self.dir.join(tag.stem(&self.model_name, &timestamp()));
        let sequences = tensor_to_sequences(samples)?;
        write_sequences(&dir, &sequences, self.writer.as_ref())?;
        info!(dir = %dir.display(), count = sequences.len(), "progress sample written");
        Ok(dir)
    }
}
