// Checkpoint store: per-model directory of safetensors weight files plus a
// JSON index.
//
// Layout under the store root:
//
//   <root>/<model_name>/
//     checkpoint.json                          index, write order + latest
//     G{g}_D{d}__{epoch}_{epochs}__{ts}.safetensors
//     E{e}__{epoch}_{epochs}__{ts}.safetensors
//     {model_name}_end_sess.safetensors
//
// `ts` is the local time with ':' replaced by '_' so the name is valid on
// every filesystem. The file stem is chosen from an explicit `CheckpointTag`,
// never by trial and error on the error value's shape.
//
// Loading always goes through the index's `latest` entry, i.e. the most
// recently written checkpoint, whatever its tag. Retention keeps at most
// `max_checkpoints` loss-tagged entries (0 keeps all); the end-of-session
// checkpoint is overwritten in place and never pruned. With a keep interval
// set, a tagged checkpoint written at least that long after the previous
// pinned one is pinned: it is left out of the count and never deleted, so a
// long run keeps one snapshot per interval.

use crate::error::{GanError, Result};
use candle_core::{Device, Tensor};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the per-model index.
pub const INDEX_FILE: &str = "checkpoint.json";

/// Extension of weight files.
pub const WEIGHTS_EXTENSION: &str = "safetensors";

/// What a checkpoint records about the moment it was taken.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointTag {
    /// Periodic report with both losses.
    PairedLoss {
        generator_loss: f32,
        discriminator_loss: f32,
        epoch: usize,
        epochs: usize,
    },
    /// Report carrying a single error value.
    SingleError {
        error: f32,
        epoch: usize,
        epochs: usize,
    },
    /// Written when a session ends.
    Final,
}

impl CheckpointTag {
    /// File stem (no extension) for this tag.
    pub fn stem(&self, model_name: &str, timestamp: &str) -> String {
        match self {
            CheckpointTag::PairedLoss {
                generator_loss,
                discriminator_loss,
                epoch,
                epochs,
            } => format!("G{generator_loss}_D{discriminator_loss}__{epoch}_{epochs}__{timestamp}"),
            CheckpointTag::SingleError {
                error,
                epoch,
                epochs,
            } => format!("E{error}__{epoch}_{epochs}__{timestamp}"),
            CheckpointTag::Final => format!("{model_name}_end_sess"),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, CheckpointTag::Final)
    }
}

/// Local wall-clock time, filesystem-safe.
pub fn timestamp() -> String {
    format_timestamp(&Local::now())
}

fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
        .replace(':', "_")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// File name relative to the model directory.
    pub file: String,
    pub tag: CheckpointTag,
    pub written_at: String,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub unix_time: i64,
    /// Exempt from retention.
    #[serde(default)]
    pub pinned: bool,
}

/// Contents of `checkpoint.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointIndex {
    /// Oldest first.
    pub entries: Vec<CheckpointEntry>,
    pub latest: Option<String>,
}

/// Reads and writes the checkpoints of one model.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    model_name: String,
    max_checkpoints: usize,
    keep_every: Option<chrono::Duration>,
}

impl CheckpointStore {
    pub fn new(root: &Path, model_name: &str, max_checkpoints: usize) -> Self {
        CheckpointStore {
            dir: root.join(model_name),
            model_name: model_name.to_string(),
            max_checkpoints,
            keep_every: None,
        }
    }

    /// Pin one tagged checkpoint per `minutes` of wall-clock time. 0 turns
    /// pinning off.
    pub fn with_keep_interval(mut self, minutes: u64) -> Self {
        self.keep_every = i64::try_from(minutes)
            .ok()
            .filter(|&m| m > 0)
            .and_then(chrono::Duration::try_minutes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// The index, or an empty one if none was written yet.
    pub fn index(&self) -> Result<CheckpointIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(CheckpointIndex::default());
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn write_index(&self, index: &CheckpointIndex) -> Result<()> {
        fs::write(self.index_path(), serde_json::to_string_pretty(index)?)?;
        Ok(())
    }

    /// Persist `tensors` under a name derived from `tag`. Returns the path of
    /// the weight file.
    pub fn save(&self, tag: CheckpointTag, tensors: &HashMap<String, Tensor>) -> Result<PathBuf> {
        self.save_at(tag, tensors, Local::now())
    }

    fn save_at(
        &self,
        tag: CheckpointTag,
        tensors: &HashMap<String, Tensor>,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let written_at = format_timestamp(&now);
        let unix_time = now.timestamp();
        let file = format!(
            "{}.{WEIGHTS_EXTENSION}",
            tag.stem(&self.model_name, &written_at)
        );
        let path = self.dir.join(&file);
        candle_core::safetensors::save(tensors, &path)?;

        let mut index = self.index()?;
        index.entries.retain(|e| e.file != file);
        let pinned = !tag.is_final() && self.due_for_pin(&index, unix_time);
        index.entries.push(CheckpointEntry {
            file: file.clone(),
            tag,
            written_at,
            unix_time,
            pinned,
        });
        index.latest = Some(file);
        self.prune(&mut index)?;
        self.write_index(&index)?;

        info!(path = %path.display(), "checkpoint written");
        Ok(path)
    }

    fn due_for_pin(&self, index: &CheckpointIndex, unix_time: i64) -> bool {
        let Some(every) = self.keep_every else {
            return false;
        };
        match index.entries.iter().filter(|e| e.pinned).map(|e| e.unix_time).max() {
            Some(last) => unix_time - last >= every.num_seconds(),
            None => true,
        }
    }

    /// Drop the oldest loss-tagged, unpinned entries beyond the retention
    /// limit.
    fn prune(&self, index: &mut CheckpointIndex) -> Result<()> {
        if self.max_checkpoints == 0 {
            return Ok(());
        }
        let prunable = |e: &CheckpointEntry| !e.tag.is_final() && !e.pinned;
        let tagged = index.entries.iter().filter(|&e| prunable(e)).count();
        let mut excess = tagged.saturating_sub(self.max_checkpoints);
        let mut kept = Vec::with_capacity(index.entries.len());
        for entry in index.entries.drain(..) {
            if excess > 0 && prunable(&entry) {
                excess -= 1;
                let path = self.dir.join(&entry.file);
                match fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path.display(), "pruned checkpoint"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            } else {
                kept.push(entry);
            }
        }
        index.entries = kept;
        Ok(())
    }

    /// Most recently written entry, if any.
    pub fn latest(&self) -> Result<Option<CheckpointEntry>> {
        let index = self.index()?;
        let Some(latest) = index.latest else {
            return Ok(None);
        };
        Ok(index.entries.into_iter().find(|e| e.file == latest))
    }

    /// Weights of the most recently written checkpoint.
    pub fn load_latest(&self) -> Result<HashMap<String, Tensor>> {
        let entry = self.latest()?.ok_or_else(|| GanError::CheckpointNotFound {
            model: self.model_name.clone(),
            dir: self.dir.clone(),
        })?;
        self.load(&entry)
    }

    pub fn load(&self, entry: &CheckpointEntry) -> Result<HashMap<String, Tensor>> {
        let path = self.dir.join(&entry.file);
        if !path.exists() {
            return Err(GanError::CheckpointNotFound {
                model: self.model_name.clone(),
                dir: self.dir.clone(),
            });
        }
        Ok(candle_core::safetensors::load(&path, &Device::Cpu)?)
    }
}
