// Error taxonomy for the seqgan library.
//
// Three families, all fatal to the operation that raised them:
// - numeric divergence: a loss became NaN or infinite;
// - precondition violations: malformed configuration or training data;
// - persistence failures: checkpoint / sample I/O, index parsing, restores
//   that don't match the model.
//
// Nothing in the crate catches and retries these; they propagate to the
// caller with `?`.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which of the two adversarial losses diverged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossKind {
    Generator,
    Discriminator,
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossKind::Generator => write!(f, "generator"),
            LossKind::Discriminator => write!(f, "discriminator"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GanError {
    #[error("non-finite {loss} loss: {value}")]
    NonFiniteLoss { loss: LossKind, value: f32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{sequences} sequences but {lengths} length entries")]
    LengthMetadataMismatch { sequences: usize, lengths: usize },

    #[error("sequence {index} has true length {length} but {rows} rows")]
    InvalidLength {
        index: usize,
        length: usize,
        rows: usize,
    },

    #[error("sequence {index} has {found} features per step, expected {expected}")]
    FeatureMismatch {
        index: usize,
        found: usize,
        expected: usize,
    },

    #[error("training set holds {available} sequences, fewer than one batch of {batch_size}")]
    DatasetTooSmall { available: usize, batch_size: usize },

    #[error("no checkpoint for model '{model}' under {dir}")]
    CheckpointNotFound { model: String, dir: PathBuf },

    #[error("checkpoint is missing parameter '{0}'")]
    MissingParameter(String),

    #[error("checkpoint parameter '{name}' has shape {found:?}, expected {expected:?}")]
    ParameterShape {
        name: String,
        found: Vec<usize>,
        expected: Vec<usize>,
    },

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Midi(#[from] seqgan_midi::MidiError),
}

pub type Result<T> = std::result::Result<T, GanError>;
