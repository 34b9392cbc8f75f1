// seqgan MIDI collaborator.
//
// Converts between Standard MIDI Files and the piano-roll "state matrix"
// the sequence GAN trains on and emits. A state matrix is a list of
// timesteps (one per sixteenth note); each timestep holds, for every pitch
// in the 78-key window starting at MIDI key 24, a `[play, articulate]` pair,
// giving 156 features per step.
//
// Module overview:
// - `layout.rs`: pitch window, feature indexing.
// - `render.rs`: state matrix -> SMF (format 1, tempo track + one note track).
// - `parse.rs`:  SMF -> state matrix (metrical timing only), corpus loading.
//
// Uses the `midly` crate for reading and writing.

pub mod layout;
pub mod parse;
pub mod render;

pub use layout::{FEATURE_COUNT, NOTE_SPAN};
pub use parse::{load_corpus, read_state_matrix, smf_to_state_matrix};
pub use render::{RenderOptions, state_matrix_to_smf, write_state_matrix};

use thiserror::Error;

/// A piano roll: `steps x FEATURE_COUNT` values.
pub type StateMatrix = Vec<Vec<f32>>;

/// Errors raised while reading or writing MIDI data.
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed MIDI file: {0}")]
    Parse(#[from] midly::Error),
    #[error("timecode-based MIDI timing is not supported")]
    UnsupportedTiming,
    #[error("state matrix row {row} has {found} features, expected {expected}")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },
}
