// Standard MIDI File -> state matrix.
//
// Notes from every track and channel are merged. Each note becomes an
// interval of absolute ticks, which is quantised to sixteenth-note steps
// (rounded to the nearest step, at least one step long). Keys outside the
// 78-note window are ignored. A NoteOn on a key that is already sounding
// ends the previous note first.

use crate::layout::{ARTICULATE, FEATURE_COUNT, NOTE_SPAN, PLAY, feature_index, note_for_key};
use crate::{MidiError, StateMatrix};
use midly::{MidiMessage, Smf, Timing, TrackEventKind};
use std::path::{Path, PathBuf};

/// A sounding interval in absolute ticks.
struct NoteSpan {
    note: usize,
    start: u32,
    end: u32,
}

/// Read a MIDI file into a state matrix.
pub fn read_state_matrix(path: &Path) -> Result<StateMatrix, MidiError> {
    let bytes = std::fs::read(path)?;
    let smf = Smf::parse(&bytes)?;
    smf_to_state_matrix(&smf)
}

/// Quantise an in-memory SMF into a state matrix.
pub fn smf_to_state_matrix(smf: &Smf) -> Result<StateMatrix, MidiError> {
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u32,
        Timing::Timecode(..) => return Err(MidiError::UnsupportedTiming),
    };
    let ticks_per_step = (ticks_per_quarter / 4).max(1);

    let mut spans: Vec<NoteSpan> = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u32;
        let mut open: [Option<u32>; NOTE_SPAN] = [None; NOTE_SPAN];
        for event in track {
            tick += event.delta.as_int();
            let TrackEventKind::Midi { message, .. } = event.kind else {
                continue;
            };
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    if let Some(note) = note_for_key(key.as_int()) {
                        if let Some(start) = open[note].take() {
                            spans.push(NoteSpan { note, start, end: tick });
                        }
                        open[note] = Some(tick);
                    }
                }
                // NoteOn with velocity 0 is a release.
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    if let Some(note) = note_for_key(key.as_int()) {
                        if let Some(start) = open[note].take() {
                            spans.push(NoteSpan { note, start, end: tick });
                        }
                    }
                }
                _ => {}
            }
        }
        for (note, start) in open.iter().enumerate() {
            if let Some(start) = *start {
                spans.push(NoteSpan { note, start, end: tick });
            }
        }
    }

    let quantise = |t: u32| (t + ticks_per_step / 2) / ticks_per_step;
    let steps: Vec<(usize, usize, usize)> = spans
        .iter()
        .map(|s| {
            let start = quantise(s.start) as usize;
            let end = (quantise(s.end) as usize).max(start + 1);
            (s.note, start, end)
        })
        .collect();
    let total_steps = steps.iter().map(|&(_, _, end)| end).max().unwrap_or(0);

    let mut matrix = vec![vec![0.0f32; FEATURE_COUNT]; total_steps];
    for (note, start, end) in steps {
        for row in &mut matrix[start..end] {
            row[feature_index(note, PLAY)] = 1.0;
        }
        matrix[start][feature_index(note, ARTICULATE)] = 1.0;
    }
    Ok(matrix)
}

/// Load every `.mid` / `.midi` file in a directory, in path order.
/// Files that contain no in-window notes are skipped.
pub fn load_corpus(dir: &Path) -> Result<Vec<StateMatrix>, MidiError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut corpus = Vec::with_capacity(paths.len());
    for path in paths {
        let matrix = read_state_matrix(&path)?;
        if !matrix.is_empty() {
            corpus.push(matrix);
        }
    }
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RenderOptions, state_matrix_to_smf, write_state_matrix};

    fn empty(steps: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; FEATURE_COUNT]; steps]
    }

    fn hold(m: &mut [Vec<f32>], note: usize, from: usize, to: usize) {
        for row in &mut m[from..to] {
            row[feature_index(note, PLAY)] = 1.0;
        }
        m[from][feature_index(note, ARTICULATE)] = 1.0;
    }

    #[test]
    fn render_then_parse_preserves_notes() {
        let mut m = empty(8);
        hold(&mut m, 12, 0, 4);
        hold(&mut m, 30, 2, 8);
        let smf = state_matrix_to_smf(&m, &RenderOptions::default()).unwrap();
        let parsed = smf_to_state_matrix(&smf).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn rearticulated_note_keeps_both_strikes() {
        let mut m = empty(4);
        hold(&mut m, 5, 0, 2);
        hold(&mut m, 5, 2, 4);
        let smf = state_matrix_to_smf(&m, &RenderOptions::default()).unwrap();
        let parsed = smf_to_state_matrix(&smf).unwrap();
        assert_eq!(parsed[2][feature_index(5, ARTICULATE)], 1.0);
        assert_eq!(parsed[1][feature_index(5, ARTICULATE)], 0.0);
        assert_eq!(parsed[3][feature_index(5, PLAY)], 1.0);
    }

    #[test]
    fn empty_file_gives_empty_matrix() {
        let smf = state_matrix_to_smf(&empty(3), &RenderOptions::default()).unwrap();
        assert!(smf_to_state_matrix(&smf).unwrap().is_empty());
    }

    #[test]
    fn corpus_loads_midi_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = empty(6);
        hold(&mut m, 20, 1, 6);
        write_state_matrix(&m, &dir.path().join("b.mid"), &RenderOptions::default()).unwrap();
        write_state_matrix(&m, &dir.path().join("a.MIDI"), &RenderOptions::default()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not midi").unwrap();

        let corpus = load_corpus(dir.path()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[0], m);
    }
}
