// State matrix -> Standard MIDI File.
//
// A pitch sounds while its "play" value exceeds the threshold. A new note
// begins when play turns on after silence or when "articulate" exceeds the
// threshold while the pitch is already sounding (a re-strike); the previous
// note is released at the same tick.
//
// Output is SMF format 1: track 0 carries the tempo, track 1 the notes.

use crate::MidiError;
use crate::layout::{ARTICULATE, FEATURE_COUNT, NOTE_SPAN, PLAY, feature_index, key_for_note};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Ticks per state matrix step (a sixteenth note).
pub const TICKS_PER_STEP: u32 = TICKS_PER_QUARTER as u32 / 4;

/// How generated values are turned into notes.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub tempo_bpm: u16,
    /// Values strictly above this count as "on".
    pub threshold: f32,
    pub velocity: u8,
    /// General MIDI program for the note track.
    pub program: u8,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            tempo_bpm: 120,
            threshold: 0.5,
            velocity: 80,
            program: 0,
        }
    }
}

/// Convert a state matrix to MIDI and write it to a file.
pub fn write_state_matrix(
    matrix: &[Vec<f32>],
    path: &Path,
    options: &RenderOptions,
) -> Result<(), MidiError> {
    let smf = state_matrix_to_smf(matrix, options)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Convert a state matrix to an in-memory SMF.
pub fn state_matrix_to_smf(
    matrix: &[Vec<f32>],
    options: &RenderOptions,
) -> Result<Smf<'static>, MidiError> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let tempo_microseconds = 60_000_000 / options.tempo_bpm.max(1) as u32;
    let tempo_track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(tempo_track);

    let channel = u4::new(0);
    let mut track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(b"seqgan")),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(options.program.min(127)),
                },
            },
        },
    ];

    // (absolute tick, message), pushed in tick order.
    let mut events: Vec<(u32, MidiMessage)> = Vec::new();
    let mut sounding = [false; NOTE_SPAN];
    let velocity = u7::new(options.velocity.min(127));

    for (step, row) in matrix.iter().enumerate() {
        if row.len() != FEATURE_COUNT {
            return Err(MidiError::RowWidth {
                row: step,
                found: row.len(),
                expected: FEATURE_COUNT,
            });
        }
        let tick = step as u32 * TICKS_PER_STEP;
        for (note, is_sounding) in sounding.iter_mut().enumerate() {
            let play = row[feature_index(note, PLAY)] > options.threshold;
            let articulate = row[feature_index(note, ARTICULATE)] > options.threshold;
            let key = u7::new(key_for_note(note));

            if *is_sounding && (!play || articulate) {
                events.push((tick, MidiMessage::NoteOff { key, vel: u7::new(0) }));
                *is_sounding = false;
            }
            if play && !*is_sounding {
                events.push((tick, MidiMessage::NoteOn { key, vel: velocity }));
                *is_sounding = true;
            }
        }
    }

    // Release anything still held at the end of the matrix.
    let end_tick = matrix.len() as u32 * TICKS_PER_STEP;
    for (note, is_sounding) in sounding.iter().enumerate() {
        if *is_sounding {
            let key = u7::new(key_for_note(note));
            events.push((end_tick, MidiMessage::NoteOff { key, vel: u7::new(0) }));
        }
    }

    let mut last_tick = 0u32;
    for (tick, message) in events {
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    Ok(smf)
}
