// State matrix layout: which feature column belongs to which pitch.
//
// Columns are grouped per pitch: column `2 * note` is "play" (the key is
// held during this step) and `2 * note + 1` is "articulate" (the key is
// struck at the start of this step).

/// Lowest MIDI key represented in the matrix.
pub const LOWER_BOUND: u8 = 24;

/// One past the highest MIDI key represented in the matrix.
pub const UPPER_BOUND: u8 = 102;

/// Number of pitches in the window.
pub const NOTE_SPAN: usize = (UPPER_BOUND - LOWER_BOUND) as usize;

pub const FEATURES_PER_NOTE: usize = 2;

/// Width of one state matrix row.
pub const FEATURE_COUNT: usize = NOTE_SPAN * FEATURES_PER_NOTE;

/// Slot of the "held" flag within a pitch's pair.
pub const PLAY: usize = 0;

/// Slot of the "struck" flag within a pitch's pair.
pub const ARTICULATE: usize = 1;

pub fn feature_index(note: usize, slot: usize) -> usize {
    note * FEATURES_PER_NOTE + slot
}

/// MIDI key for a note index in `0..NOTE_SPAN`.
pub fn key_for_note(note: usize) -> u8 {
    LOWER_BOUND + note as u8
}

/// Note index for a MIDI key, or `None` outside the window.
pub fn note_for_key(key: u8) -> Option<usize> {
    if (LOWER_BOUND..UPPER_BOUND).contains(&key) {
        Some((key - LOWER_BOUND) as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_156_features() {
        assert_eq!(NOTE_SPAN, 78);
        assert_eq!(FEATURE_COUNT, 156);
    }

    #[test]
    fn key_mapping_round_trips() {
        for note in 0..NOTE_SPAN {
            assert_eq!(note_for_key(key_for_note(note)), Some(note));
        }
        assert_eq!(note_for_key(LOWER_BOUND - 1), None);
        assert_eq!(note_for_key(UPPER_BOUND), None);
    }
}
