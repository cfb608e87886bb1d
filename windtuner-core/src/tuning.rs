//! # Musical Tuning Module
//!
//! Names the nearest equal-tempered note for a detected fundamental and
//! measures how far off it is.
//!
//! ## Features
//! - MIDI note names (C-1 to G9), built once at first use
//! - Configurable concert pitch (A4)
//! - Cent deviation calculations
//!
//! Notes are reported at concert pitch. Transposing instruments are a
//! presentation concern and are left to the caller.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

const A4_MIDI: i32 = 69;

/// Names for all 128 MIDI notes, using sharps ("C#4", "A4", ...).
static NOTE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    const PITCH_CLASSES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    (0..128)
        .map(|midi: i32| {
            // MIDI 60 is C4, so octave -1 starts at 0.
            let octave = midi / 12 - 1;
            format!("{}{}", PITCH_CLASSES[(midi % 12) as usize], octave)
        })
        .collect()
});

/// Nearest note to a measured frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteReading {
    /// Note name (e.g. "A4", "C#5").
    pub name: String,
    pub midi: u8,
    /// Equal-tempered frequency of the note in Hz.
    pub target_frequency: f32,
    /// Deviation of the measured frequency, positive when sharp.
    pub cents: f32,
}

/// Equal-tempered frequency of a MIDI note.
///
/// `f = a4_hz · 2^((midi - 69) / 12)`
pub fn midi_to_frequency(midi: u8, a4_hz: f32) -> f32 {
    a4_hz * 2.0_f32.powf((midi as i32 - A4_MIDI) as f32 / 12.0)
}

/// Name of a MIDI note.
pub fn note_name(midi: u8) -> &'static str {
    NOTE_NAMES[midi.min(127) as usize].as_str()
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents = 1 semitone, 1200 cents = 1 octave. Positive values are sharp.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Finds the closest note to `freq`.
///
/// # Returns
/// * `None` - `freq` is not a positive finite frequency, or falls outside the MIDI range
pub fn find_nearest_note(freq: f32, a4_hz: f32) -> Option<NoteReading> {
    if !freq.is_finite() || freq <= 0.0 || a4_hz <= 0.0 {
        return None;
    }
    let semitones = 12.0 * (freq / a4_hz).log2();
    let midi = A4_MIDI + semitones.round() as i32;
    if !(0..=127).contains(&midi) {
        return None;
    }
    let midi = midi as u8;
    let target_frequency = midi_to_frequency(midi, a4_hz);

    Some(NoteReading {
        name: note_name(midi).to_string(),
        midi,
        target_frequency,
        cents: calculate_cents_deviation(freq, target_frequency),
    })
}
