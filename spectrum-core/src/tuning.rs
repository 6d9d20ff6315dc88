//! # Musical Tuning Module
//!
//! Nearest-note search over a single reference octave that is folded up or
//! down until it brackets the measured frequency.
//!
//! ## Features
//! - Natural (white-key) octave A4..A5 in equal temperament, A4 = 440 Hz
//! - Octave folding as a pure function, plus a detector that keeps the folded table
//! - Five-band sharp/flat indicator centred on the nearest note
//! - Cent deviation for display
//!
//! ## Stateful folding
//! [`NoteDetector`] keeps whatever octave the last measurement needed. A call
//! for 220 Hz leaves the table at A3..A4 for the next call. Callers that need
//! every call to start from the reference octave can use [`fold_octave`] on
//! [`NoteTable::reference`] instead.

use once_cell::sync::Lazy;

/// Entries in the reference octave, both A's included.
pub const OCTAVE_LEN: usize = 8;

/// Number of positions on the sharp/flat indicator.
pub const BAND_COUNT: usize = 5;

/// Indicator position meaning "in tune".
pub const CENTER_BAND: usize = 2;

const A4_FREQUENCY: f64 = 440.0;
const LETTERS: [&str; OCTAVE_LEN] = ["A", "B", "C", "D", "E", "F", "G", "A"];
const BASE_OCTAVES: [i32; OCTAVE_LEN] = [4, 4, 5, 5, 5, 5, 5, 5];
const SEMITONES_FROM_A4: [i32; OCTAVE_LEN] = [0, 2, 3, 5, 7, 8, 10, 12];

/// Equal-tempered frequencies of A4 B4 C5 D5 E5 F5 G5 A5.
static REFERENCE_OCTAVE: Lazy<[f64; OCTAVE_LEN]> = Lazy::new(|| {
    SEMITONES_FROM_A4.map(|n| A4_FREQUENCY * 2.0_f64.powf(n as f64 / 12.0))
});

/// Represents a single musical note with its name and frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Table position, 0..OCTAVE_LEN
    pub index: usize,
    /// Note name with octave (e.g., "A4", "G3")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f64,
}

/// One octave of reference frequencies plus how far it was folded.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTable {
    frequencies: [f64; OCTAVE_LEN],
    octave_shift: i32,
}

impl Default for NoteTable {
    fn default() -> Self {
        Self::reference()
    }
}

impl NoteTable {
    /// The unfolded A4..A5 table.
    pub fn reference() -> Self {
        Self {
            frequencies: *REFERENCE_OCTAVE,
            octave_shift: 0,
        }
    }

    pub fn frequencies(&self) -> &[f64; OCTAVE_LEN] {
        &self.frequencies
    }

    /// Octaves above (positive) or below (negative) the reference octave.
    pub fn octave_shift(&self) -> i32 {
        self.octave_shift
    }

    pub fn min(&self) -> f64 {
        self.frequencies[0]
    }

    pub fn max(&self) -> f64 {
        self.frequencies[OCTAVE_LEN - 1]
    }

    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.min() && frequency <= self.max()
    }

    fn doubled(&self) -> Self {
        Self {
            frequencies: self.frequencies.map(|f| f * 2.0),
            octave_shift: self.octave_shift + 1,
        }
    }

    fn halved(&self) -> Self {
        Self {
            frequencies: self.frequencies.map(|f| f / 2.0),
            octave_shift: self.octave_shift - 1,
        }
    }

    /// Name of entry `index` in the current octave.
    pub fn note_name(&self, index: usize) -> String {
        format!("{}{}", LETTERS[index], BASE_OCTAVES[index] + self.octave_shift)
    }

    pub fn note(&self, index: usize) -> Note {
        Note {
            index,
            name: self.note_name(index),
            frequency: self.frequencies[index],
        }
    }

    /// Finds the closest entry to a given frequency. Ties go to the lower entry.
    pub fn nearest(&self, frequency: f64) -> Note {
        let index = (1..OCTAVE_LEN).fold(0, |best, i| {
            if (self.frequencies[i] - frequency).abs() < (self.frequencies[best] - frequency).abs() {
                i
            } else {
                best
            }
        });
        self.note(index)
    }

    /// The five indicator bands around entry `index`.
    ///
    /// The outer bands are midpoints towards the neighbouring entries,
    /// wrapping to half the last entry below the first and to twice the
    /// first entry above the last. The inner bands split those halves again.
    pub fn bands(&self, index: usize) -> [f64; BAND_COUNT] {
        let note = self.frequencies[index];
        let previous = if index == 0 {
            self.frequencies[OCTAVE_LEN - 1] / 2.0
        } else {
            self.frequencies[index - 1]
        };
        let next = if index == OCTAVE_LEN - 1 {
            self.frequencies[0] * 2.0
        } else {
            self.frequencies[index + 1]
        };

        let low = (note + previous) / 2.0;
        let high = (note + next) / 2.0;
        [low, (low + note) / 2.0, note, (high + note) / 2.0, high]
    }
}

/// Doubles or halves `table` until it brackets `target`.
///
/// Returns `None` for targets that can never be bracketed (zero, negative,
/// NaN or infinite).
pub fn fold_octave(table: &NoteTable, target: f64) -> Option<NoteTable> {
    if !target.is_finite() || target <= 0.0 {
        return None;
    }
    let mut folded = table.clone();
    while !folded.contains(target) {
        while target > folded.max() {
            folded = folded.doubled();
        }
        while target < folded.min() {
            folded = folded.halved();
        }
    }
    Some(folded)
}

/// Index into the five bands whose value is closest to `frequency`.
///
/// On equal distances the band nearer the centre wins.
pub fn band_index(bands: &[f64; BAND_COUNT], frequency: f64) -> usize {
    const CENTER_OUT: [usize; BAND_COUNT] = [2, 1, 3, 0, 4];
    CENTER_OUT
        .into_iter()
        .fold(CENTER_BAND, |best, i| {
            if (bands[i] - frequency).abs() < (bands[best] - frequency).abs() {
                i
            } else {
                best
            }
        })
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat; 100 cents is a semitone.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// Result of tuning against one measured peak.
#[derive(Debug, Clone, PartialEq)]
pub struct TuneReading {
    pub peak_frequency: f64,
    pub note: Note,
    pub bands: [f64; BAND_COUNT],
    /// 0 = very flat, 2 = in tune, 4 = very sharp.
    pub band_index: usize,
    pub cents: f64,
}

impl TuneReading {
    pub fn is_in_tune(&self) -> bool {
        self.band_index == CENTER_BAND
    }
}

/// Owns the note table and folds it in place as measurements arrive.
#[derive(Debug, Clone, Default)]
pub struct NoteDetector {
    table: NoteTable,
}

impl NoteDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &NoteTable {
        &self.table
    }

    /// Restores the reference octave.
    pub fn reset(&mut self) {
        self.table = NoteTable::reference();
    }

    /// Folds the owned table around `target` and returns the nearest note.
    ///
    /// Returns `None` below `low_cutoff`, leaving the table untouched. The
    /// fold persists for later calls.
    pub fn find_closest_note(&mut self, target: f64, low_cutoff: f64) -> Option<Note> {
        if target < low_cutoff {
            return None;
        }
        self.table = fold_octave(&self.table, target)?;
        Some(self.table.nearest(target))
    }

    /// Maps a spectral peak onto the nearest note and the five-band indicator.
    pub fn tune(&mut self, peak_frequency: f64, low_cutoff: f64) -> Option<TuneReading> {
        let note = self.find_closest_note(peak_frequency, low_cutoff)?;
        let bands = self.table.bands(note.index);
        Some(TuneReading {
            peak_frequency,
            band_index: band_index(&bands, peak_frequency),
            cents: calculate_cents_deviation(peak_frequency, note.frequency),
            note,
            bands,
        })
    }
}
