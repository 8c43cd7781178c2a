//! Phase-increment table for the DDS oscillators.
//!
//! A step size is `2^32 · f / SAMPLE_RATE_HZ`: the amount a 32-bit phase
//! accumulator advances per sample to complete `f` cycles per second. The
//! table is anchored at A4 = 440 Hz in equal temperament and each octave
//! doubles the step of the one below.

use crate::config::KEYS_PER_OCTAVE;

/// Octave whose step sizes are stored literally; the rest are derived.
pub const BASE_OCTAVE: u8 = 4;

/// Number of octaves in [`STEP_SIZES`] (octaves `0..OCTAVE_COUNT`).
pub const OCTAVE_COUNT: usize = 9;

/// Step sizes for octave 4 (C4 … B4) at 22 kHz.
const BASE_STEPS: [u32; KEYS_PER_OCTAVE] = [
    51_075_946, 54_113_659, 57_330_980, 60_739_622, 64_351_299, 68_178_701,
    72_232_564, 76_527_532, 81_078_245, 85_899_345, 91_007_428, 96_419_087,
];

/// Step size for every `(octave, semitone)` in `0..OCTAVE_COUNT × 0..12`.
pub const STEP_SIZES: [[u32; KEYS_PER_OCTAVE]; OCTAVE_COUNT] = build_table();

const fn build_table() -> [[u32; KEYS_PER_OCTAVE]; OCTAVE_COUNT] {
    let mut table = [[0u32; KEYS_PER_OCTAVE]; OCTAVE_COUNT];
    let mut octave = 0;
    while octave < OCTAVE_COUNT {
        let mut semitone = 0;
        while semitone < KEYS_PER_OCTAVE {
            let base = BASE_STEPS[semitone];
            table[octave][semitone] = if octave >= BASE_OCTAVE as usize {
                base << (octave - BASE_OCTAVE as usize)
            } else {
                base >> (BASE_OCTAVE as usize - octave)
            };
            semitone += 1;
        }
        octave += 1;
    }
    table
}

/// Step size for one key.
///
/// Octaves beyond the table clamp to the nearest stored octave, and the
/// semitone is taken modulo 12, so every input yields a non-zero step.
///
/// # Examples
///
/// ```
/// use octavo::voice_bank::step_size;
///
/// assert_eq!(step_size(4, 9), 85_899_345); // A4
/// assert_eq!(step_size(5, 9), 2 * 85_899_345); // A5
/// ```
pub fn step_size(octave: u8, semitone: u8) -> u32 {
    let row = (octave as usize).min(OCTAVE_COUNT - 1);
    STEP_SIZES[row][semitone as usize % KEYS_PER_OCTAVE]
}
