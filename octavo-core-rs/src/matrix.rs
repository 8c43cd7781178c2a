//! Key-matrix collaborator interface and the decoded input word.
//!
//! The board multiplexes 7 rows × 4 columns of switches through a row
//! decoder. Reading the whole matrix yields a 28-bit word with bit
//! `row * 4 + col` holding the level seen on that column.

use crate::config::KEYS_PER_OCTAVE;

/// Rows scanned per cycle.
pub const MATRIX_ROWS: u8 = 7;

/// Columns per row.
pub const MATRIX_COLS: u8 = 4;

const VOLUME_A_BIT: u32 = 12;
const VOLUME_B_BIT: u32 = 13;
const SAMPLER_PRESS_BIT: u32 = 20;
const WEST_DETECT_BIT: u32 = 23;
const EAST_DETECT_BIT: u32 = 27;

/// Rows during which the handshake output must be driven so the
/// neighbour-detect inputs latch.
const HANDSHAKE_ROWS: [u8; 2] = [5, 6];

/// Hardware access to the switch matrix.
///
/// Implementations wait for the row lines to settle inside
/// [`select_row`](Self::select_row) (a few microseconds on the board).
pub trait KeyMatrix {
    /// Select one row through the row decoder.
    fn select_row(&mut self, row: u8);

    /// Column levels of the selected row, bit `c` = column `c`.
    fn read_columns(&mut self) -> u8;

    /// Drive the shared output line (handshake output on rows 5 and 6).
    fn drive_output(&mut self, on: bool);
}

/// One full read of the matrix.
///
/// Key switches and the sampler knob's push switch are active-low; the
/// neighbour-detect lines are active-high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MatrixInputs(pub u32);

impl MatrixInputs {
    /// Every switch open, every line high.
    pub const RELEASED: Self = Self((1 << (MATRIX_ROWS as u32 * MATRIX_COLS as u32)) - 1);

    pub fn bit(&self, index: u32) -> bool {
        self.0 & (1 << index) != 0
    }

    /// `true` if key `semitone` is held down.
    pub fn key_pressed(&self, semitone: u8) -> bool {
        (semitone as usize) < KEYS_PER_OCTAVE && !self.bit(semitone as u32)
    }

    /// Key edges relative to `previous`, in semitone order:
    /// `(semitone, true)` for a press, `(semitone, false)` for a release.
    pub fn key_edges(self, previous: MatrixInputs) -> impl Iterator<Item = (u8, bool)> {
        (0..KEYS_PER_OCTAVE as u8).filter_map(move |s| {
            match (previous.key_pressed(s), self.key_pressed(s)) {
                (false, true) => Some((s, true)),
                (true, false) => Some((s, false)),
                _ => None,
            }
        })
    }

    /// Volume knob quadrature state: bit 0 = A, bit 1 = B.
    pub fn volume_quadrature(&self) -> u8 {
        self.bit(VOLUME_A_BIT) as u8 | (self.bit(VOLUME_B_BIT) as u8) << 1
    }

    pub fn sampler_pressed(&self) -> bool {
        !self.bit(SAMPLER_PRESS_BIT)
    }

    /// Neighbour-detect lines as `(west, east)`.
    pub fn handshake(&self) -> (bool, bool) {
        (self.bit(WEST_DETECT_BIT), self.bit(EAST_DETECT_BIT))
    }
}

impl Default for MatrixInputs {
    fn default() -> Self {
        Self::RELEASED
    }
}

/// Scan every row and assemble the input word.
pub fn read_matrix<K: KeyMatrix>(matrix: &mut K) -> MatrixInputs {
    let mut word = 0u32;
    for row in 0..MATRIX_ROWS {
        matrix.drive_output(HANDSHAKE_ROWS.contains(&row));
        matrix.select_row(row);
        let columns = matrix.read_columns();
        for col in 0..MATRIX_COLS {
            if columns & (1 << col) != 0 {
                word |= 1 << (row as u32 * MATRIX_COLS as u32 + col as u32);
            }
        }
    }
    matrix.drive_output(false);
    MatrixInputs(word)
}

/// Read only the neighbour-detect lines, as `(west, east)`.
pub fn read_handshake<K: KeyMatrix>(matrix: &mut K) -> (bool, bool) {
    let mut lines = [false; 2];
    for (line, &row) in lines.iter_mut().zip(HANDSHAKE_ROWS.iter()) {
        matrix.drive_output(true);
        matrix.select_row(row);
        *line = matrix.read_columns() & (1 << (MATRIX_COLS - 1)) != 0;
    }
    matrix.drive_output(false);
    (lines[0], lines[1])
}

// ── Test double ──────────────────────────────────────────────────────────
