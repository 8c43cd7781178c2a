//! Note identifiers and event kinds.

use core::fmt::Write;

use heapless::String;

use crate::config::KEYS_PER_OCTAVE;
use crate::error::OctavoError;

/// Semitone names within one octave, indexed by semitone (0 = C).
pub const SEMITONE_NAMES: [&str; KEYS_PER_OCTAVE] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One key on one module: `(octave, semitone)`.
///
/// The octave doubles as the module identifier, since every module owns
/// exactly one octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoteId {
    /// Octave of the module the key belongs to.
    pub octave: u8,
    /// Semitone within the octave, always `< 12`.
    pub semitone: u8,
}

impl NoteId {
    /// Create a note, rejecting semitone indices outside `0..12`.
    ///
    /// # Examples
    ///
    /// ```
    /// use octavo::note::NoteId;
    ///
    /// let a4 = NoteId::new(4, 9).unwrap();
    /// assert_eq!(a4.semitone, 9);
    /// assert!(NoteId::new(4, 12).is_err());
    /// ```
    pub fn new(octave: u8, semitone: u8) -> Result<Self, OctavoError> {
        if semitone as usize >= KEYS_PER_OCTAVE {
            return Err(OctavoError::InvalidSemitone(semitone));
        }
        Ok(Self { octave, semitone })
    }
}

/// Human-readable note name, e.g. `"C#5"`.
pub fn note_name(note: NoteId) -> String<4> {
    let mut name: String<4> = String::new();
    // Octaves above 99 do not fit and are cut short.
    let _ = write!(name, "{}{}", SEMITONE_NAMES[note.semitone as usize % KEYS_PER_OCTAVE], note.octave);
    name
}

/// What happened to a key, as carried by bus frames and recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// Key went down (`'P'` on the wire).
    Press,
    /// Key came up (`'R'` on the wire).
    Release,
    /// A module's neighbour-detect lines changed (`'H'` on the wire).
    Handshake,
}

impl EventKind {
    /// Wire byte for this kind.
    pub fn as_byte(self) -> u8 {
        match self {
            EventKind::Press => b'P',
            EventKind::Release => b'R',
            EventKind::Handshake => b'H',
        }
    }

    /// Parse a wire byte.
    pub fn from_byte(byte: u8) -> Result<Self, OctavoError> {
        match byte {
            b'P' => Ok(EventKind::Press),
            b'R' => Ok(EventKind::Release),
            b'H' => Ok(EventKind::Handshake),
            other => Err(OctavoError::UnknownFrameType(other)),
        }
    }

    /// The key kind for a pressed/released edge.
    pub fn for_key(pressed: bool) -> Self {
        if pressed {
            EventKind::Press
        } else {
            EventKind::Release
        }
    }
}
