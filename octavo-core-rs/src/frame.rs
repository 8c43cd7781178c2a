//! Eight-byte bus frame codec.
//!
//! ```text
//! byte 0   type      'P' press, 'R' release, 'H' handshake
//! byte 1   octave    sender's octave
//! byte 2   semitone  0..=11 for P/R, unused for H
//! byte 3-7 zero
//! ```

use crate::error::OctavoError;
use crate::note::{EventKind, NoteId};

/// Payload length of every frame.
pub const FRAME_LEN: usize = 8;

/// Decoded bus frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub kind: EventKind,
    pub octave: u8,
    pub semitone: u8,
}

impl Frame {
    pub fn press(note: NoteId) -> Self {
        Self {
            kind: EventKind::Press,
            octave: note.octave,
            semitone: note.semitone,
        }
    }

    pub fn release(note: NoteId) -> Self {
        Self {
            kind: EventKind::Release,
            octave: note.octave,
            semitone: note.semitone,
        }
    }

    /// Key edge frame for `note`.
    pub fn key(note: NoteId, pressed: bool) -> Self {
        if pressed {
            Self::press(note)
        } else {
            Self::release(note)
        }
    }

    /// Announces that the sender's neighbour lines changed.
    pub fn handshake(octave: u8) -> Self {
        Self {
            kind: EventKind::Handshake,
            octave,
            semitone: 0,
        }
    }

    /// The key this frame refers to, or `None` for handshake frames.
    pub fn note(&self) -> Option<NoteId> {
        match self.kind {
            EventKind::Handshake => None,
            _ => Some(NoteId {
                octave: self.octave,
                semitone: self.semitone,
            }),
        }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = self.kind.as_byte();
        bytes[1] = self.octave;
        bytes[2] = self.semitone;
        bytes
    }

    /// Parse a raw payload. Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// * [`OctavoError::UnknownFrameType`] if byte 0 is not `P`, `R` or `H`.
    /// * [`OctavoError::InvalidSemitone`] if a key frame's semitone is > 11.
    pub fn decode(bytes: &[u8; FRAME_LEN]) -> Result<Self, OctavoError> {
        let kind = EventKind::from_byte(bytes[0])?;
        let frame = match kind {
            EventKind::Handshake => Self::handshake(bytes[1]),
            _ => {
                let note = NoteId::new(bytes[1], bytes[2])?;
                Self::key(note, kind == EventKind::Press)
            }
        };
        Ok(frame)
    }
}
