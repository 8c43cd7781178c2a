//! Error types for the keyboard core.

use core::fmt;

/// Errors produced while validating notes, frames and registry addresses.
///
/// Buffer overflow, transmit backpressure and missed deadlines are not
/// errors: they degrade to dropped events, latency or an audible glitch and
/// are reported as plain outcome values where they are reported at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OctavoError {
    /// Semitone index is out of bounds (must be < 12).
    InvalidSemitone(u8),
    /// Octave is not one of the modules this instrument knows about.
    UnknownOctave(u8),
    /// Frame type byte is not `'P'`, `'R'` or `'H'`.
    UnknownFrameType(u8),
}

impl fmt::Display for OctavoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OctavoError::InvalidSemitone(s) => write!(f, "Invalid semitone index {} (must be 0-11)", s),
            OctavoError::UnknownOctave(o) => write!(f, "Unknown module octave {}", o),
            OctavoError::UnknownFrameType(b) => write!(f, "Unknown frame type byte 0x{:02X}", b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn display_messages() {
        assert_eq!(
            OctavoError::InvalidSemitone(12).to_string(),
            "Invalid semitone index 12 (must be 0-11)"
        );
        assert_eq!(OctavoError::UnknownOctave(9).to_string(), "Unknown module octave 9");
        assert_eq!(
            OctavoError::UnknownFrameType(b'X').to_string(),
            "Unknown frame type byte 0x58"
        );
    }
}
