//! Module identity: which octave this board plays and what it is responsible for.

use core::sync::atomic::{AtomicU8, Ordering};

/// Octave a module takes when it has neighbours on both sides or none.
pub const REFERENCE_OCTAVE: u8 = 5;

/// Octave of the west-most module.
pub const LOWEST_OCTAVE: u8 = REFERENCE_OCTAVE - 1;

/// Octave of the east-most module.
pub const HIGHEST_OCTAVE: u8 = REFERENCE_OCTAVE + 1;

/// Number of modules the instrument can hold.
pub const MODULE_COUNT: usize = (HIGHEST_OCTAVE - LOWEST_OCTAVE + 1) as usize;

/// Responsibility of a module, derived from its octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// West-most module: synthesises audio, runs the sampler and metronome.
    Primary,
    /// Any other module: forwards its key edges over the bus.
    Peripheral,
}

impl Role {
    /// Role of the module playing `octave`.
    pub fn for_octave(octave: u8) -> Self {
        if octave == LOWEST_OCTAVE {
            Role::Primary
        } else {
            Role::Peripheral
        }
    }
}

/// Octave implied by the neighbour-detect lines.
///
/// `west` is high when a module is attached on the west side, `east` when
/// one is attached on the east side.
///
/// | west | east | octave |
/// |---|---|---|
/// | yes | no | 4 |
/// | no | yes | 6 |
/// | yes | yes | 5 |
/// | no | no | 5 |
pub fn resolve_octave(west: bool, east: bool) -> u8 {
    match (west, east) {
        (true, false) => LOWEST_OCTAVE,
        (false, true) => HIGHEST_OCTAVE,
        _ => REFERENCE_OCTAVE,
    }
}

/// Current octave of this module.
///
/// Written by the handshake and read by every task without locking.
pub struct ModuleIdentity {
    octave: AtomicU8,
}

impl ModuleIdentity {
    pub const fn new(octave: u8) -> Self {
        Self {
            octave: AtomicU8::new(octave),
        }
    }

    pub fn octave(&self) -> u8 {
        self.octave.load(Ordering::Relaxed)
    }

    pub fn role(&self) -> Role {
        Role::for_octave(self.octave())
    }

    /// Store a new octave. Returns `true` if it differs from the old one.
    pub fn assign(&self, octave: u8) -> bool {
        let previous = self.octave.swap(octave, Ordering::Relaxed);
        if previous != octave {
            #[cfg(feature = "defmt")]
            defmt::info!("Module octave {} -> {} ({})", previous, octave, Role::for_octave(octave));
            true
        } else {
            false
        }
    }
}

impl Default for ModuleIdentity {
    fn default() -> Self {
        Self::new(REFERENCE_OCTAVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_all_line_combinations() {
        assert_eq!(resolve_octave(true, false), 4);
        assert_eq!(resolve_octave(false, true), 6);
        assert_eq!(resolve_octave(true, true), 5);
        assert_eq!(resolve_octave(false, false), 5);
    }

    #[test]
    fn only_lowest_octave_is_primary() {
        assert_eq!(Role::for_octave(4), Role::Primary);
        assert_eq!(Role::for_octave(5), Role::Peripheral);
        assert_eq!(Role::for_octave(6), Role::Peripheral);
    }

    #[test]
    fn assign_reports_change() {
        let id = ModuleIdentity::default();
        assert_eq!(id.octave(), REFERENCE_OCTAVE);
        assert!(!id.assign(5));
        assert!(id.assign(4));
        assert_eq!(id.role(), Role::Primary);
    }

    #[test]
    fn module_count_covers_three_octaves() {
        assert_eq!(MODULE_COUNT, 3);
    }
}
