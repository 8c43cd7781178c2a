//! Key-state registry.
//!
//! The registry holds one 12-key [`KeySet`] for this module and one per
//! remote module. The local set and the remote sets sit behind separate
//! blocking mutexes; no operation holds both at once, and every critical
//! section is a handful of bit operations.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::config::KEYS_PER_OCTAVE;
use crate::error::OctavoError;
use crate::identity::{LOWEST_OCTAVE, MODULE_COUNT};
use crate::note::NoteId;

/// Most notes that can be held at once across every module.
pub const MAX_HELD: usize = KEYS_PER_OCTAVE * MODULE_COUNT;

// ── KeySet ───────────────────────────────────────────────────────────────

/// Pressed/released flags for the 12 keys of one octave (bit `i` = semitone `i`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeySet(u16);

impl KeySet {
    const MASK: u16 = (1 << KEYS_PER_OCTAVE) - 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & Self::MASK)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Set or clear one key. Semitones ≥ 12 are ignored.
    pub fn set(&mut self, semitone: u8, pressed: bool) {
        if semitone as usize >= KEYS_PER_OCTAVE {
            return;
        }
        if pressed {
            self.0 |= 1 << semitone;
        } else {
            self.0 &= !(1 << semitone);
        }
    }

    pub fn is_pressed(&self, semitone: u8) -> bool {
        (semitone as usize) < KEYS_PER_OCTAVE && self.0 & (1 << semitone) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Pressed semitones in ascending order.
    pub fn iter_pressed(&self) -> impl Iterator<Item = u8> + '_ {
        (0..KEYS_PER_OCTAVE as u8).filter(move |&s| self.is_pressed(s))
    }
}

// ── KeyRegistry ──────────────────────────────────────────────────────────

/// Which keys are currently held, on this module and on its neighbours.
pub struct KeyRegistry<M: RawMutex> {
    local: Mutex<M, Cell<KeySet>>,
    remote: Mutex<M, Cell<[KeySet; MODULE_COUNT]>>,
}

/// Slot of `octave` in the remote table.
fn remote_index(octave: u8) -> Result<usize, OctavoError> {
    octave
        .checked_sub(LOWEST_OCTAVE)
        .map(usize::from)
        .filter(|&i| i < MODULE_COUNT)
        .ok_or(OctavoError::UnknownOctave(octave))
}

impl<M: RawMutex> KeyRegistry<M> {
    pub const fn new() -> Self {
        Self {
            local: Mutex::new(Cell::new(KeySet::empty())),
            remote: Mutex::new(Cell::new([KeySet::empty(); MODULE_COUNT])),
        }
    }

    /// Set one key of this module.
    pub fn set_local(&self, semitone: u8, pressed: bool) {
        self.local.lock(|cell| {
            let mut set = cell.get();
            set.set(semitone, pressed);
            cell.set(set);
        });
    }

    /// Set one key of a remote module.
    ///
    /// # Errors
    ///
    /// [`OctavoError::UnknownOctave`] if `note.octave` is not a module octave.
    pub fn set_remote(&self, note: NoteId, pressed: bool) -> Result<(), OctavoError> {
        let index = remote_index(note.octave)?;
        self.remote.lock(|cell| {
            let mut sets = cell.get();
            sets[index].set(note.semitone, pressed);
            cell.set(sets);
        });
        Ok(())
    }

    /// Set a key in whichever set owns `note`.
    pub fn apply(&self, local_octave: u8, note: NoteId, pressed: bool) -> Result<(), OctavoError> {
        if note.octave == local_octave {
            self.set_local(note.semitone, pressed);
            Ok(())
        } else {
            self.set_remote(note, pressed)
        }
    }

    pub fn is_pressed(&self, local_octave: u8, note: NoteId) -> bool {
        if note.octave == local_octave {
            self.local().is_pressed(note.semitone)
        } else {
            self.remote(note.octave)
                .map(|set| set.is_pressed(note.semitone))
                .unwrap_or(false)
        }
    }

    /// Copy of this module's key set.
    pub fn local(&self) -> KeySet {
        self.local.lock(Cell::get)
    }

    /// Copy of one remote module's key set.
    pub fn remote(&self, octave: u8) -> Result<KeySet, OctavoError> {
        let index = remote_index(octave)?;
        Ok(self.remote.lock(|cell| cell.get()[index]))
    }

    /// Copy of every remote set, indexed by `octave - LOWEST_OCTAVE`.
    pub fn remotes(&self) -> [KeySet; MODULE_COUNT] {
        self.remote.lock(Cell::get)
    }

    /// Every held note: local keys first, then remote octaves ascending.
    /// The remote slot for `local_octave` is skipped.
    pub fn held_notes(&self, local_octave: u8) -> Vec<NoteId, MAX_HELD> {
        let mut held = Vec::new();
        for semitone in self.local().iter_pressed() {
            let _ = held.push(NoteId {
                octave: local_octave,
                semitone,
            });
        }
        for (i, set) in self.remotes().iter().enumerate() {
            let octave = LOWEST_OCTAVE + i as u8;
            if octave == local_octave {
                continue;
            }
            for semitone in set.iter_pressed() {
                let _ = held.push(NoteId { octave, semitone });
            }
        }
        held
    }

    /// Release every key on every module.
    pub fn clear_all(&self) {
        self.local.lock(|cell| cell.set(KeySet::empty()));
        self.remote
            .lock(|cell| cell.set([KeySet::empty(); MODULE_COUNT]));
    }
}

impl<M: RawMutex> Default for KeyRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Registry = KeyRegistry<CriticalSectionRawMutex>;

    fn note(octave: u8, semitone: u8) -> NoteId {
        NoteId::new(octave, semitone).unwrap()
    }

    // ── KeySet ───────────────────────────────────────────────────────

    #[test]
    fn key_set_set_and_clear() {
        let mut set = KeySet::empty();
        set.set(3, true);
        set.set(11, true);
        assert!(set.is_pressed(3));
        assert_eq!(set.count(), 2);
        set.set(3, false);
        assert!(!set.is_pressed(3));
        assert_eq!(set.bits(), 1 << 11);
    }

    #[test]
    fn key_set_ignores_out_of_range() {
        let mut set = KeySet::empty();
        set.set(12, true);
        assert!(set.is_empty());
        assert!(!set.is_pressed(15));
        assert_eq!(KeySet::from_bits(0xFFFF).count(), 12);
    }

    #[test]
    fn key_set_iterates_ascending() {
        let set = KeySet::from_bits(0b1000_0010_0001);
        let pressed: std::vec::Vec<u8> = set.iter_pressed().collect();
        assert_eq!(pressed, [0, 5, 11]);
    }

    // ── KeyRegistry ──────────────────────────────────────────────────

    #[test]
    fn apply_routes_local_and_remote() {
        let reg = Registry::new();
        reg.apply(4, note(4, 2), true).unwrap();
        reg.apply(4, note(6, 7), true).unwrap();
        assert!(reg.local().is_pressed(2));
        assert!(reg.remote(6).unwrap().is_pressed(7));
        assert!(reg.is_pressed(4, note(6, 7)));
        assert!(!reg.is_pressed(4, note(5, 7)));
    }

    #[test]
    fn set_remote_rejects_unknown_octave() {
        let reg = Registry::new();
        assert_eq!(
            reg.set_remote(note(7, 0), true),
            Err(OctavoError::UnknownOctave(7))
        );
        assert_eq!(
            reg.set_remote(note(3, 0), true),
            Err(OctavoError::UnknownOctave(3))
        );
        assert!(reg.remote(9).is_err());
    }

    #[test]
    fn release_clears_the_key() {
        let reg = Registry::new();
        reg.apply(5, note(5, 0), true).unwrap();
        reg.apply(5, note(5, 0), false).unwrap();
        assert!(reg.local().is_empty());
    }

    #[test]
    fn held_notes_order_and_skip_local_slot() {
        let reg = Registry::new();
        reg.set_local(9, true);
        reg.set_local(1, true);
        reg.set_remote(note(6, 0), true).unwrap();
        reg.set_remote(note(4, 11), true).unwrap();
        // A stray remote entry for the local octave is not reported.
        reg.set_remote(note(5, 3), true).unwrap();
        let held = reg.held_notes(5);
        assert_eq!(
            held.as_slice(),
            &[note(5, 1), note(5, 9), note(4, 11), note(6, 0)]
        );
    }

    #[test]
    fn clear_all_releases_everything() {
        let reg = Registry::new();
        reg.set_local(0, true);
        reg.set_remote(note(6, 4), true).unwrap();
        reg.clear_all();
        assert!(reg.held_notes(4).is_empty());
    }
}
