//! Voice allocation: maps held keys onto the fixed set of DDS voices.
//!
//! [`VoiceSlots`] is the hand-off point between the control tasks and the
//! audio interrupt. Each slot is a single relaxed atomic step size, so a
//! reader may see a mix of old and new slots for one sample. That is
//! inaudible and needs no lock.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::config::{KEYS_PER_OCTAVE, MAX_VOICES};
use crate::identity::{LOWEST_OCTAVE, MODULE_COUNT};
use crate::keys::{KeyRegistry, KeySet};
use crate::note::NoteId;
use crate::voice_bank::step_size;

// ── VoiceSlots ───────────────────────────────────────────────────────────

/// Step size per voice; 0 = silent.
pub struct VoiceSlots {
    steps: [AtomicU32; MAX_VOICES],
}

impl VoiceSlots {
    pub const fn new() -> Self {
        Self {
            steps: [const { AtomicU32::new(0) }; MAX_VOICES],
        }
    }

    /// Write one slot. Out-of-range indices are ignored.
    pub fn set(&self, slot: usize, step: u32) {
        if let Some(s) = self.steps.get(slot) {
            s.store(step, Ordering::Relaxed);
        }
    }

    pub fn step(&self, slot: usize) -> u32 {
        self.steps
            .get(slot)
            .map(|s| s.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Publish the step sizes for `notes` in order; remaining slots go silent.
    pub fn publish(&self, notes: &[NoteId]) {
        for (i, slot) in self.steps.iter().enumerate() {
            let step = notes
                .get(i)
                .map(|n| step_size(n.octave, n.semitone))
                .unwrap_or(0);
            slot.store(step, Ordering::Relaxed);
        }
    }

    pub fn silence(&self) {
        for slot in &self.steps {
            slot.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> [u32; MAX_VOICES] {
        core::array::from_fn(|i| self.steps[i].load(Ordering::Relaxed))
    }

    pub fn active_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.load(Ordering::Relaxed) != 0)
            .count()
    }
}

impl Default for VoiceSlots {
    fn default() -> Self {
        Self::new()
    }
}

// ── Selection ────────────────────────────────────────────────────────────

/// Pick up to [`MAX_VOICES`] notes from the held keys.
///
/// Local keys come first in semitone order, then each remote octave in
/// ascending order. `remotes[i]` is the set for octave `LOWEST_OCTAVE + i`;
/// the entry for `local_octave` is skipped. Keys beyond the cap are dropped.
///
/// # Examples
///
/// ```
/// use octavo::{select_voices, KeySet};
///
/// let local = KeySet::from_bits(0b101); // C, D
/// let remotes = [KeySet::empty(), KeySet::empty(), KeySet::from_bits(1)];
/// let voices = select_voices(4, local, &remotes);
/// assert_eq!(voices.len(), 3);
/// assert_eq!((voices[2].octave, voices[2].semitone), (6, 0));
/// ```
pub fn select_voices(
    local_octave: u8,
    local: KeySet,
    remotes: &[KeySet; MODULE_COUNT],
) -> Vec<NoteId, MAX_VOICES> {
    let mut voices = Vec::new();
    let remote_sets = remotes
        .iter()
        .enumerate()
        .map(|(i, set)| (LOWEST_OCTAVE + i as u8, *set))
        .filter(|&(octave, _)| octave != local_octave);

    for (octave, set) in core::iter::once((local_octave, local)).chain(remote_sets) {
        for semitone in 0..KEYS_PER_OCTAVE as u8 {
            if !set.is_pressed(semitone) {
                continue;
            }
            if voices.push(NoteId { octave, semitone }).is_err() {
                return voices;
            }
        }
    }
    voices
}

/// Recompute every voice slot from the registry.
///
/// The local and remote sets are each read under their own lock, one after
/// the other, then published. Returns the number of sounding voices.
pub fn recompute_voices<M: RawMutex>(
    keys: &KeyRegistry<M>,
    local_octave: u8,
    slots: &VoiceSlots,
) -> usize {
    let local = keys.local();
    let remotes = keys.remotes();
    let voices = select_voices(local_octave, local, &remotes);
    slots.publish(&voices);
    voices.len()
}
