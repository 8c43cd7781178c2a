//! Direct digital synthesis engine.
//!
//! [`DdsEngine::render`] runs once per sample from the audio interrupt. It
//! touches nothing but atomics: the voice slots, the volume mirror and the
//! click state. It takes no lock and allocates nothing.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::allocator::VoiceSlots;
use crate::config::{CLICK_AMPLITUDE, MAX_VOICES, VOLUME_MAX, VOLUME_MIN};
use crate::metronome::ClickState;

/// DAC value for silence.
pub const MID_SCALE: u8 = 128;

/// Phase accumulators for each voice slot.
///
/// Only the audio interrupt calls [`render`](Self::render); the atomics are
/// there so the engine can live in a `static` next to the tasks.
pub struct DdsEngine {
    phases: [AtomicU32; MAX_VOICES],
}

impl DdsEngine {
    pub const fn new() -> Self {
        Self {
            phases: [const { AtomicU32::new(0) }; MAX_VOICES],
        }
    }

    /// Produce one 8-bit output sample.
    ///
    /// 1. Every slot with a non-zero step advances its phase; the top 8 bits,
    ///    re-centred to `-128..=127`, are that voice's sawtooth sample.
    /// 2. The sum is divided by [`MAX_VOICES`] so a full chord cannot clip.
    /// 3. Volume `v` (clamped to `0..=8`) shifts the mix right by `8 - v`.
    /// 4. While a click is pending, [`CLICK_AMPLITUDE`] is added.
    /// 5. The result is clamped and offset to `0..=255`.
    ///
    /// # Examples
    ///
    /// ```
    /// use octavo::{allocator::VoiceSlots, metronome::ClickState, DdsEngine};
    ///
    /// let engine = DdsEngine::new();
    /// let (voices, click) = (VoiceSlots::new(), ClickState::new());
    /// assert_eq!(engine.render(&voices, 8, &click), 128);
    /// ```
    pub fn render(&self, voices: &VoiceSlots, volume: u8, click: &ClickState) -> u8 {
        let mut mix: i32 = 0;
        for (slot, phase) in self.phases.iter().enumerate() {
            let step = voices.step(slot);
            if step == 0 {
                continue;
            }
            let next = phase.load(Ordering::Relaxed).wrapping_add(step);
            phase.store(next, Ordering::Relaxed);
            mix += (next >> 24) as i32 - 128;
        }
        mix /= MAX_VOICES as i32;

        let volume = (volume as i32).clamp(VOLUME_MIN, VOLUME_MAX);
        mix >>= VOLUME_MAX - volume;

        if click.take_sample() {
            mix += CLICK_AMPLITUDE;
        }

        (mix.clamp(-128, 127) + 128) as u8
    }

    /// Zero every phase accumulator.
    pub fn reset(&self) {
        for phase in &self.phases {
            phase.store(0, Ordering::Relaxed);
        }
    }

    pub fn phase(&self, slot: usize) -> u32 {
        self.phases
            .get(slot)
            .map(|p| p.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Default for DdsEngine {
    fn default() -> Self {
        Self::new()
    }
}
