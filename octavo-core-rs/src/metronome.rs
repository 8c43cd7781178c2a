//! Metronome click and beat counting.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Pending click shared between the metronome task and the audio interrupt.
///
/// The task arms the click; the interrupt counts it down one sample at a
/// time. A click re-armed while one is still sounding simply restarts.
pub struct ClickState {
    active: AtomicBool,
    remaining: AtomicU32,
}

impl ClickState {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            remaining: AtomicU32::new(0),
        }
    }

    /// Arm a click lasting `samples` output samples.
    pub fn trigger(&self, samples: u32) {
        self.remaining.store(samples, Ordering::Relaxed);
        self.active.store(samples > 0, Ordering::Release);
    }

    /// Consume one sample of the click. Returns `true` while it is sounding.
    pub fn take_sample(&self) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let remaining = self.remaining.load(Ordering::Relaxed);
        if remaining <= 1 {
            self.active.store(false, Ordering::Relaxed);
        }
        if remaining == 0 {
            return false;
        }
        self.remaining.store(remaining - 1, Ordering::Relaxed);
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.active.store(false, Ordering::Relaxed);
        self.remaining.store(0, Ordering::Relaxed);
    }
}

impl Default for ClickState {
    fn default() -> Self {
        Self::new()
    }
}

/// One metronome beat, for the visual indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Beat {
    /// Position within the bar, `0..beats_per_bar`.
    pub index: u32,
    /// `true` on the first beat of the bar.
    pub downbeat: bool,
}

/// Beat counter driven once per beat interval.
#[derive(Debug, Clone, Copy)]
pub struct Metronome {
    beats_per_bar: u32,
    next: u32,
}

impl Metronome {
    pub fn new(beats_per_bar: u32) -> Self {
        Self {
            beats_per_bar: beats_per_bar.max(1),
            next: 0,
        }
    }

    /// Advance one beat.
    ///
    /// While `enabled`, arms a click of `click_samples` and returns the beat.
    /// While disabled, the counter rewinds to the downbeat and nothing sounds.
    pub fn tick(&mut self, enabled: bool, click: &ClickState, click_samples: u32) -> Option<Beat> {
        if !enabled {
            self.next = 0;
            return None;
        }
        let index = self.next;
        self.next = (self.next + 1) % self.beats_per_bar;
        click.trigger(click_samples);
        Some(Beat {
            index,
            downbeat: index == 0,
        })
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLICK_DURATION_SAMPLES;

    // ── ClickState ───────────────────────────────────────────────────

    #[test]
    fn click_counts_down() {
        let click = ClickState::new();
        assert!(!click.take_sample());
        click.trigger(3);
        assert!(click.take_sample());
        assert!(click.take_sample());
        assert!(click.take_sample());
        assert!(!click.take_sample());
        assert!(!click.is_active());
    }

    #[test]
    fn retrigger_restarts() {
        let click = ClickState::new();
        click.trigger(2);
        click.take_sample();
        click.trigger(2);
        assert!(click.take_sample());
        assert!(click.take_sample());
        assert!(!click.take_sample());
    }

    #[test]
    fn zero_length_click_is_silent() {
        let click = ClickState::new();
        click.trigger(0);
        assert!(!click.take_sample());
    }

    #[test]
    fn cancel_stops_click() {
        let click = ClickState::new();
        click.trigger(10);
        click.cancel();
        assert!(!click.take_sample());
    }

    // ── Metronome ────────────────────────────────────────────────────

    #[test]
    fn beats_cycle_through_bar() {
        let click = ClickState::new();
        let mut m = Metronome::new(4);
        let beats: std::vec::Vec<u32> = (0..6)
            .filter_map(|_| m.tick(true, &click, CLICK_DURATION_SAMPLES))
            .map(|b| b.index)
            .collect();
        assert_eq!(beats, [0, 1, 2, 3, 0, 1]);
        assert!(click.is_active());
    }

    #[test]
    fn disabled_tick_is_silent_and_rewinds() {
        let click = ClickState::new();
        let mut m = Metronome::new(4);
        m.tick(true, &click, 1);
        click.cancel();
        assert_eq!(m.tick(false, &click, 1), None);
        assert!(!click.is_active());
        let beat = m.tick(true, &click, 1).unwrap();
        assert!(beat.downbeat);
    }
}
