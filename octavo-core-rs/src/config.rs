//! Build-time configuration.
//!
//! Everything here is fixed when the firmware is built. Nothing in the
//! core changes these values at runtime (in particular, the loop tempo).

/// Audio sample rate of the DDS engine in Hz.
pub const SAMPLE_RATE_HZ: u32 = 22_000;

/// Maximum number of simultaneously sounding notes.
pub const MAX_VOICES: usize = 5;

/// Keys on one module (one chromatic octave).
pub const KEYS_PER_OCTAVE: usize = 12;

/// Capacity of the recording and of the playback buffer, in events.
pub const MAX_EVENTS: usize = 128;

/// Volume knob lower bound.
pub const VOLUME_MIN: i32 = 0;

/// Volume knob upper bound. At this volume the mixed sample is not attenuated.
pub const VOLUME_MAX: i32 = 8;

/// Volume at power-on.
pub const DEFAULT_VOLUME: i32 = 4;

/// Key scanner period in milliseconds.
pub const SCAN_PERIOD_MS: u64 = 5;

/// Display refresh period in milliseconds.
pub const DISPLAY_PERIOD_MS: u64 = 100;

/// Time the neighbour-detect lines need to settle after the handshake
/// output is asserted.
pub const HANDSHAKE_SETTLE_MS: u64 = 50;

/// Bounded wait on the inbound bus queue before the decoder yields.
pub const DECODE_POLL_MS: u64 = 10;

/// Poll period of the sampler and metronome while they are idle.
pub const SAMPLER_IDLE_POLL_MS: u64 = 50;

/// Depth of the inbound and outbound bus queues, in frames.
pub const QUEUE_DEPTH: usize = 36;

/// Hardware transmit mailboxes, i.e. frames allowed in flight at once.
pub const TX_MAILBOXES: usize = 3;

/// Bus identifier shared by every keyboard frame.
pub const BUS_FRAME_ID: u16 = 0x123;

/// Length of one metronome click (10 ms at 22 kHz).
pub const CLICK_DURATION_SAMPLES: u32 = SAMPLE_RATE_HZ / 100;

/// Offset added to the mixed sample while a click is sounding.
pub const CLICK_AMPLITUDE: i32 = 48;

// ── LoopConfig ───────────────────────────────────────────────────────────

/// Tempo of the loop sampler and metronome.
///
/// [`LoopConfig::default()`] is 100 BPM in 4/4, giving a 600 ms beat and a
/// 2400 ms loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopConfig {
    /// Beats per minute. Default: 100.
    pub bpm: u32,
    /// Beats in one loop cycle. Default: 4.
    pub beats_per_bar: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            bpm: 100,
            beats_per_bar: 4,
        }
    }
}

impl LoopConfig {
    /// Time between metronome beats in milliseconds.
    ///
    /// Formula: `60000 / bpm`.
    pub fn beat_interval_ms(&self) -> u64 {
        60_000 / self.bpm as u64
    }

    /// Length of one loop cycle in milliseconds.
    ///
    /// Formula: `(60000 / bpm) * beats_per_bar`.
    pub fn loop_length_ms(&self) -> u64 {
        self.beat_interval_ms() * self.beats_per_bar as u64
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loop_config_values() {
        let c = LoopConfig::default();
        assert_eq!(c.bpm, 100);
        assert_eq!(c.beats_per_bar, 4);
    }

    #[test]
    fn default_loop_is_2400_ms() {
        let c = LoopConfig::default();
        assert_eq!(c.beat_interval_ms(), 600);
        assert_eq!(c.loop_length_ms(), 2400);
    }

    #[test]
    fn loop_length_120_bpm_3_beats() {
        let c = LoopConfig {
            bpm: 120,
            beats_per_bar: 3,
        };
        assert_eq!(c.beat_interval_ms(), 500);
        assert_eq!(c.loop_length_ms(), 1500);
    }

    #[test]
    fn click_fits_inside_one_beat() {
        let beat_samples = SAMPLE_RATE_HZ as u64 * LoopConfig::default().beat_interval_ms() / 1000;
        assert!((CLICK_DURATION_SAMPLES as u64) < beat_samples);
    }
}
