//! Replay of recorded events and sampler enable/disable tracking.

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::buffer::NoteEvent;
use crate::keys::KeyRegistry;
use crate::note::{EventKind, NoteId};

/// Apply one replayed event to the key registry as if the key had moved.
///
/// Takes exactly one registry lock. Handshake events and events for
/// octaves the registry does not track are skipped. Returns `true` if the
/// registry was updated.
pub fn simulate<M: RawMutex>(keys: &KeyRegistry<M>, local_octave: u8, event: &NoteEvent) -> bool {
    let pressed = match event.kind {
        EventKind::Press => true,
        EventKind::Release => false,
        EventKind::Handshake => return false,
    };
    let Ok(note) = NoteId::new(event.octave, event.semitone) else {
        return false;
    };
    keys.apply(local_octave, note, pressed).is_ok()
}

/// Pair each event with the delay to wait before applying it.
///
/// The delay is the gap since the previous event's timestamp (the first
/// event waits for its own timestamp), so the delays add up to the last
/// timestamp. Events must already be sorted.
///
/// # Examples
///
/// ```
/// use octavo::sampler::{replay_schedule, NoteEvent};
/// use octavo::note::{EventKind, NoteId};
///
/// let note = NoteId::new(4, 0).unwrap();
/// let events = [0, 100, 250].map(|t| NoteEvent::new(t, EventKind::Press, note));
/// let delays: Vec<u32> = replay_schedule(&events).map(|(d, _)| d).collect();
/// assert_eq!(delays, [0, 100, 150]);
/// ```
pub fn replay_schedule(events: &[NoteEvent]) -> impl Iterator<Item = (u32, NoteEvent)> + '_ {
    events.iter().scan(0u32, |last, event| {
        let delay = event.timestamp_ms.saturating_sub(*last);
        *last = event.timestamp_ms;
        Some((delay, *event))
    })
}

/// Sampler enable change seen by [`SamplerGate::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplerTransition {
    Enabled,
    Disabled,
}

/// Edge detector on the sampler-enabled flag. Starts out disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerGate {
    previous: bool,
}

impl SamplerGate {
    pub const fn new() -> Self {
        Self { previous: false }
    }

    pub fn observe(&mut self, enabled: bool) -> Option<SamplerTransition> {
        let transition = match (self.previous, enabled) {
            (false, true) => Some(SamplerTransition::Enabled),
            (true, false) => Some(SamplerTransition::Disabled),
            _ => None,
        };
        self.previous = enabled;
        transition
    }

    pub fn is_enabled(&self) -> bool {
        self.previous
    }
}
