//! Bounded event buffer.

use heapless::Vec;

use crate::config::MAX_EVENTS;
use crate::note::{EventKind, NoteId};

/// One recorded key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoteEvent {
    /// Milliseconds since the start of the loop cycle it was recorded in.
    pub timestamp_ms: u32,
    pub kind: EventKind,
    pub octave: u8,
    pub semitone: u8,
}

impl NoteEvent {
    pub fn new(timestamp_ms: u32, kind: EventKind, note: NoteId) -> Self {
        Self {
            timestamp_ms,
            kind,
            octave: note.octave,
            semitone: note.semitone,
        }
    }

    pub fn note(&self) -> NoteId {
        NoteId {
            octave: self.octave,
            semitone: self.semitone,
        }
    }
}

/// Up to [`MAX_EVENTS`] events. Anything past capacity is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBuffer {
    events: Vec<NoteEvent, MAX_EVENTS>,
}

impl EventBuffer {
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add one event. Returns `false` (and drops it) if the buffer is full.
    pub fn push(&mut self, event: NoteEvent) -> bool {
        self.events.push(event).is_ok()
    }

    /// Copy all of `events`, or none of them if they do not all fit.
    ///
    /// Returns `false` when nothing was copied. A partial copy could keep a
    /// press and lose its release.
    pub fn append_all(&mut self, events: &[NoteEvent]) -> bool {
        if self.events.len() + events.len() > MAX_EVENTS {
            return false;
        }
        self.events.extend_from_slice(events).is_ok()
    }

    /// Stable sort by timestamp.
    ///
    /// Insertion sort: the buffer is small and usually nearly sorted, and
    /// `heapless` offers no allocation-free stable sort.
    pub fn sort_by_timestamp(&mut self) {
        for i in 1..self.events.len() {
            let mut j = i;
            while j > 0 && self.events[j - 1].timestamp_ms > self.events[j].timestamp_ms {
                self.events.swap(j - 1, j);
                j -= 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.is_full()
    }

    pub fn as_slice(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn iter(&self) -> core::slice::Iter<'_, NoteEvent> {
        self.events.iter()
    }
}
