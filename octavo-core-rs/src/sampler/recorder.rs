//! Recording and playback buffers under one lock.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::buffer::{EventBuffer, NoteEvent};
use super::playback::simulate;
use crate::identity::ModuleIdentity;
use crate::keys::KeyRegistry;
use crate::note::{EventKind, NoteId};

/// Result of [`LoopRecorder::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordOutcome {
    Recorded,
    /// Recording buffer was full.
    Dropped,
    /// Sampler is off; nothing was recorded.
    Disabled,
}

/// Summary of one loop-boundary swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SwapReport {
    /// Events moved from the recording into the playback buffer.
    pub appended: usize,
    /// Recorded events discarded because they did not all fit.
    pub dropped: usize,
    /// Playback buffer length after the swap.
    pub total: usize,
}

struct Buffers {
    recording: EventBuffer,
    playback: EventBuffer,
    loop_start_ms: Option<u64>,
}

impl Buffers {
    fn swap(&mut self) -> SwapReport {
        let recorded = self.recording.len();
        if recorded == 0 {
            return SwapReport {
                total: self.playback.len(),
                ..SwapReport::default()
            };
        }
        let merged = self.playback.append_all(self.recording.as_slice());
        self.recording.clear();
        if merged {
            self.playback.sort_by_timestamp();
        }
        SwapReport {
            appended: if merged { recorded } else { 0 },
            dropped: if merged { 0 } else { recorded },
            total: self.playback.len(),
        }
    }
}

/// Loop sampler storage.
///
/// Every operation takes the single buffer lock once and never calls out
/// while holding it.
pub struct LoopRecorder<M: RawMutex> {
    inner: Mutex<M, RefCell<Buffers>>,
}

impl<M: RawMutex> LoopRecorder<M> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Buffers {
                recording: EventBuffer::new(),
                playback: EventBuffer::new(),
                loop_start_ms: None,
            })),
        }
    }

    /// Record one key event at `now_ms`, stamped relative to the loop start.
    ///
    /// Before the first loop cycle begins, events are stamped 0.
    pub fn record(&self, enabled: bool, kind: EventKind, note: NoteId, now_ms: u64) -> RecordOutcome {
        if !enabled {
            return RecordOutcome::Disabled;
        }
        let outcome = self.inner.lock(|cell| {
            let mut buffers = cell.borrow_mut();
            let start = buffers.loop_start_ms.unwrap_or(now_ms);
            let timestamp = now_ms.saturating_sub(start).min(u32::MAX as u64) as u32;
            if buffers.recording.push(NoteEvent::new(timestamp, kind, note)) {
                RecordOutcome::Recorded
            } else {
                RecordOutcome::Dropped
            }
        });
        if outcome == RecordOutcome::Dropped {
            #[cfg(feature = "defmt")]
            defmt::warn!("Recording buffer full, dropped {} {}", kind, note);
        }
        outcome
    }

    /// Mark the start of a new loop cycle.
    pub fn begin_cycle(&self, now_ms: u64) {
        self.inner
            .lock(|cell| cell.borrow_mut().loop_start_ms = Some(now_ms));
    }

    pub fn loop_start_ms(&self) -> Option<u64> {
        self.inner.lock(|cell| cell.borrow().loop_start_ms)
    }

    /// Copy of the playback buffer, for replay outside the lock.
    pub fn playback(&self) -> EventBuffer {
        self.inner.lock(|cell| cell.borrow().playback.clone())
    }

    pub fn recorded_len(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().recording.len())
    }

    /// Move the recording into the playback buffer at a loop boundary.
    ///
    /// The recording is merged whole or not at all: if it does not fit
    /// beside the playback buffer it is discarded and counted in
    /// [`SwapReport::dropped`]. Either way the recording is cleared, in one
    /// critical section. With nothing recorded the playback buffer is left
    /// as it is.
    pub fn swap(&self) -> SwapReport {
        let report = self.inner.lock(|cell| cell.borrow_mut().swap());
        Self::log_swap(&report);
        report
    }

    /// [`swap`](Self::swap) and start the next cycle at `boundary_ms` under
    /// the same lock, so no event is stamped against the old cycle.
    pub fn swap_at(&self, boundary_ms: u64) -> SwapReport {
        let report = self.inner.lock(|cell| {
            let mut buffers = cell.borrow_mut();
            let report = buffers.swap();
            buffers.loop_start_ms = Some(boundary_ms);
            report
        });
        Self::log_swap(&report);
        report
    }

    fn log_swap(report: &SwapReport) {
        if report.dropped > 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("Playback buffer full, dropped {} recorded events", report.dropped);
        }
    }

    /// Empty both buffers and forget the loop start.
    pub fn reset(&self) {
        self.inner.lock(|cell| {
            let mut buffers = cell.borrow_mut();
            buffers.recording.clear();
            buffers.playback.clear();
            buffers.loop_start_ms = None;
        });
    }

    /// Handle the sampler being switched off.
    ///
    /// Every note held on any module gets a synthetic release, one registry
    /// lock at a time, before the buffers are cleared. Returns the number
    /// of notes released.
    pub fn disable<R: RawMutex>(&self, keys: &KeyRegistry<R>, identity: &ModuleIdentity) -> usize {
        let local_octave = identity.octave();
        let held = keys.held_notes(local_octave);
        for &note in held.iter() {
            simulate(keys, local_octave, &NoteEvent::new(0, EventKind::Release, note));
        }
        self.reset();
        #[cfg(feature = "defmt")]
        defmt::info!("Sampler disabled, released {} notes", held.len());
        held.len()
    }
}

impl<M: RawMutex> Default for LoopRecorder<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_EVENTS;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Recorder = LoopRecorder<CriticalSectionRawMutex>;

    fn n(octave: u8, semitone: u8) -> NoteId {
        NoteId { octave, semitone }
    }

    #[test]
    fn disabled_records_nothing() {
        let rec = Recorder::new();
        assert_eq!(
            rec.record(false, EventKind::Press, n(4, 0), 10),
            RecordOutcome::Disabled
        );
        assert_eq!(rec.recorded_len(), 0);
    }

    #[test]
    fn timestamps_relative_to_loop_start() {
        let rec = Recorder::new();
        rec.begin_cycle(1_000);
        rec.record(true, EventKind::Press, n(4, 0), 1_000);
        rec.record(true, EventKind::Release, n(4, 0), 1_250);
        rec.swap();
        let ts: std::vec::Vec<u32> = rec.playback().iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(ts, [0, 250]);
    }

    #[test]
    fn record_before_first_cycle_is_stamped_zero() {
        let rec = Recorder::new();
        rec.record(true, EventKind::Press, n(5, 3), 77_000);
        rec.swap();
        assert_eq!(rec.playback().as_slice()[0].timestamp_ms, 0);
    }

    #[test]
    fn full_recording_drops() {
        let rec = Recorder::new();
        rec.begin_cycle(0);
        for i in 0..MAX_EVENTS as u64 {
            assert_eq!(
                rec.record(true, EventKind::Press, n(4, 0), i),
                RecordOutcome::Recorded
            );
        }
        assert_eq!(
            rec.record(true, EventKind::Press, n(4, 0), 500),
            RecordOutcome::Dropped
        );
    }

    #[test]
    fn swap_appends_sorts_and_clears() {
        let rec = Recorder::new();
        rec.begin_cycle(0);
        rec.record(true, EventKind::Press, n(4, 1), 200);
        rec.swap();
        // Next cycle: an earlier event is merged in front.
        rec.begin_cycle(2_400);
        rec.record(true, EventKind::Press, n(4, 2), 2_450);
        let report = rec.swap();
        assert_eq!(
            report,
            SwapReport {
                appended: 1,
                dropped: 0,
                total: 2
            }
        );
        assert_eq!(rec.recorded_len(), 0);
        let order: std::vec::Vec<u8> = rec.playback().iter().map(|e| e.semitone).collect();
        assert_eq!(order, [2, 1]);
    }

    #[test]
    fn empty_swap_keeps_playback() {
        let rec = Recorder::new();
        rec.record(true, EventKind::Press, n(4, 1), 0);
        rec.swap();
        assert_eq!(rec.swap().total, 1);
        assert_eq!(rec.playback().len(), 1);
    }

    #[test]
    fn swap_overflow_drops_whole_recording() {
        let rec = Recorder::new();
        rec.begin_cycle(0);
        for i in 0..MAX_EVENTS as u64 - 2 {
            rec.record(true, EventKind::Press, n(4, 0), i);
        }
        rec.swap();
        for i in 0..3 {
            rec.record(true, EventKind::Release, n(4, 0), i);
        }
        let report = rec.swap();
        assert_eq!(
            report,
            SwapReport {
                appended: 0,
                dropped: 3,
                total: MAX_EVENTS - 2
            }
        );
        assert_eq!(rec.recorded_len(), 0);
    }

    #[test]
    fn near_full_swap_never_splits_a_press_from_its_release() {
        let rec = Recorder::new();
        let keys = KeyRegistry::<CriticalSectionRawMutex>::new();
        rec.begin_cycle(0);
        for i in 0..MAX_EVENTS as u64 - 1 {
            let kind = if i % 2 == 0 { EventKind::Press } else { EventKind::Release };
            rec.record(true, kind, n(5, 0), i);
        }
        rec.swap();
        assert_eq!(rec.playback().len(), MAX_EVENTS - 1);

        rec.begin_cycle(2_400);
        rec.record(true, EventKind::Press, n(6, 7), 2_500);
        rec.record(true, EventKind::Release, n(6, 7), 2_600);
        let report = rec.swap();
        assert_eq!(report.appended, 0);
        assert_eq!(report.dropped, 2);

        for event in rec.playback().iter() {
            simulate(&keys, 4, event);
        }
        assert!(!keys.remote(6).unwrap().is_pressed(7));
    }

    #[test]
    fn swap_at_starts_next_cycle() {
        let rec = Recorder::new();
        rec.begin_cycle(1_000);
        rec.record(true, EventKind::Press, n(4, 1), 1_200);
        let report = rec.swap_at(3_400);
        assert_eq!(report.appended, 1);
        assert_eq!(rec.loop_start_ms(), Some(3_400));
        rec.record(true, EventKind::Release, n(4, 1), 3_450);
        rec.swap();
        let ts: std::vec::Vec<u32> = rec.playback().iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(ts, [50, 200]);
    }

    #[test]
    fn disable_releases_every_held_note_then_clears() {
        let rec = Recorder::new();
        let keys = KeyRegistry::<CriticalSectionRawMutex>::new();
        let identity = ModuleIdentity::new(4);
        keys.set_local(3, true);
        keys.set_remote(n(5, 7), true).unwrap();
        keys.set_remote(n(6, 11), true).unwrap();
        rec.begin_cycle(0);
        rec.record(true, EventKind::Press, n(4, 3), 10);
        rec.swap();
        rec.record(true, EventKind::Press, n(5, 7), 20);

        assert_eq!(rec.disable(&keys, &identity), 3);
        assert!(keys.held_notes(4).is_empty());
        assert!(rec.playback().is_empty());
        assert_eq!(rec.recorded_len(), 0);
        assert_eq!(rec.loop_start_ms(), None);
    }
}
