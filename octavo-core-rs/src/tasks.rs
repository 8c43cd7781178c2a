//! Async task loops.
//!
//! These are plain `async fn`s, **not** Embassy `#[task]`s, because Embassy
//! tasks cannot be generic. The firmware wraps each one in a thin concrete
//! task:
//!
//! ```ignore
//! #[embassy_executor::task]
//! async fn scan_task(scanner: KeyScanner, matrix: BoardMatrix, inst: &'static Instrument<CriticalSectionRawMutex>) {
//!     scan_keys_task(scanner, matrix, inst).await
//! }
//! ```
//!
//! | Task | Period | Role |
//! |---|---|---|
//! | [`scan_keys_task`] | 5 ms, absolute | all |
//! | [`decode_task`] | inbound queue, 10 ms bounded wait | all |
//! | [`transmit_task`] | outbound queue | all |
//! | [`sampler_task`] | loop length, absolute boundaries | Primary |
//! | [`metronome_task`] | beat interval | Primary |
//! | [`display_task`] | 100 ms | all |

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{with_timeout, Duration, Instant, Ticker, Timer};

use crate::config::{
    CLICK_DURATION_SAMPLES, DECODE_POLL_MS, DISPLAY_PERIOD_MS, HANDSHAKE_SETTLE_MS,
    SAMPLER_IDLE_POLL_MS, SCAN_PERIOD_MS,
};
use crate::display::{DisplaySink, DisplayState};
use crate::frame::Frame;
use crate::identity::{ModuleIdentity, Role};
use crate::instrument::Instrument;
use crate::matrix::KeyMatrix;
use crate::metronome::{Beat, Metronome};
use crate::relay::{handle_inbound, send, transmit_next, BusTransport, InboundAction};
use crate::sampler::{replay_schedule, simulate, SamplerGate, SamplerTransition};
use crate::scanner::KeyScanner;

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

/// Sampler and metronome only run on the Primary with the sampler on.
async fn looping_enabled<M: RawMutex>(inst: &Instrument<M>) -> bool {
    inst.identity.role() == Role::Primary && inst.state.sampler_enabled().await
}

// ── Handshake ────────────────────────────────────────────────────────────

/// Work out this module's octave from its neighbours.
///
/// Drives the handshake output, lets the lines settle for
/// [`HANDSHAKE_SETTLE_MS`], then reads them and stores the octave.
pub async fn perform_handshake<K: KeyMatrix>(
    scanner: &mut KeyScanner,
    matrix: &mut K,
    identity: &ModuleIdentity,
) -> u8 {
    matrix.drive_output(true);
    Timer::after(Duration::from_millis(HANDSHAKE_SETTLE_MS)).await;
    let octave = scanner.resolve_identity(matrix, identity);
    #[cfg(feature = "defmt")]
    defmt::info!("Handshake: octave {} ({})", octave, identity.role());
    octave
}

// ── Key scanning ─────────────────────────────────────────────────────────

/// Scan the matrix every [`SCAN_PERIOD_MS`].
///
/// Outbound key frames are queued with backpressure: a full queue delays
/// the scanner rather than losing a frame. When the neighbour lines change
/// the handshake is redone and an `H` frame announces the new octave; a
/// handshake requested by another module is redone silently.
///
/// `scanner` should already hold the startup handshake result.
pub async fn scan_keys_task<M: RawMutex, K: KeyMatrix>(
    mut scanner: KeyScanner,
    mut matrix: K,
    inst: &Instrument<M>,
) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(SCAN_PERIOD_MS));
    loop {
        ticker.next().await;

        let report = scanner.scan_cycle(&mut matrix, inst, now_ms()).await;
        for frame in report.outbound {
            send(inst, frame).await;
        }

        let requested = inst.handshake_request.try_take().is_some();
        if report.handshake_changed || requested {
            let octave = perform_handshake(&mut scanner, &mut matrix, &inst.identity).await;
            if report.handshake_changed {
                send(inst, Frame::handshake(octave)).await;
            }
        }
    }
}

// ── Bus ──────────────────────────────────────────────────────────────────

/// Apply inbound frames as they arrive.
///
/// Waits at most [`DECODE_POLL_MS`] for a frame, then yields so the loop
/// never monopolises the executor.
pub async fn decode_task<M: RawMutex>(inst: &Instrument<M>) -> ! {
    let poll = Duration::from_millis(DECODE_POLL_MS);
    loop {
        match with_timeout(poll, inst.inbound.receive()).await {
            Ok(frame) => {
                let action = handle_inbound(inst, frame, now_ms()).await;
                if action == InboundAction::Handshake {
                    inst.handshake_request.signal(());
                }
            }
            Err(_) => yield_now().await,
        }
    }
}

/// Hand queued frames to the transport, one transmit permit each.
pub async fn transmit_task<M: RawMutex, T: BusTransport>(inst: &Instrument<M>, mut transport: T) -> ! {
    loop {
        transmit_next(inst, &mut transport).await;
    }
}

// ── Sampler ──────────────────────────────────────────────────────────────

/// Run the loop sampler.
///
/// # Control flow
///
/// 1. Watch the sampler flag. Switching off releases every held note and
///    clears the buffers. While off (or not Primary), poll every
///    [`SAMPLER_IDLE_POLL_MS`].
/// 2. Replay the playback buffer, sleeping the gap between consecutive
///    timestamps before each event. Switching off mid-replay abandons the
///    rest of the cycle.
/// 3. Sleep until the absolute loop boundary, so cycles do not drift.
/// 4. Merge the recording into the playback buffer and start the next
///    cycle at the boundary, in one step.
pub async fn sampler_task<M: RawMutex>(inst: &Instrument<M>) -> ! {
    let loop_length = Duration::from_millis(inst.loop_config.loop_length_ms());
    let idle = Duration::from_millis(SAMPLER_IDLE_POLL_MS);
    let mut gate = SamplerGate::new();
    let mut boundary: Option<Instant> = None;

    loop {
        let enabled = looping_enabled(inst).await;
        match gate.observe(enabled) {
            Some(SamplerTransition::Disabled) => {
                inst.recorder.disable(&inst.keys, &inst.identity);
                boundary = None;
            }
            Some(SamplerTransition::Enabled) => {
                #[cfg(feature = "defmt")]
                defmt::info!("Sampler enabled, loop {} ms", inst.loop_config.loop_length_ms());
            }
            None => {}
        }
        if !enabled {
            Timer::after(idle).await;
            continue;
        }

        // ── Replay ───────────────────────────────────────────────────
        let start = match boundary {
            Some(start) => start,
            None => {
                let now = Instant::now();
                inst.recorder.begin_cycle(now.as_millis());
                now
            }
        };
        let playback = inst.recorder.playback();
        let mut aborted = false;
        for (delay, event) in replay_schedule(playback.as_slice()) {
            Timer::after(Duration::from_millis(delay as u64)).await;
            if !looping_enabled(inst).await {
                aborted = true;
                break;
            }
            simulate(&inst.keys, inst.identity.octave(), &event);
        }
        if aborted {
            continue;
        }

        // ── Boundary and swap ────────────────────────────────────────
        let next = start + loop_length;
        Timer::at(next).await;
        let _report = inst.recorder.swap_at(next.as_millis());
        #[cfg(feature = "defmt")]
        defmt::debug!("Loop swap: {}", _report);
        boundary = Some(next);
    }
}

/// Click on every beat while the sampler runs.
///
/// `on_beat` is called for each beat (the firmware blinks an LED on it).
/// The beat grid restarts whenever the sampler is switched on.
pub async fn metronome_task<M: RawMutex, F: FnMut(Beat)>(inst: &Instrument<M>, mut on_beat: F) -> ! {
    let beat = Duration::from_millis(inst.loop_config.beat_interval_ms());
    let idle = Duration::from_millis(SAMPLER_IDLE_POLL_MS);
    let mut metronome = Metronome::new(inst.loop_config.beats_per_bar);

    loop {
        if !looping_enabled(inst).await {
            metronome.reset();
            Timer::after(idle).await;
            continue;
        }

        let mut ticker = Ticker::every(beat);
        loop {
            let enabled = looping_enabled(inst).await;
            match metronome.tick(enabled, &inst.click, CLICK_DURATION_SAMPLES) {
                Some(b) => on_beat(b),
                None => break,
            }
            ticker.next().await;
        }
    }
}

// ── Display ──────────────────────────────────────────────────────────────

/// Refresh the display every [`DISPLAY_PERIOD_MS`], skipping unchanged frames.
pub async fn display_task<M: RawMutex, D: DisplaySink>(inst: &Instrument<M>, mut sink: D) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(DISPLAY_PERIOD_MS));
    let mut last: Option<DisplayState> = None;
    loop {
        ticker.next().await;
        let state = DisplayState::capture(inst).await;
        if last == Some(state) {
            continue;
        }
        sink.show(&state).await;
        last = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;
    use core::future::Future;

    use embassy_futures::block_on;
    use embassy_futures::select::{select, Either};
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use super::*;
    use crate::config::LoopConfig;
    use crate::matrix::mock::MockMatrix;
    use crate::note::{EventKind, NoteId};

    type Inst = Instrument<CriticalSectionRawMutex>;

    /// Matrix the test can rewire while a task owns it.
    struct SharedMatrix<'a>(&'a RefCell<MockMatrix>);

    impl KeyMatrix for SharedMatrix<'_> {
        fn select_row(&mut self, row: u8) {
            self.0.borrow_mut().select_row(row);
        }

        fn read_columns(&mut self) -> u8 {
            self.0.borrow_mut().read_columns()
        }

        fn drive_output(&mut self, on: bool) {
            self.0.borrow_mut().drive_output(on);
        }
    }

    /// Poll `task` alongside `scenario` until the scenario finishes.
    fn run_with<R>(task: impl Future, scenario: impl Future<Output = R>) -> R {
        match block_on(select(task, scenario)) {
            Either::First(_) => unreachable!("task loops never return"),
            Either::Second(result) => result,
        }
    }

    fn press_sampler_button(inst: &Inst) {
        block_on(async {
            let mut state = inst.state.lock().await;
            state.sampler_knob.update_press(false);
            state.sampler_knob.update_press(false);
            state.sampler_knob.update_press(true);
        });
    }

    async fn sleep_ms(ms: u64) {
        Timer::after(Duration::from_millis(ms)).await;
    }

    // ── Handshake ────────────────────────────────────────────────────

    #[test]
    fn west_neighbour_appearing_triggers_handshake_frame() {
        let inst = Inst::new(5, LoopConfig::default());
        let matrix = RefCell::new(MockMatrix::new());
        matrix.borrow_mut().set_handshake(false, false);
        let mut scanner = KeyScanner::new();
        let octave = block_on(perform_handshake(
            &mut scanner,
            &mut SharedMatrix(&matrix),
            &inst.identity,
        ));
        assert_eq!(octave, 5);

        let sent = run_with(scan_keys_task(scanner, SharedMatrix(&matrix), &inst), async {
            sleep_ms(20).await;
            assert!(inst.outbound.is_empty());
            matrix.borrow_mut().set_handshake(true, false);
            with_timeout(Duration::from_millis(500), inst.outbound.receive())
                .await
                .ok()
        });
        assert_eq!(sent, Some(Frame::handshake(4)));
        assert_eq!(inst.identity.octave(), 4);
        assert_eq!(inst.identity.role(), Role::Primary);
    }

    #[test]
    fn requested_handshake_is_redone_silently() {
        let inst = Inst::new(5, LoopConfig::default());
        let matrix = RefCell::new(MockMatrix::new());
        matrix.borrow_mut().set_handshake(false, false);
        let mut scanner = KeyScanner::new();
        block_on(perform_handshake(
            &mut scanner,
            &mut SharedMatrix(&matrix),
            &inst.identity,
        ));
        inst.identity.assign(6);

        run_with(scan_keys_task(scanner, SharedMatrix(&matrix), &inst), async {
            inst.handshake_request.signal(());
            sleep_ms(150).await;
        });
        assert_eq!(inst.identity.octave(), 5);
        assert!(inst.outbound.is_empty());
    }

    // ── Sampler ──────────────────────────────────────────────────────

    #[test]
    fn sampler_cycle_replays_on_absolute_boundary_and_aborts_on_disable() {
        // 240 bpm, 4 beats: one loop every 1000 ms.
        let inst = Inst::new(
            4,
            LoopConfig {
                bpm: 240,
                beats_per_bar: 4,
            },
        );
        let note = NoteId::new(5, 2).unwrap();
        press_sampler_button(&inst);

        run_with(sampler_task(&inst), async {
            sleep_ms(20).await;
            let first = inst.recorder.loop_start_ms().unwrap();
            let at = |offset: u64| Timer::at(Instant::from_millis(first + offset));

            // First cycle: record a press and its release.
            at(100).await;
            inst.record_event(true, EventKind::Press, note, now_ms()).await;
            at(500).await;
            inst.record_event(true, EventKind::Release, note, now_ms()).await;

            // Second cycle starts exactly one loop later with both merged.
            at(1_050).await;
            assert_eq!(inst.recorder.loop_start_ms(), Some(first + 1_000));
            assert_eq!(inst.recorder.playback().len(), 2);
            assert_eq!(inst.recorder.recorded_len(), 0);
            assert!(!inst.keys.remote(5).unwrap().is_pressed(2));

            // The replayed press lands about 100 ms into the cycle.
            at(1_300).await;
            assert!(inst.keys.remote(5).unwrap().is_pressed(2));

            // Switching off before the replayed release abandons the cycle
            // and releases the held note.
            press_sampler_button(&inst);
            at(1_700).await;
            assert!(!inst.keys.remote(5).unwrap().is_pressed(2));
            assert!(inst.recorder.playback().is_empty());
            assert_eq!(inst.recorder.loop_start_ms(), None);
        });
    }

    #[test]
    fn peripheral_sampler_stays_idle() {
        let inst = Inst::new(5, LoopConfig::default());
        press_sampler_button(&inst);
        run_with(sampler_task(&inst), sleep_ms(120));
        assert_eq!(inst.recorder.loop_start_ms(), None);
    }
}
