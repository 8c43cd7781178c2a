//! Key scanner: one pass over the switch matrix per scan period.
//!
//! A cycle runs to completion before the next one starts:
//!
//! 1. read the whole matrix;
//! 2. turn key edges into registry updates (Primary) or bus frames
//!    (Peripheral);
//! 3. recompute the voice slots, or silence them on a Peripheral;
//! 4. check the neighbour-detect lines;
//! 5. feed the knobs and publish the system state.
//!
//! The handshake itself needs a settle delay, so [`KeyScanner::scan_cycle`]
//! only reports that the lines changed and leaves the re-handshake to the
//! caller.

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::allocator::recompute_voices;
use crate::config::KEYS_PER_OCTAVE;
use crate::frame::Frame;
use crate::identity::{resolve_octave, ModuleIdentity, Role};
use crate::instrument::Instrument;
use crate::matrix::{read_handshake, read_matrix, KeyMatrix, MatrixInputs};
use crate::note::{EventKind, NoteId};
use crate::voice_bank::step_size;

/// What one scan cycle produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Key frames to send, in edge order (Peripheral only).
    pub outbound: Vec<Frame, KEYS_PER_OCTAVE>,
    /// Neighbour-detect lines differ from the previous cycle.
    pub handshake_changed: bool,
    /// Voices sounding after the recompute.
    pub voices: usize,
    /// Sampler flag after this cycle's knob update.
    pub sampler_enabled: bool,
}

/// Scanner state carried from one cycle to the next.
pub struct KeyScanner {
    previous: MatrixInputs,
    previous_handshake: Option<(bool, bool)>,
}

impl KeyScanner {
    /// Every key starts released; the first cycle never reports a
    /// handshake change.
    pub const fn new() -> Self {
        Self {
            previous: MatrixInputs::RELEASED,
            previous_handshake: None,
        }
    }

    pub fn previous_inputs(&self) -> MatrixInputs {
        self.previous
    }

    /// Run one scan cycle.
    pub async fn scan_cycle<M: RawMutex, K: KeyMatrix>(
        &mut self,
        matrix: &mut K,
        inst: &Instrument<M>,
        now_ms: u64,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        let sampler_enabled = inst.state.sampler_enabled().await;
        let inputs = read_matrix(matrix);
        let local_octave = inst.identity.octave();
        let role = inst.identity.role();

        for (semitone, pressed) in inputs.key_edges(self.previous) {
            let note = NoteId {
                octave: local_octave,
                semitone,
            };
            match role {
                Role::Primary => {
                    inst.keys.set_local(semitone, pressed);
                    // Fast path; the recompute below reconciles slot 0.
                    inst.voices
                        .set(0, if pressed { step_size(local_octave, semitone) } else { 0 });
                    inst.record_event(sampler_enabled, EventKind::for_key(pressed), note, now_ms)
                        .await;
                }
                Role::Peripheral => {
                    let _ = report.outbound.push(Frame::key(note, pressed));
                }
            }
        }

        report.voices = match role {
            Role::Primary => recompute_voices(&inst.keys, local_octave, &inst.voices),
            Role::Peripheral => {
                inst.voices.silence();
                0
            }
        };

        let lines = inputs.handshake();
        report.handshake_changed = self.previous_handshake.is_some_and(|p| p != lines);
        self.previous_handshake = Some(lines);

        report.sampler_enabled = inst.state.publish_inputs(inputs).await;
        self.previous = inputs;
        report
    }

    /// Read the neighbour lines and store the octave they imply.
    ///
    /// The handshake output must already have been driven long enough for
    /// the lines to settle. Returns the new octave.
    pub fn resolve_identity<K: KeyMatrix>(&mut self, matrix: &mut K, identity: &ModuleIdentity) -> u8 {
        let (west, east) = read_handshake(matrix);
        self.previous_handshake = Some((west, east));
        let octave = resolve_octave(west, east);
        identity.assign(octave);
        octave
    }
}

impl Default for KeyScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopConfig;
    use crate::matrix::mock::MockMatrix;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Inst = Instrument<CriticalSectionRawMutex>;

    fn cycle(scanner: &mut KeyScanner, m: &mut MockMatrix, inst: &Inst, now: u64) -> ScanReport {
        block_on(scanner.scan_cycle(m, inst, now))
    }

    fn n(octave: u8, semitone: u8) -> NoteId {
        NoteId { octave, semitone }
    }

    // ── Primary ──────────────────────────────────────────────────────

    #[test]
    fn primary_press_sets_registry_and_voice() {
        let inst = Inst::new(4, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        cycle(&mut scanner, &mut m, &inst, 0);

        m.set_key(9, true);
        let report = cycle(&mut scanner, &mut m, &inst, 5);
        assert!(inst.keys.local().is_pressed(9));
        assert_eq!(inst.voices.step(0), step_size(4, 9));
        assert_eq!(report.voices, 1);
        assert!(report.outbound.is_empty());

        m.set_key(9, false);
        cycle(&mut scanner, &mut m, &inst, 10);
        assert!(inst.keys.local().is_empty());
        assert_eq!(inst.voices.active_count(), 0);
    }

    #[test]
    fn primary_mixes_remote_keys() {
        let inst = Inst::new(4, LoopConfig::default());
        inst.keys.set_remote(n(6, 0), true).unwrap();
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        m.set_key(2, true);
        let report = cycle(&mut scanner, &mut m, &inst, 0);
        assert_eq!(report.voices, 2);
        assert_eq!(inst.voices.step(0), step_size(4, 2));
        assert_eq!(inst.voices.step(1), step_size(6, 0));
    }

    #[test]
    fn primary_records_when_sampler_enabled() {
        let inst = Inst::new(4, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        // Press and release the sampler button to enable it.
        m.set_sampler_button(true);
        assert!(cycle(&mut scanner, &mut m, &inst, 0).sampler_enabled);
        m.set_sampler_button(false);
        cycle(&mut scanner, &mut m, &inst, 5);
        inst.recorder.begin_cycle(10);

        m.set_key(0, true);
        cycle(&mut scanner, &mut m, &inst, 60);
        m.set_key(0, false);
        cycle(&mut scanner, &mut m, &inst, 110);
        inst.recorder.swap();
        let events = inst.recorder.playback();
        assert_eq!(events.len(), 2);
        assert_eq!(events.as_slice()[0].timestamp_ms, 50);
        assert_eq!(events.as_slice()[1].kind, EventKind::Release);
    }

    #[test]
    fn primary_does_not_record_when_disabled() {
        let inst = Inst::new(4, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        m.set_key(0, true);
        cycle(&mut scanner, &mut m, &inst, 0);
        assert_eq!(inst.recorder.recorded_len(), 0);
    }

    // ── Peripheral ───────────────────────────────────────────────────

    #[test]
    fn peripheral_emits_frames_instead_of_state() {
        let inst = Inst::new(5, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        m.set_key(3, true);
        m.set_key(7, true);
        let report = cycle(&mut scanner, &mut m, &inst, 0);
        assert_eq!(
            report.outbound.as_slice(),
            &[Frame::press(n(5, 3)), Frame::press(n(5, 7))]
        );
        assert!(inst.keys.local().is_empty());
        assert_eq!(inst.voices.active_count(), 0);

        m.set_key(3, false);
        let report = cycle(&mut scanner, &mut m, &inst, 5);
        assert_eq!(report.outbound.as_slice(), &[Frame::release(n(5, 3))]);
    }

    #[test]
    fn held_keys_do_not_repeat() {
        let inst = Inst::new(6, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        m.set_key(1, true);
        cycle(&mut scanner, &mut m, &inst, 0);
        assert!(cycle(&mut scanner, &mut m, &inst, 5).outbound.is_empty());
    }

    // ── Knobs and handshake ──────────────────────────────────────────

    #[test]
    fn volume_knob_publishes_to_mirror() {
        let inst = Inst::new(4, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        m.set_volume_quadrature(0b00);
        cycle(&mut scanner, &mut m, &inst, 0);
        m.set_volume_quadrature(0b01);
        cycle(&mut scanner, &mut m, &inst, 5);
        assert_eq!(inst.state.volume(), 5);
        let snap = block_on(inst.state.snapshot());
        assert_eq!(snap.inputs, m.inputs);
    }

    #[test]
    fn handshake_change_is_reported_after_first_cycle() {
        let inst = Inst::new(5, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        m.set_handshake(false, false);
        assert!(!cycle(&mut scanner, &mut m, &inst, 0).handshake_changed);
        assert!(!cycle(&mut scanner, &mut m, &inst, 5).handshake_changed);
        m.set_handshake(true, false);
        assert!(cycle(&mut scanner, &mut m, &inst, 10).handshake_changed);
        assert!(!cycle(&mut scanner, &mut m, &inst, 15).handshake_changed);
    }

    #[test]
    fn resolve_identity_assigns_octave() {
        let inst = Inst::new(5, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        m.set_handshake(true, false);
        assert_eq!(scanner.resolve_identity(&mut m, &inst.identity), 4);
        assert_eq!(inst.identity.role(), Role::Primary);
        m.set_handshake(false, false);
        assert_eq!(scanner.resolve_identity(&mut m, &inst.identity), 5);
    }

    #[test]
    fn role_change_silences_voices() {
        let inst = Inst::new(4, LoopConfig::default());
        let mut m = MockMatrix::new();
        let mut scanner = KeyScanner::new();
        m.set_key(0, true);
        cycle(&mut scanner, &mut m, &inst, 0);
        assert_eq!(inst.voices.active_count(), 1);
        inst.identity.assign(5);
        cycle(&mut scanner, &mut m, &inst, 5);
        assert_eq!(inst.voices.active_count(), 0);
    }
}
