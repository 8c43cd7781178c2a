//! Shared context handed to every task.

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::semaphore::{GreedySemaphore, Semaphore};
use embassy_sync::signal::Signal;

use crate::allocator::VoiceSlots;
use crate::config::{LoopConfig, QUEUE_DEPTH, TX_MAILBOXES};
use crate::frame::Frame;
use crate::identity::{ModuleIdentity, Role};
use crate::keys::KeyRegistry;
use crate::metronome::ClickState;
use crate::note::{EventKind, NoteId};
use crate::sampler::{LoopRecorder, RecordOutcome};
use crate::state::SharedState;

/// Bus frame queue.
pub type FrameQueue<M> = Channel<M, Frame, QUEUE_DEPTH>;

/// Everything the tasks share, built once at startup.
///
/// On the target this lives in a `StaticCell` and every task receives a
/// `&'static Instrument`. Host tests build one on the stack.
pub struct Instrument<M: RawMutex> {
    pub identity: ModuleIdentity,
    pub keys: KeyRegistry<M>,
    pub voices: VoiceSlots,
    pub state: SharedState<M>,
    pub recorder: LoopRecorder<M>,
    pub click: ClickState,
    pub loop_config: LoopConfig,
    /// Frames received from the bus, waiting for the relay.
    pub inbound: FrameQueue<M>,
    /// Frames waiting for a transmit mailbox.
    pub outbound: FrameQueue<M>,
    /// One permit per free hardware transmit mailbox.
    pub tx_permits: GreedySemaphore<M>,
    /// Raised when another module asks for a new handshake.
    pub handshake_request: Signal<M, ()>,
}

impl<M: RawMutex> Instrument<M> {
    pub fn new(octave: u8, loop_config: LoopConfig) -> Self {
        Self {
            identity: ModuleIdentity::new(octave),
            keys: KeyRegistry::new(),
            voices: VoiceSlots::new(),
            state: SharedState::new(),
            recorder: LoopRecorder::new(),
            click: ClickState::new(),
            loop_config,
            inbound: Channel::new(),
            outbound: Channel::new(),
            tx_permits: GreedySemaphore::new(TX_MAILBOXES),
            handshake_request: Signal::new(),
        }
    }

    /// Record a key event for the loop sampler.
    ///
    /// Only the Primary runs loop cycles, so a Peripheral never records.
    /// When nothing is recorded this yields once, so a caller looping on it
    /// never spins.
    pub async fn record_event(
        &self,
        sampler_enabled: bool,
        kind: EventKind,
        note: NoteId,
        now_ms: u64,
    ) -> RecordOutcome {
        let enabled = sampler_enabled && self.identity.role() == Role::Primary;
        let outcome = self.recorder.record(enabled, kind, note, now_ms);
        if outcome == RecordOutcome::Disabled {
            yield_now().await;
        }
        outcome
    }

    /// A transmit mailbox became free. Call from the bus TX-complete interrupt.
    pub fn tx_complete(&self) {
        self.tx_permits.release(1);
    }
}
