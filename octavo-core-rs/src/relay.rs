//! Bus relay: applies frames from other modules and feeds frames to the bus.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::semaphore::Semaphore;

use crate::error::OctavoError;
use crate::frame::{Frame, FRAME_LEN};
use crate::instrument::Instrument;
use crate::note::EventKind;
use crate::sampler::RecordOutcome;

/// What the relay did with an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InboundAction {
    /// A remote key changed; `recorded` tells whether the sampler kept it.
    KeyUpdated { recorded: bool },
    /// The sender's neighbours changed; this module should redo its handshake.
    Handshake,
    /// Frame was for this module's own octave or an octave nobody plays.
    Ignored,
}

/// Outgoing side of the bus.
///
/// [`transmit_next`] takes one of the
/// [`TX_MAILBOXES`](crate::config::TX_MAILBOXES) permits per frame, and
/// [`Instrument::tx_complete`] gives it back. A transport that can only
/// learn of completion by awaiting it (the STM32 bxCAN HAL) calls
/// `tx_complete` itself before returning; frames then go out one at a time
/// and the permits never run short.
#[allow(async_fn_in_trait)]
pub trait BusTransport {
    /// Queue one frame in a hardware mailbox. A mailbox is known to be free.
    async fn transmit(&mut self, frame: &Frame);
}

/// Apply one decoded frame.
pub async fn handle_inbound<M: RawMutex>(
    inst: &Instrument<M>,
    frame: Frame,
    now_ms: u64,
) -> InboundAction {
    let local_octave = inst.identity.octave();
    let note = match frame.note() {
        None => {
            inst.state.record_rx(frame).await;
            return InboundAction::Handshake;
        }
        Some(note) if note.octave == local_octave => return InboundAction::Ignored,
        Some(note) => note,
    };
    let pressed = frame.kind == EventKind::Press;
    if inst.keys.set_remote(note, pressed).is_err() {
        #[cfg(feature = "defmt")]
        defmt::debug!("Ignoring frame for octave {}", note.octave);
        return InboundAction::Ignored;
    }

    let sampler_enabled = {
        let mut state = inst.state.lock().await;
        state.record_rx(frame);
        state.sampler_enabled()
    };
    let recorded = inst
        .record_event(sampler_enabled, frame.kind, note, now_ms)
        .await;
    InboundAction::KeyUpdated {
        recorded: recorded == RecordOutcome::Recorded,
    }
}

/// Decode a payload straight off the bus and queue it for the relay.
///
/// Safe to call from the receive interrupt: it never waits. Returns
/// `Ok(false)` if the inbound queue is full and the frame was dropped.
///
/// # Errors
///
/// Malformed payloads are rejected with the decode error and not queued.
pub fn enqueue_raw<M: RawMutex>(inst: &Instrument<M>, bytes: &[u8; FRAME_LEN]) -> Result<bool, OctavoError> {
    let frame = Frame::decode(bytes).inspect_err(|_e| {
        #[cfg(feature = "defmt")]
        defmt::warn!("Dropping malformed frame: {}", _e);
    })?;
    let queued = inst.inbound.try_send(frame).is_ok();
    if !queued {
        #[cfg(feature = "defmt")]
        defmt::warn!("Inbound queue full, dropped {}", frame);
    }
    Ok(queued)
}

/// Queue a frame for transmission, waiting while the queue is full.
pub async fn send<M: RawMutex>(inst: &Instrument<M>, frame: Frame) {
    inst.outbound.send(frame).await;
}

/// Take the next outbound frame and hand it to the transport once a
/// mailbox is free.
///
/// The permit stays taken until [`Instrument::tx_complete`] gives it back.
pub async fn transmit_next<M: RawMutex, T: BusTransport>(inst: &Instrument<M>, transport: &mut T) {
    let frame = inst.outbound.receive().await;
    // GreedySemaphore::acquire cannot fail.
    if let Ok(permit) = inst.tx_permits.acquire(1).await {
        permit.disarm();
    }
    transport.transmit(&frame).await;
}
