//! Board wiring: switch matrix, output multiplexer and CAN bus.
//!
//! ```text
//! RA0 → PB0   RA1 → PB1   RA2 → PB4   REN → PA6   OUT → PB5
//! C0  → PA3   C1  → PA8   C2  → PA7   C3  → PA9
//! CAN RX → PA11   CAN TX → PA12
//! ```

use defmt::*;
use embassy_stm32::can::{CanRx, CanTx, Frame as CanFrame, StandardId};
use embassy_stm32::gpio::{Input, Level, Output};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{block_for, Duration};

use octavo::config::BUS_FRAME_ID;
use octavo::frame::FRAME_LEN;
use octavo::relay::enqueue_raw;
use octavo::{BusTransport, Frame, Instrument, KeyMatrix};

/// Row decoder settle time before the columns are valid.
const ROW_SETTLE: Duration = Duration::from_micros(3);

/// Output latch hold time.
const LATCH_HOLD: Duration = Duration::from_micros(2);

/// Output multiplexer bit: display enable.
pub const DEN_BIT: u8 = 3;

/// Output multiplexer bit: display reset, active low.
pub const DRST_BIT: u8 = 4;

// ── Switch matrix ────────────────────────────────────────────────────────

/// The row decoder, its enable, the shared output line and the four
/// column inputs.
pub struct BoardMatrix {
    row_address: [Output<'static>; 3],
    row_enable: Output<'static>,
    out: Output<'static>,
    columns: [Input<'static>; 4],
}

impl BoardMatrix {
    pub fn new(
        row_address: [Output<'static>; 3],
        row_enable: Output<'static>,
        out: Output<'static>,
        columns: [Input<'static>; 4],
    ) -> Self {
        Self {
            row_address,
            row_enable,
            out,
            columns,
        }
    }

    fn address(&mut self, row: u8) {
        for (bit, pin) in self.row_address.iter_mut().enumerate() {
            pin.set_level(Level::from(row & (1 << bit) != 0));
        }
    }

    /// Latch one bit of the output multiplexer.
    pub fn set_out_mux_bit(&mut self, bit: u8, high: bool) {
        self.row_enable.set_low();
        self.address(bit);
        self.out.set_level(Level::from(high));
        self.row_enable.set_high();
        block_for(LATCH_HOLD);
        self.row_enable.set_low();
    }
}

impl KeyMatrix for BoardMatrix {
    fn select_row(&mut self, row: u8) {
        self.row_enable.set_low();
        self.address(row);
        self.row_enable.set_high();
        block_for(ROW_SETTLE);
    }

    fn read_columns(&mut self) -> u8 {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .fold(0u8, |acc, (c, pin)| acc | (pin.is_high() as u8) << c);
        // Leave the latch closed so OUT changes between rows do not stick.
        self.row_enable.set_low();
        columns
    }

    fn drive_output(&mut self, on: bool) {
        self.out.set_level(Level::from(on));
    }
}

// ── CAN bus ──────────────────────────────────────────────────────────────

/// Transmit side of the CAN bus.
///
/// The HAL reports mailbox completion by future rather than by callback,
/// so the permit is returned once the frame has left its mailbox. Only one
/// frame is ever in flight; the other two mailboxes stay unused.
pub struct CanTransport {
    tx: CanTx<'static>,
    inst: &'static Instrument<CriticalSectionRawMutex>,
    id: StandardId,
}

impl CanTransport {
    /// `None` if [`BUS_FRAME_ID`] is not a valid 11-bit identifier.
    pub fn new(tx: CanTx<'static>, inst: &'static Instrument<CriticalSectionRawMutex>) -> Option<Self> {
        let id = StandardId::new(BUS_FRAME_ID)?;
        Some(Self { tx, inst, id })
    }
}

impl BusTransport for CanTransport {
    async fn transmit(&mut self, frame: &Frame) {
        let payload = frame.encode();
        match CanFrame::new_data(self.id, &payload) {
            Ok(can_frame) => {
                let status = self.tx.write(&can_frame).await;
                self.tx.flush(status.mailbox()).await;
            }
            Err(_) => error!("Could not build CAN frame for {}", frame),
        }
        self.inst.tx_complete();
    }
}

/// Move received payloads into the inbound queue without ever waiting on it.
pub async fn receive_frames(mut rx: CanRx<'static>, inst: &'static Instrument<CriticalSectionRawMutex>) -> ! {
    loop {
        let envelope = match rx.read().await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("CAN receive error: {}", e);
                continue;
            }
        };
        let data = envelope.frame.data();
        let mut payload = [0u8; FRAME_LEN];
        let len = data.len().min(FRAME_LEN);
        payload[..len].copy_from_slice(&data[..len]);
        // Malformed payloads and queue overflow are logged by the relay.
        let _ = enqueue_raw(inst, &payload);
    }
}
