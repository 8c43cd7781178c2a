//! octavo-hw-interface
//!
//! Firmware for one keyboard module on an STM32L432KC. Wires the `octavo`
//! core to the board:
//!
//! 1. The startup handshake reads the neighbour-detect lines and settles
//!    this module's octave (4 = Primary, which owns the audio output).
//! 2. The scan task reads the switch matrix every 5 ms. The Primary turns
//!    key edges into voices; Peripherals send them over CAN.
//! 3. The CAN receive task queues frames from the other modules and the
//!    decode task applies them.
//! 4. The audio task runs on a high-priority interrupt executor at
//!    22 kHz and writes the mixed voices to the DAC.
//! 5. The sampler and metronome loop what was played and click on each
//!    beat; the display task draws the state on the OLED.

#![no_std]
#![no_main]

mod board;
mod oled;

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::can::filter::Mask32;
use embassy_stm32::can::{self, Can, CanRx, Fifo, StandardId};
use embassy_stm32::dac::{DacCh1, Value};
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::interrupt::{self, InterruptExt, Priority};
use embassy_stm32::mode::{Async, Blocking};
use embassy_stm32::time::Hertz;
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Ticker, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use octavo::config::{BUS_FRAME_ID, SAMPLE_RATE_HZ};
use octavo::identity::REFERENCE_OCTAVE;
use octavo::tasks;
use octavo::{DdsEngine, Instrument, KeyScanner, LoopConfig};

use crate::board::{BoardMatrix, CanTransport, DEN_BIT, DRST_BIT};
use crate::oled::{OledDriver, OLED_ADDRESS};

// ---------------------------------------------------------------------------
// Interrupts and executors
// ---------------------------------------------------------------------------

bind_interrupts!(struct Irqs {
    I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
    CAN1_RX0 => can::Rx0InterruptHandler<peripherals::CAN1>;
    CAN1_RX1 => can::Rx1InterruptHandler<peripherals::CAN1>;
    CAN1_SCE => can::SceInterruptHandler<peripherals::CAN1>;
    CAN1_TX => can::TxInterruptHandler<peripherals::CAN1>;
});

/// Runs the audio task above everything else.
static EXECUTOR_AUDIO: InterruptExecutor = InterruptExecutor::new();

#[embassy_stm32::interrupt]
unsafe fn TIM2() {
    EXECUTOR_AUDIO.on_interrupt();
}

// ---------------------------------------------------------------------------
// Static storage
// ---------------------------------------------------------------------------

type Inst = Instrument<CriticalSectionRawMutex>;

/// Everything the tasks share.
static INSTRUMENT: StaticCell<Inst> = StaticCell::new();

/// Oscillator phases, touched only by the audio task.
static DDS: DdsEngine = DdsEngine::new();

/// CAN bit rate shared by every module on the bus.
const CAN_BITRATE: u32 = 125_000;

type OledI2c = I2c<'static, Async, i2c::Master>;
type AudioDac = DacCh1<'static, peripherals::DAC1, Blocking>;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

// Thin wrappers that monomorphise the generic core loops so they can be
// spawned as concrete Embassy tasks.

#[embassy_executor::task]
async fn scan_task(scanner: KeyScanner, matrix: BoardMatrix, inst: &'static Inst) {
    tasks::scan_keys_task(scanner, matrix, inst).await
}

#[embassy_executor::task]
async fn decode_task(inst: &'static Inst) {
    tasks::decode_task(inst).await
}

#[embassy_executor::task]
async fn transmit_task(inst: &'static Inst, transport: CanTransport) {
    tasks::transmit_task(inst, transport).await
}

#[embassy_executor::task]
async fn can_rx_task(rx: CanRx<'static>, inst: &'static Inst) {
    board::receive_frames(rx, inst).await
}

#[embassy_executor::task]
async fn sampler_task(inst: &'static Inst) {
    tasks::sampler_task(inst).await
}

#[embassy_executor::task]
async fn metronome_task(inst: &'static Inst, mut led: Output<'static>) {
    tasks::metronome_task(inst, |beat| {
        led.toggle();
        debug!("{}", beat);
    })
    .await
}

#[embassy_executor::task]
async fn display_task(inst: &'static Inst, oled: OledDriver<OledI2c>) {
    tasks::display_task(inst, oled).await
}

/// One sample per tick. Peripherals render silence at mid-scale.
#[embassy_executor::task]
async fn audio_task(mut dac: AudioDac, inst: &'static Inst) {
    let mut ticker = Ticker::every(Duration::from_hz(SAMPLE_RATE_HZ as u64));
    loop {
        ticker.next().await;
        let sample = DDS.render(&inst.voices, inst.state.volume(), &inst.click);
        dac.set(Value::Bit8(sample));
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let config = {
        use embassy_stm32::rcc::*;
        let mut config = embassy_stm32::Config::default();
        // 16 MHz HSI × 10 / 2 = 80 MHz.
        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV1,
            mul: PllMul::MUL10,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R;
        config
    };
    let p = embassy_stm32::init(config);
    info!("octavo-hw-interface starting");

    // ── Switch matrix ────────────────────────────────────────────────────
    let mut matrix = BoardMatrix::new(
        [
            Output::new(p.PB0, Level::Low, Speed::Low),
            Output::new(p.PB1, Level::Low, Speed::Low),
            Output::new(p.PB4, Level::Low, Speed::Low),
        ],
        Output::new(p.PA6, Level::Low, Speed::Low),
        Output::new(p.PB5, Level::Low, Speed::Low),
        [
            Input::new(p.PA3, Pull::None),
            Input::new(p.PA8, Pull::None),
            Input::new(p.PA7, Pull::None),
            Input::new(p.PA9, Pull::None),
        ],
    );
    let led = Output::new(p.PB3, Level::Low, Speed::Low);

    // ── Display: reset pulse, init, then enable ──────────────────────────
    matrix.set_out_mux_bit(DRST_BIT, false);
    Timer::after_micros(2).await;
    matrix.set_out_mux_bit(DRST_BIT, true);

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = Hertz(400_000);
    let i2c = I2c::new(p.I2C1, p.PB6, p.PB7, Irqs, p.DMA1_CH6, p.DMA1_CH7, i2c_config);
    let mut oled = OledDriver::new(i2c, OLED_ADDRESS);
    if let Err(e) = oled.init().await {
        // The module still plays without a display.
        error!("OLED init failed: {}", e);
    }
    matrix.set_out_mux_bit(DEN_BIT, true);

    // ── Shared state and audio ───────────────────────────────────────────
    let inst: &'static Inst = INSTRUMENT.init(Instrument::new(REFERENCE_OCTAVE, LoopConfig::default()));

    let dac = DacCh1::new_blocking(p.DAC1, p.PA4);
    interrupt::TIM2.set_priority(Priority::P2);
    let spawner_audio = EXECUTOR_AUDIO.start(interrupt::TIM2);
    spawner_audio.spawn(unwrap!(audio_task(dac, inst)));

    // ── Handshake ────────────────────────────────────────────────────────
    let mut scanner = KeyScanner::new();
    let octave = tasks::perform_handshake(&mut scanner, &mut matrix, &inst.identity).await;
    info!("Detected module octave: {}", octave);

    // ── CAN bus ──────────────────────────────────────────────────────────
    let Some(bus_id) = StandardId::new(BUS_FRAME_ID) else {
        defmt::panic!("Bus identifier {:x} is not an 11-bit id", BUS_FRAME_ID);
    };
    let mut can = Can::new(p.CAN1, p.PA11, p.PA12, Irqs);
    can.modify_filters()
        .enable_bank(0, Fifo::Fifo0, Mask32::frames_with_std_id(bus_id, StandardId::MAX));
    can.modify_config()
        .set_loopback(false)
        .set_silent(false)
        .set_bitrate(CAN_BITRATE);
    can.enable().await;
    let (tx, rx) = can.split();
    let Some(transport) = CanTransport::new(tx, inst) else {
        defmt::panic!("Could not build the CAN transport");
    };

    // ── Spawn tasks ──────────────────────────────────────────────────────
    spawner.spawn(unwrap!(can_rx_task(rx, inst)));
    spawner.spawn(unwrap!(decode_task(inst)));
    spawner.spawn(unwrap!(transmit_task(inst, transport)));
    spawner.spawn(unwrap!(scan_task(scanner, matrix, inst)));
    spawner.spawn(unwrap!(sampler_task(inst)));
    spawner.spawn(unwrap!(metronome_task(inst, led)));
    spawner.spawn(unwrap!(display_task(inst, oled)));

    info!("All tasks spawned");
}
