//! System state shared by the scanner, relay, sampler and display.
//!
//! [`SystemState`] sits behind one coarse async mutex. The audio interrupt
//! cannot wait on that mutex, so the volume is also mirrored into an atomic
//! that [`SharedState::volume`] reads without locking.

use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

use crate::config::{DEFAULT_VOLUME, VOLUME_MAX, VOLUME_MIN};
use crate::frame::Frame;
use crate::knob::Knob;
use crate::matrix::MatrixInputs;

/// Knob and input state updated by the key scanner.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemState {
    /// Volume knob, `0..=8`.
    pub volume_knob: Knob,
    /// Sampler knob; its push toggle enables the loop sampler.
    pub sampler_knob: Knob,
    /// Raw matrix word from the latest scan.
    pub inputs: MatrixInputs,
    /// Last frame accepted from the bus.
    pub last_rx: Option<Frame>,
}

impl SystemState {
    pub const fn new() -> Self {
        Self {
            volume_knob: Knob::with_value(VOLUME_MIN, VOLUME_MAX, DEFAULT_VOLUME),
            sampler_knob: Knob::new(0, 8),
            inputs: MatrixInputs::RELEASED,
            last_rx: None,
        }
    }

    /// Feed one scan's inputs to the knobs and keep the raw word.
    pub fn update_from_matrix(&mut self, inputs: MatrixInputs) {
        self.volume_knob.update_rotation(inputs.volume_quadrature());
        self.sampler_knob.update_press(inputs.sampler_pressed());
        self.inputs = inputs;
    }

    pub fn volume(&self) -> u8 {
        self.volume_knob.value() as u8
    }

    pub fn sampler_enabled(&self) -> bool {
        self.sampler_knob.toggled()
    }

    pub fn record_rx(&mut self, frame: Frame) {
        self.last_rx = Some(frame);
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

/// [`SystemState`] under its coarse lock, plus the lock-free volume mirror.
pub struct SharedState<M: RawMutex> {
    state: Mutex<M, SystemState>,
    volume: AtomicU8,
}

impl<M: RawMutex> SharedState<M> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SystemState::new()),
            volume: AtomicU8::new(DEFAULT_VOLUME as u8),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, M, SystemState> {
        self.state.lock().await
    }

    /// Copy of the whole state.
    pub async fn snapshot(&self) -> SystemState {
        *self.state.lock().await
    }

    pub async fn sampler_enabled(&self) -> bool {
        self.state.lock().await.sampler_enabled()
    }

    /// Current volume, readable from interrupt context.
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Apply one scan's inputs under the lock and refresh the volume mirror.
    /// Returns the sampler-enabled flag after the update.
    pub async fn publish_inputs(&self, inputs: MatrixInputs) -> bool {
        let (volume, enabled) = {
            let mut state = self.state.lock().await;
            state.update_from_matrix(inputs);
            (state.volume(), state.sampler_enabled())
        };
        self.volume.store(volume, Ordering::Relaxed);
        enabled
    }

    pub async fn record_rx(&self, frame: Frame) {
        self.state.lock().await.record_rx(frame);
    }
}

impl<M: RawMutex> Default for SharedState<M> {
    fn default() -> Self {
        Self::new()
    }
}
