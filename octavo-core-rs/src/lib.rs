//! Real-time control core for stackable keyboard modules.
//!
//! Each physical module carries one octave of keys. Modules discover their
//! octave through a handshake with their neighbours, exchange key events
//! over a shared bus, and the west-most (Primary) module turns every held
//! key into sound through a five-voice direct digital synthesis engine. A
//! loop sampler records timed note events and replays them on the next
//! loop cycle, with a metronome click mixed into the audio.
//!
//! # Data flow
//!
//! ```text
//! KeyMatrix ──► KeyScanner ──► KeyRegistry ──► allocator ──► VoiceSlots ──► DdsEngine ──► DAC
//!                   │  ▲             ▲                                         ▲
//!                   │  └ Knob ─► SharedState (volume, sampler flag) ───────────┤
//!                   ▼                │                                         │
//!               outbound ◄───────────┼── relay ◄── inbound          Metronome ─┘ (ClickState)
//!                                    ▼
//!                               LoopRecorder ──► simulated events ──► KeyRegistry
//! ```
//!
//! All shared state lives in one [`Instrument`], built once at startup and
//! passed by reference to every task. The audio path
//! ([`DdsEngine::render`]) only touches atomics, so it can run from a timer
//! interrupt that preempts every task.
//!
//! # Crate Features
//!
//! - **`defmt`**: structured logging via [`defmt`](https://docs.rs/defmt).
//! - **`task`**: the async task loops in [`tasks`], which need
//!   `embassy-time`.
//!
//! # `no_std` Compatibility
//!
//! No heap allocation. Every buffer is a fixed-size array or a
//! [`heapless`] collection sized by the constants in [`config`].

#![cfg_attr(not(test), no_std)]

pub mod allocator;
pub mod audio;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod identity;
pub mod instrument;
pub mod keys;
pub mod knob;
pub mod matrix;
pub mod metronome;
pub mod note;
pub mod relay;
pub mod sampler;
pub mod scanner;
pub mod state;
#[cfg(any(feature = "task", test))]
pub mod tasks;
pub mod voice_bank;

// ── Re-exports for convenience ───────────────────────────────────────────

pub use allocator::{recompute_voices, select_voices, VoiceSlots};
pub use audio::DdsEngine;
pub use config::LoopConfig;
pub use display::{DisplaySink, DisplayState};
pub use error::OctavoError;
pub use frame::Frame;
pub use identity::{resolve_octave, ModuleIdentity, Role};
pub use instrument::Instrument;
pub use keys::{KeyRegistry, KeySet};
pub use knob::Knob;
pub use matrix::{KeyMatrix, MatrixInputs};
pub use metronome::{Beat, ClickState, Metronome};
pub use note::{EventKind, NoteId};
pub use relay::{BusTransport, InboundAction};
pub use sampler::{LoopRecorder, NoteEvent, RecordOutcome};
pub use scanner::{KeyScanner, ScanReport};
pub use state::{SharedState, SystemState};
