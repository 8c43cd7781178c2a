//! Loop sampler: records key events during one loop cycle and replays them
//! on the following cycles.
//!
//! # Loop cycle
//!
//! ```text
//!  boundary                                               boundary
//!     │ begin_cycle                                           │ swap
//!     ├──── replay playback buffer (relative delays) ───┐     │
//!     │                                                 └─wait┤
//!     │ ◄──────── live events recorded, stamped from start ──►│
//! ```
//!
//! The recording buffer is merged into the playback buffer at every
//! boundary, so each cycle layers on top of the previous ones until the
//! sampler is switched off. Switching off releases every held note and
//! clears both buffers.
//!
//! Both buffers hold at most [`MAX_EVENTS`](crate::config::MAX_EVENTS)
//! events; overflow is dropped, never an error.

mod buffer;
mod playback;
mod recorder;

pub use buffer::{EventBuffer, NoteEvent};
pub use playback::{replay_schedule, simulate, SamplerGate, SamplerTransition};
pub use recorder::{LoopRecorder, RecordOutcome, SwapReport};
