//! Display snapshot.
//!
//! The display task captures a [`DisplayState`] every refresh period and
//! redraws only when it differs from the previous frame. Rendering the
//! text lines onto a panel is left to the firmware.

use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::String;

use crate::frame::Frame;
use crate::identity::{Role, LOWEST_OCTAVE, MODULE_COUNT};
use crate::instrument::Instrument;
use crate::keys::KeySet;
use crate::matrix::MatrixInputs;
use crate::note::{note_name, NoteId};

/// Characters per rendered text line.
pub const LINE_LEN: usize = 32;

/// One text line of the display.
pub type Line = String<LINE_LEN>;

/// Something that can show a [`DisplayState`], e.g. an OLED panel.
#[allow(async_fn_in_trait)]
pub trait DisplaySink {
    /// Draw one frame. Failures are the sink's to log; the task carries on.
    async fn show(&mut self, state: &DisplayState);
}

// ── DisplayState ─────────────────────────────────────────────────────────

/// Everything the display needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayState {
    pub octave: u8,
    pub role: Role,
    pub local: KeySet,
    pub remotes: [KeySet; MODULE_COUNT],
    pub volume: u8,
    pub sampler_enabled: bool,
    pub last_rx: Option<Frame>,
    pub inputs: MatrixInputs,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            octave: 0,
            role: Role::Peripheral,
            local: KeySet::empty(),
            remotes: [KeySet::empty(); MODULE_COUNT],
            volume: 0,
            sampler_enabled: false,
            last_rx: None,
            inputs: MatrixInputs::RELEASED,
        }
    }
}

impl DisplayState {
    /// Snapshot the instrument. Each lock is taken and released in turn.
    pub async fn capture<M: RawMutex>(inst: &Instrument<M>) -> Self {
        let octave = inst.identity.octave();
        let local = inst.keys.local();
        let remotes = inst.keys.remotes();
        let state = inst.state.snapshot().await;
        Self {
            octave,
            role: inst.identity.role(),
            local,
            remotes,
            volume: state.volume(),
            sampler_enabled: state.sampler_enabled(),
            last_rx: state.last_rx,
            inputs: state.inputs,
        }
    }

    /// Held notes, local first then remote octaves ascending.
    pub fn held_notes(&self) -> impl Iterator<Item = NoteId> + '_ {
        let octave = self.octave;
        let local = self.local.iter_pressed().map(move |semitone| NoteId { octave, semitone });
        let remote = self
            .remotes
            .iter()
            .enumerate()
            .map(|(i, set)| (LOWEST_OCTAVE + i as u8, set))
            .filter(move |&(o, _)| o != octave)
            .flat_map(|(o, set)| {
                set.iter_pressed().map(move |semitone| NoteId {
                    octave: o,
                    semitone,
                })
            });
        local.chain(remote)
    }

    /// `"Notes: C4 E4 G5"`; names that do not fit are left off.
    pub fn notes_line(&self) -> Line {
        let mut line = Line::new();
        let _ = line.push_str("Notes:");
        for note in self.held_notes() {
            let name = note_name(note);
            if line.len() + 1 + name.len() > LINE_LEN {
                break;
            }
            let _ = write!(line, " {}", name);
        }
        line
    }

    /// Volume on the Primary, the octave on a Peripheral.
    pub fn status_line(&self) -> Line {
        let mut line = Line::new();
        let _ = match self.role {
            Role::Primary => write!(line, "Volume: {}", self.volume),
            Role::Peripheral => write!(line, "Octave {}", self.octave),
        };
        line
    }

    pub fn sampler_line(&self) -> Line {
        let mut line = Line::new();
        let _ = line.push_str(if self.sampler_enabled {
            "Sampler Enabled"
        } else {
            "Sampler Disabled"
        });
        line
    }

    /// Last bus frame as `"RX P 5 3"`, or empty.
    pub fn rx_line(&self) -> Line {
        let mut line = Line::new();
        if let Some(frame) = self.last_rx {
            let _ = write!(
                line,
                "RX {} {} {}",
                frame.kind.as_byte() as char,
                frame.octave,
                frame.semitone
            );
        }
        line
    }

    /// Lines to draw top to bottom. A Peripheral shows its octave and the
    /// last frame it received.
    pub fn lines(&self) -> [Line; 3] {
        match self.role {
            Role::Primary => [self.notes_line(), self.status_line(), self.sampler_line()],
            Role::Peripheral => [self.status_line(), self.rx_line(), Line::new()],
        }
    }
}
