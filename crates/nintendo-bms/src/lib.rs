//! BMS sequence-program VM: a register-machine track interpreter over a
//! polyphonic voice mixer.
//!
//! [`opcode`] decodes the byte-coded instruction stream; [`track`] and
//! [`channel`] hold per-track and per-channel interpreter state; [`voice`]
//! renders a single sounding note; [`scheduler::Engine`] ties them together
//! into a min-heap of tracks scheduled by next wake-up pulse.

pub mod channel;
pub mod error;
pub mod opcode;
pub mod scheduler;
pub mod track;
pub mod voice;

pub use channel::Channel;
pub use error::BmsError;
pub use opcode::{decode, Op, PerfParam};
pub use scheduler::{Engine, InstrumentSource};
pub use track::Track;
pub use voice::{frequency_for_note, render_sine, SampleSource, Voice};
