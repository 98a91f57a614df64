//! Core introspection traits shared by the PPC and BMS engines.
//!
//! This crate carries only the `Observable` query interface. The
//! cycle/bus/clock machinery from the wider emulator workspace does not
//! apply here — cycle-accurate timing is an explicit non-goal of both the
//! PPC interpreter and the BMS VM, which retire one instruction (or one
//! opcode) per step rather than ticking a master clock.

mod observable;

pub use observable::{Observable, Value};
