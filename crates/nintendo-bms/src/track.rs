//! Per-track interpreter state: the opcode cursor, call stack, channel and
//! voice maps, and the 256 general registers `set_register` writes into.

use crate::channel::Channel;
use crate::error::BmsError;
use crate::opcode::{self, Op};
use crate::voice::Voice;
use emu_core::{Observable, Value};
use std::collections::HashMap;

pub struct Track {
    /// `-1` for the sequence's default track, matching the original
    /// renderer's convention for the entry point.
    pub id: i16,
    pub pos: usize,
    pub call_stack: Vec<usize>,
    pub channels: HashMap<u8, Channel>,
    pub freq_mult: f32,
    pub bank: Option<u16>,
    pub instrument: Option<u16>,
    pub voices: HashMap<u8, Voice>,
    pub voices_off: Vec<Voice>,
    pub registers: [i16; 256],
    /// Set once a `TrackEnd` opcode runs; the track is no longer rescheduled
    /// but is kept (not dropped) so any still-releasing voices keep playing.
    pub finished: bool,
}

impl Track {
    pub fn new(id: i16, start_offset: usize, freq_mult: f32) -> Self {
        Self {
            id,
            pos: start_offset,
            call_stack: Vec::new(),
            channels: HashMap::new(),
            freq_mult,
            bank: None,
            instrument: None,
            voices: HashMap::new(),
            voices_off: Vec::new(),
            registers: [0; 256],
            finished: false,
        }
    }

    pub fn channel_mut(&mut self, id: u8) -> &mut Channel {
        self.channels.entry(id).or_default()
    }

    /// Moves a sounding voice into release. Voices turned off for a
    /// nonexistent slot are silently ignored — bad looping sequences do
    /// this in practice.
    pub fn voice_off(&mut self, voice_id: u8) {
        if let Some(mut voice) = self.voices.remove(&voice_id) {
            voice.off();
            self.voices_off.push(voice);
        }
    }

    pub fn attenuate_perf(&mut self) {
        for channel in self.channels.values_mut() {
            channel.attenuate();
        }
    }

    /// Drops released voices whose decay has fully completed.
    pub fn retire_finished_voices(&mut self) {
        self.voices_off.retain(|v| !v.off_complete());
    }

    /// Decodes and returns the next opcode without executing it, advancing
    /// `self.pos` past it. The scheduler applies the opcode's effect
    /// (voices/channels/control flow may need to touch other tracks).
    pub fn decode_next(&mut self, program: &[u8]) -> Result<Op, BmsError> {
        opcode::decode(program, &mut self.pos)
    }

    pub fn jump(&mut self, program_len: usize, offset: usize) -> Result<(), BmsError> {
        if offset >= program_len {
            return Err(BmsError::OffsetOutOfRange { from: self.pos, target: offset });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn call(&mut self, program_len: usize, offset: usize) -> Result<(), BmsError> {
        let return_to = self.pos;
        self.jump(program_len, offset)?;
        self.call_stack.push(return_to);
        Ok(())
    }

    pub fn ret(&mut self) -> Result<(), BmsError> {
        let target = self
            .call_stack
            .pop()
            .ok_or(BmsError::EmptyCallStack { track_id: self.id })?;
        self.pos = target;
        Ok(())
    }
}

const QUERY_PATHS: &[&str] = &["pos", "bank", "instrument", "freq_mult", "voice_count"];

impl Observable for Track {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pos" => Some(Value::U32(self.pos as u32)),
            "bank" => self.bank.map(Into::into),
            "instrument" => self.instrument.map(Into::into),
            "freq_mult" => Some(Value::String(self.freq_mult.to_string())),
            "voice_count" => Some(Value::U8(self.voices.len() as u8)),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_off_moves_voice_into_release() {
        let mut t = Track::new(0, 0, 1.0);
        t.voices.insert(3, Voice::silent(60, 100, 0, 44100));
        t.voice_off(3);
        assert!(t.voices.is_empty());
        assert_eq!(t.voices_off.len(), 1);
    }

    #[test]
    fn voice_off_on_missing_slot_is_a_no_op() {
        let mut t = Track::new(0, 0, 1.0);
        t.voice_off(9);
        assert!(t.voices_off.is_empty());
    }

    #[test]
    fn call_then_return_restores_position() {
        let mut t = Track::new(0, 10, 1.0);
        t.call(100, 50).unwrap();
        assert_eq!(t.pos, 50);
        t.ret().unwrap();
        assert_eq!(t.pos, 10);
    }

    #[test]
    fn return_with_empty_call_stack_errors() {
        let mut t = Track::new(0, 0, 1.0);
        assert_eq!(t.ret(), Err(BmsError::EmptyCallStack { track_id: 0 }));
    }

    #[test]
    fn jump_out_of_range_errors() {
        let mut t = Track::new(0, 0, 1.0);
        assert_eq!(
            t.jump(16, 100),
            Err(BmsError::OffsetOutOfRange { from: 0, target: 100 })
        );
    }
}
