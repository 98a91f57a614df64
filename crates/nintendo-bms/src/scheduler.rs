//! The BMS engine: a min-heap of tracks keyed by next wake-up pulse, each
//! track executing opcodes back-to-back until it hits a `wait` or ends.

use crate::error::BmsError;
use crate::opcode::Op;
use crate::track::Track;
use crate::voice::{SampleSource, Voice};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

/// Supplies decoded PCM for a (bank, instrument, note, velocity) triplet.
/// Sample-format decoding is out of scope for this VM; a host wires in its
/// own bank reader. Returning `None` renders the note as silence, matching
/// the original's `SilentVoice` fallback for a missing sample.
pub trait InstrumentSource {
    fn sample_for(&self, bank: u16, instrument: u16, note: u8, velocity: u8) -> Option<SampleSource>;
}

enum TrackAction {
    Continue,
    Waited(u64),
    Ended,
    StartedTrack(usize),
}

pub struct Engine {
    program: Arc<[u8]>,
    tracks: Vec<Track>,
    queue: BinaryHeap<Reverse<(u64, usize)>>,
    current_time: u64,
    tempo: u16,
    pulse_rate: u16,
    tempo_bias: f64,
    freq_bias: f32,
    volume_bias: f32,
    sample_rate: u32,
    mute_tracks: HashSet<i16>,
    solo_tracks: HashSet<i16>,
    disable_tracks: HashSet<i16>,
}

impl Engine {
    pub fn new(program: Vec<u8>, entry_offset: usize, sample_rate: u32) -> Self {
        let program: Arc<[u8]> = Arc::from(program);
        let mut tracks = Vec::new();
        tracks.push(Track::new(-1, entry_offset, 1.0));
        let mut queue = BinaryHeap::new();
        queue.push(Reverse((0u64, 0usize)));
        Self {
            program,
            tracks,
            queue,
            current_time: 0,
            tempo: 120,
            pulse_rate: 48,
            tempo_bias: 1.0,
            freq_bias: 1.0,
            volume_bias: 1.0,
            sample_rate,
            mute_tracks: HashSet::new(),
            solo_tracks: HashSet::new(),
            disable_tracks: HashSet::new(),
        }
    }

    pub fn set_tempo_bias(&mut self, bias: f64) {
        self.tempo_bias = bias;
    }

    pub fn set_freq_bias(&mut self, bias: f32) {
        self.freq_bias = bias;
        self.tracks[0].freq_mult = bias;
    }

    pub fn set_volume_bias(&mut self, bias: f32) {
        self.volume_bias = bias;
    }

    pub fn mute(&mut self, track_id: i16) {
        self.mute_tracks.insert(track_id);
    }

    pub fn solo(&mut self, track_id: i16) {
        self.solo_tracks.insert(track_id);
    }

    pub fn disable(&mut self, track_id: i16) {
        self.disable_tracks.insert(track_id);
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// True while any opcode is still pending or any voice (sounding or
    /// releasing) is still producing audio.
    pub fn can_render(&self) -> bool {
        if !self.queue.is_empty() {
            return true;
        }
        self.tracks.iter().any(|t| !t.voices.is_empty() || !t.voices_off.is_empty())
    }

    fn voice_on(&mut self, track_idx: usize, voice_id: u8, note: u8, velocity: u8, instruments: Option<&dyn InstrumentSource>) {
        let track = &mut self.tracks[track_idx];
        let channel_id = 0u8;
        let _ = track.channel_mut(channel_id);
        let voice = match (track.bank, track.instrument, instruments) {
            (Some(bank), Some(instrument), Some(src)) => {
                match src.sample_for(bank, instrument, note, velocity) {
                    Some(source) => Voice::sampled(note as i8, velocity as i8, channel_id, source, self.sample_rate, 0.2),
                    None => Voice::silent(note as i8, velocity as i8, channel_id, self.sample_rate),
                }
            }
            _ => Voice::silent(note as i8, velocity as i8, channel_id, self.sample_rate),
        };
        track.voices.insert(voice_id, voice);
    }

    fn execute_one(&mut self, track_idx: usize, instruments: Option<&dyn InstrumentSource>) -> Result<TrackAction, BmsError> {
        let program = Arc::clone(&self.program);
        let op = self.tracks[track_idx].decode_next(&program)?;
        match op {
            Op::NoteOn { note, voice, velocity } => {
                self.voice_on(track_idx, voice, note, velocity, instruments);
                Ok(TrackAction::Continue)
            }
            Op::Wait { pulses } => Ok(TrackAction::Waited(pulses)),
            Op::VoiceOff { voice } => {
                self.tracks[track_idx].voice_off(voice);
                Ok(TrackAction::Continue)
            }
            Op::SetPerf { param, value, duration } => {
                self.tracks[track_idx].channel_mut(0).apply_perf(param, value, duration);
                Ok(TrackAction::Continue)
            }
            Op::SetParam { param, value } => {
                let track = &mut self.tracks[track_idx];
                match param {
                    0x20 => track.bank = Some(value),
                    0x21 => track.instrument = Some(value),
                    // BMS reuses MIDI's [-0x2000, 0x2000) pitch-bend range but
                    // channel.pitch_bend is normalised to [-1, 1), hence *4.
                    0x07 => track.channel_mut(0).pitch_bend_semitone_range = f32::from(value) * 4.0,
                    _ => {}
                }
                Ok(TrackAction::Continue)
            }
            Op::SetBank(bank) => {
                self.tracks[track_idx].bank = Some(u16::from(bank));
                Ok(TrackAction::Continue)
            }
            Op::SetInstrument(instrument) => {
                self.tracks[track_idx].instrument = Some(u16::from(instrument));
                Ok(TrackAction::Continue)
            }
            Op::SetRegister { register, value } => {
                if register == 0x62 {
                    self.pulse_rate = value as u16;
                } else {
                    self.tracks[track_idx].registers[register as usize] = value;
                }
                Ok(TrackAction::Continue)
            }
            Op::StartTrack { track_id, offset } => {
                let allowed = (self.solo_tracks.is_empty() || self.solo_tracks.contains(&i16::from(track_id)))
                    && !self.disable_tracks.contains(&i16::from(track_id));
                if !allowed {
                    return Ok(TrackAction::Continue);
                }
                if offset >= program.len() {
                    return Err(BmsError::OffsetOutOfRange { from: self.tracks[track_idx].pos, target: offset });
                }
                self.tracks.push(Track::new(i16::from(track_id), offset, self.freq_bias));
                Ok(TrackAction::StartedTrack(self.tracks.len() - 1))
            }
            Op::Call { offset, conditional } => {
                if !conditional {
                    self.tracks[track_idx].call(program.len(), offset)?;
                }
                Ok(TrackAction::Continue)
            }
            Op::Jump { offset, conditional } => {
                if !conditional {
                    self.tracks[track_idx].jump(program.len(), offset)?;
                }
                Ok(TrackAction::Continue)
            }
            Op::Return { conditional } => {
                if !conditional {
                    self.tracks[track_idx].ret()?;
                }
                Ok(TrackAction::Continue)
            }
            Op::SyncGpu | Op::DebugString | Op::Unimplemented { .. } => Ok(TrackAction::Continue),
            Op::SetPulseRate(rate) => {
                self.pulse_rate = rate;
                Ok(TrackAction::Continue)
            }
            Op::SetTempo(tempo) => {
                self.tempo = (f64::from(tempo) * self.tempo_bias) as u16;
                Ok(TrackAction::Continue)
            }
            Op::TrackEnd => Ok(TrackAction::Ended),
        }
    }

    /// Executes every opcode due at `current_time`, then renders one
    /// pulse's worth of audio and advances `current_time` by one pulse.
    pub fn render_pulse(&mut self, instruments: Option<&dyn InstrumentSource>) -> Result<Vec<f32>, BmsError> {
        while let Some(Reverse((t, idx))) = self.queue.peek().copied() {
            if t != self.current_time {
                break;
            }
            self.queue.pop();
            loop {
                match self.execute_one(idx, instruments)? {
                    TrackAction::Continue => {}
                    TrackAction::Waited(pulses) => {
                        self.queue.push(Reverse((self.current_time + pulses, idx)));
                        break;
                    }
                    TrackAction::Ended => {
                        self.tracks[idx].finished = true;
                        break;
                    }
                    TrackAction::StartedTrack(new_idx) => {
                        self.queue.push(Reverse((self.current_time, new_idx)));
                    }
                }
            }
        }

        if self.tempo == 0 || self.pulse_rate == 0 || self.sample_rate == 0 {
            return Ok(Vec::new());
        }
        let usecs_per_qnote = 60_000_000u64 / u64::from(self.tempo);
        let usecs_per_pulse = usecs_per_qnote as f64 / f64::from(self.pulse_rate);
        let samples_per_pulse = ((usecs_per_pulse * f64::from(self.sample_rate)) / 1_000_000.0) as usize;

        let mut mix = vec![0.0f32; samples_per_pulse * 2];
        for track in &mut self.tracks {
            let muted = self.mute_tracks.contains(&track.id);
            let channels = &track.channels;
            let freq_mult = track.freq_mult;
            for voice in track.voices.values_mut().chain(track.voices_off.iter_mut()) {
                let channel = channels.get(&voice.channel_id).cloned().unwrap_or_default();
                let rendered = voice.render(samples_per_pulse, &channel, freq_mult, self.volume_bias, self.sample_rate);
                if !muted {
                    for (m, r) in mix.iter_mut().zip(rendered.iter()) {
                        *m += r;
                    }
                }
            }
            track.retire_finished_voices();
            track.attenuate_perf();
        }

        self.current_time += 1;
        Ok(mix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(ops: &[u8]) -> Vec<u8> {
        ops.to_vec()
    }

    #[test]
    fn engine_runs_until_track_end_and_stops_rendering() {
        // set tempo, set pulse rate, then end immediately.
        let program = assemble(&[
            0xFE, 0x00, 120, // set_tempo(120)
            0xFD, 0x00, 48, // set_pulse_rate(48)
            0xFF, // track end
        ]);
        let mut engine = Engine::new(program, 0, 44100);
        let buf = engine.render_pulse(None).unwrap();
        assert!(!buf.is_empty());
        assert!(!engine.can_render());
    }

    #[test]
    fn note_on_then_wait_produces_a_silent_voice_that_renders() {
        let program = assemble(&[
            0xFE, 0x00, 120, // tempo
            0xFD, 0x00, 48, // pulse rate
            60, 0x01, 0x7F, // note on: note=60, voice=1(->0), vel=127
            0x80, 0x01, // wait 1 pulse
            0xFF,
        ]);
        let mut engine = Engine::new(program, 0, 44100);
        engine.render_pulse(None).unwrap();
        assert_eq!(engine.tracks()[0].voices.len(), 1);
    }

    #[test]
    fn start_track_schedules_a_new_track_this_pulse() {
        let mut program = vec![
            0xFE, 0x00, 120, 0xFD, 0x00, 48, // tempo/pulse setup
            0xC1, 5, 0x00, 0x00, 0x00, // start_track(id=5, offset=0x00000B)
            0xFF,
        ];
        // patch the start offset to point right after this header (0x0B)
        let start_offset_pos = program.len() - 5;
        program[start_offset_pos + 2] = 0x0B;
        program.push(0xFF); // the new track immediately ends
        let mut engine = Engine::new(program, 0, 44100);
        engine.render_pulse(None).unwrap();
        assert_eq!(engine.tracks().len(), 2);
    }
}
