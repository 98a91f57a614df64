//! Per-channel performance parameters: volume, pitch-bend, reverb, panning,
//! each with an optional linear-envelope ramp.

use crate::opcode::PerfParam;
use emu_core::{Observable, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub pitch_bend_semitone_range: f32,

    pub volume: f32,
    pub volume_target: f32,
    pub volume_target_frames: u16,

    pub pitch_bend: f32,
    pub pitch_bend_target: f32,
    pub pitch_bend_target_frames: u16,

    pub reverb: f32,
    pub reverb_target: f32,
    pub reverb_target_frames: u16,

    pub panning: f32,
    pub panning_target: f32,
    pub panning_target_frames: u16,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            pitch_bend_semitone_range: 48.0,
            volume: 1.0,
            volume_target: 0.0,
            volume_target_frames: 0,
            pitch_bend: 0.0,
            pitch_bend_target: 0.0,
            pitch_bend_target_frames: 0,
            reverb: 0.0,
            reverb_target: 0.0,
            reverb_target_frames: 0,
            panning: 0.5,
            panning_target: 0.5,
            panning_target_frames: 0,
        }
    }
}

impl Channel {
    /// Sets a parameter immediately, cancelling any in-progress ramp.
    pub fn set_immediate(&mut self, param: PerfParam, value: f32) {
        match param {
            PerfParam::Volume => {
                self.volume = value;
                self.volume_target_frames = 0;
            }
            PerfParam::PitchBend => {
                self.pitch_bend = value;
                self.pitch_bend_target_frames = 0;
            }
            PerfParam::Reverb => {
                self.reverb = value;
                self.reverb_target_frames = 0;
            }
            PerfParam::Panning => {
                self.panning = value;
                self.panning_target_frames = 0;
            }
            PerfParam::Unknown(_) => {}
        }
    }

    /// Starts a linear ramp from the current value to `value` over
    /// `frames` calls to [`Channel::attenuate`].
    pub fn set_target(&mut self, param: PerfParam, value: f32, frames: u16) {
        match param {
            PerfParam::Volume => {
                self.volume_target = value;
                self.volume_target_frames = frames;
            }
            PerfParam::PitchBend => {
                self.pitch_bend_target = value;
                self.pitch_bend_target_frames = frames;
            }
            PerfParam::Reverb => {
                self.reverb_target = value;
                self.reverb_target_frames = frames;
            }
            PerfParam::Panning => {
                self.panning_target = value;
                self.panning_target_frames = frames;
            }
            PerfParam::Unknown(_) => {}
        }
    }

    /// Applies a `set_perf` opcode's decoded value, dispatching to an
    /// immediate set or a ramp depending on whether a duration was given.
    pub fn apply_perf(&mut self, param: PerfParam, value: f32, duration: u16) {
        if duration == 0 {
            self.set_immediate(param, value);
        } else {
            self.set_target(param, value, duration);
        }
    }

    /// Advances every in-progress ramp by one frame.
    pub fn attenuate(&mut self) {
        if self.volume_target_frames != 0 {
            self.volume += (self.volume_target - self.volume) / f32::from(self.volume_target_frames);
            self.volume_target_frames -= 1;
        }
        if self.pitch_bend_target_frames != 0 {
            self.pitch_bend +=
                (self.pitch_bend_target - self.pitch_bend) / f32::from(self.pitch_bend_target_frames);
            self.pitch_bend_target_frames -= 1;
        }
        if self.reverb_target_frames != 0 {
            self.reverb += (self.reverb_target - self.reverb) / f32::from(self.reverb_target_frames);
            self.reverb_target_frames -= 1;
        }
        if self.panning_target_frames != 0 {
            self.panning += (self.panning_target - self.panning) / f32::from(self.panning_target_frames);
            self.panning_target_frames -= 1;
        }
    }
}

const QUERY_PATHS: &[&str] = &["volume", "pitch_bend", "reverb", "panning"];

impl Observable for Channel {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "volume" => Some(Value::String(self.volume.to_string())),
            "pitch_bend" => Some(Value::String(self.pitch_bend.to_string())),
            "reverb" => Some(Value::String(self.reverb.to_string())),
            "panning" => Some(Value::String(self.panning.to_string())),
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
    fn attenuate_ramps_toward_target_and_decrements_frames() {
        let mut c = Channel { volume: 0.0, ..Channel::default() };
        c.set_target(PerfParam::Volume, 1.0, 4);
        c.attenuate();
        assert_eq!(c.volume, 0.25);
        assert_eq!(c.volume_target_frames, 3);
    }

    #[test]
    fn attenuate_reaches_target_exactly_after_remaining_frames() {
        let mut c = Channel { volume: 0.0, ..Channel::default() };
        c.set_target(PerfParam::Volume, 1.0, 4);
        for _ in 0..4 {
            c.attenuate();
        }
        assert_eq!(c.volume, 1.0);
        assert_eq!(c.volume_target_frames, 0);
    }

    #[test]
    fn immediate_set_clears_any_pending_ramp() {
        let mut c = Channel::default();
        c.set_target(PerfParam::Panning, 1.0, 10);
        c.set_immediate(PerfParam::Panning, 0.25);
        assert_eq!(c.panning, 0.25);
        assert_eq!(c.panning_target_frames, 0);
    }
}
