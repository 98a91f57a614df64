//! Per-voice rendering: resampling a source into the current pitch/tempo
//! ratio, looping, and note-off release.

use crate::channel::Channel;
use std::f64::consts::PI;
use std::sync::Arc;

/// Standard twelve-tone-equal-temperament frequency table indexed the same
/// way as the original sample banks: note 9 is A0 (13.75 Hz), note 57 is A4
/// (440 Hz).
pub fn frequency_for_note(note: i8) -> f64 {
    440.0 * 2f64.powf(f64::from(note - 57) / 12.0)
}

/// A single mono PCM sample bank entry. Decoding the sample's original
/// codec is out of scope; callers hand in already-decoded `f32` samples.
#[derive(Debug, Clone)]
pub struct SampleSource {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub base_note: i8,
    /// `0` means "no loop".
    pub loop_start: usize,
    pub loop_end: usize,
    pub constant_pitch: bool,
    pub freq_mult: f32,
    pub volume_mult: f32,
}

#[derive(Debug, Clone)]
enum Source {
    /// No sample could be located for this bank/instrument/note; rendered
    /// as silence (mirrors the original's `SilentVoice` fallback).
    Silent,
    Sampled {
        source: SampleSource,
        src_ratio: f64,
        offset: f64,
        loop_start_offset: f64,
        loop_end_offset: f64,
    },
}

/// One sounding note. Owned by a `Track`'s voice map; looks up its shared
/// `Channel` by id rather than holding a pointer to it, since Rust gives
/// the track sole ownership of both maps.
#[derive(Debug, Clone)]
pub struct Voice {
    pub note: i8,
    pub velocity: i8,
    pub channel_id: u8,
    decay_when_off: bool,
    note_off_decay_total: u32,
    /// `None` while the note is still held; `Some(remaining)` counts down
    /// to zero once `off()` is called.
    note_off_decay_remaining: Option<u32>,
    source: Source,
}

const DEFAULT_DECAY_SECONDS: f32 = 0.2;

impl Voice {
    pub fn silent(note: i8, velocity: i8, channel_id: u8, sample_rate: u32) -> Self {
        Self {
            note,
            velocity,
            channel_id,
            decay_when_off: true,
            note_off_decay_total: decay_frames(sample_rate, DEFAULT_DECAY_SECONDS),
            note_off_decay_remaining: None,
            source: Source::Silent,
        }
    }

    pub fn sampled(
        note: i8,
        velocity: i8,
        channel_id: u8,
        source: SampleSource,
        sample_rate: u32,
        decay_seconds: f32,
    ) -> Self {
        Self {
            note,
            velocity,
            channel_id,
            decay_when_off: true,
            note_off_decay_total: decay_frames(sample_rate, decay_seconds),
            note_off_decay_remaining: None,
            source: Source::Sampled {
                source,
                src_ratio: 1.0,
                offset: 0.0,
                loop_start_offset: 0.0,
                loop_end_offset: 0.0,
            },
        }
    }

    /// Begins the release: the voice keeps rendering for `decay_frames`
    /// more output frames and then reports [`Voice::off_complete`].
    pub fn off(&mut self) {
        self.note_off_decay_remaining = Some(self.note_off_decay_total);
    }

    pub fn off_complete(&self) -> bool {
        self.note_off_decay_remaining == Some(0)
    }

    /// Renders `count` stereo frames (interleaved L/R) at the track's
    /// current `freq_mult`, weighted by `channel` volume/pan and
    /// `volume_bias`. `output_sample_rate` is the mixer's own rate, used
    /// to stretch a source recorded at a different rate.
    ///
    /// Operates on local copies of the release-envelope state rather than
    /// calling back into `self` so the loop below can hold a mutable
    /// borrow of `self.source` for its whole body.
    pub fn render(
        &mut self,
        count: usize,
        channel: &Channel,
        freq_mult: f32,
        volume_bias: f32,
        output_sample_rate: u32,
    ) -> Vec<f32> {
        let decay_when_off = self.decay_when_off;
        let note_off_decay_total = self.note_off_decay_total;
        let mut remaining = self.note_off_decay_remaining;
        let note = self.note;
        let velocity = self.velocity;

        let mut advance = |remaining: &mut Option<u32>| -> f32 {
            if !decay_when_off {
                return 1.0;
            }
            match *remaining {
                None => 1.0,
                Some(0) => 0.0,
                Some(r) => {
                    *remaining = Some(r - 1);
                    r as f32 / note_off_decay_total as f32
                }
            }
        };

        let data = match &mut self.source {
            Source::Silent => {
                for _ in 0..count {
                    advance(&mut remaining);
                }
                vec![0.0; count * 2]
            }
            Source::Sampled {
                source,
                src_ratio,
                offset,
                loop_start_offset,
                loop_end_offset,
            } => {
                let sample_rate_factor = f64::from(output_sample_rate) / f64::from(source.sample_rate.max(1));
                let note_factor = if source.constant_pitch {
                    1.0
                } else {
                    frequency_for_note(source.base_note) / frequency_for_note(note)
                };
                let pitch_bend_factor = 2f64.powf(
                    f64::from(channel.pitch_bend) * f64::from(channel.pitch_bend_semitone_range) / 12.0,
                ) * f64::from(freq_mult);
                let new_ratio =
                    note_factor * sample_rate_factor / (f64::from(source.freq_mult) * pitch_bend_factor);
                *loop_start_offset = source.loop_start as f64 * new_ratio;
                *loop_end_offset = source.loop_end as f64 * new_ratio;
                *offset *= new_ratio / *src_ratio;
                *src_ratio = new_ratio;

                let vel_factor = f32::from(velocity) / 127.0;
                let mut data = vec![0.0f32; count * 2];
                let len = source.samples.len();
                for frame in data.chunks_exact_mut(2) {
                    if *offset < 0.0 || *offset as usize >= len {
                        break;
                    }
                    let off_factor = advance(&mut remaining);
                    let sample = source.samples[*offset as usize];
                    let weight = volume_bias * vel_factor * off_factor * channel.volume;
                    frame[0] = weight * (1.0 - channel.panning) * sample;
                    frame[1] = weight * channel.panning * sample;

                    *offset += 1.0;
                    if remaining.is_none() && *loop_end_offset > 0.0 && *offset > *loop_end_offset {
                        *offset = *loop_start_offset;
                    }
                }
                if *offset as usize >= len {
                    remaining = Some(0);
                }
                if source.volume_mult != 1.0 {
                    for s in &mut data {
                        *s *= source.volume_mult;
                    }
                }
                data
            }
        };
        self.note_off_decay_remaining = remaining;
        data
    }
}

fn decay_frames(sample_rate: u32, decay_seconds: f32) -> u32 {
    (f64::from(decay_seconds) * f64::from(sample_rate)).round() as u32
}

/// Unweighted sine tone fallback, matching the original's `SineVoice`
/// debug aid (used when `PLAY_MISSING_NOTES`-style behaviour is wanted
/// instead of silence). Kept as a free function rather than a `Source`
/// variant since it needs no per-voice state beyond a running phase.
pub fn render_sine(note: i8, velocity: i8, channel: &Channel, sample_rate: u32, offset: usize, count: usize) -> Vec<f32> {
    let frequency = frequency_for_note(note);
    let vel_factor = f64::from(velocity) / 127.0;
    let mut data = vec![0.0f32; count * 2];
    for (x, frame) in data.chunks_exact_mut(2).enumerate() {
        let phase = (2.0 * PI * frequency) / f64::from(sample_rate.max(1)) * (offset + x) as f64;
        let s = phase.sin();
        let weight = vel_factor * f64::from(channel.volume);
        frame[0] = (weight * f64::from(1.0 - channel.panning) * s) as f32;
        frame[1] = (weight * f64::from(channel.panning) * s) as f32;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440_hz() {
        assert!((frequency_for_note(57) - 440.0).abs() < 1e-6);
    }

    #[test]
    fn silent_voice_renders_zeros_and_tracks_release() {
        let mut v = Voice::silent(60, 100, 0, 44100);
        let channel = Channel::default();
        let data = v.render(4, &channel, 1.0, 1.0, 44100);
        assert_eq!(data, vec![0.0; 8]);
        v.off();
        assert!(!v.off_complete());
    }

    #[test]
    fn sampled_voice_loops_within_region() {
        let samples: Arc<[f32]> = Arc::from(vec![1.0, 2.0, 3.0, 4.0]);
        let source = SampleSource {
            samples,
            sample_rate: 44100,
            base_note: 60,
            loop_start: 1,
            loop_end: 3,
            constant_pitch: true,
            freq_mult: 1.0,
            volume_mult: 1.0,
        };
        let mut v = Voice::sampled(60, 127, 0, source, 44100, 0.2);
        let channel = Channel::default();
        let data = v.render(6, &channel, 1.0, 1.0, 44100);
        assert_eq!(data.len(), 12);
    }

    #[test]
    fn off_complete_reaches_true_after_decay_frames() {
        let mut v = Voice::silent(60, 100, 0, 10);
        v.off();
        let channel = Channel::default();
        for _ in 0..v.note_off_decay_total {
            v.render(1, &channel, 1.0, 1.0, 10);
        }
        assert!(v.off_complete());
    }
}
