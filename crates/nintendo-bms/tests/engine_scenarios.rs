//! Cross-cutting engine scenarios exercising the scheduler, opcode decoder,
//! and voice/channel state together rather than in isolation.

use nintendo_bms::{Engine, InstrumentSource, SampleSource};
use std::sync::Arc;

struct OneNoteBank {
    source: SampleSource,
}

impl InstrumentSource for OneNoteBank {
    fn sample_for(&self, _bank: u16, _instrument: u16, _note: u8, _velocity: u8) -> Option<SampleSource> {
        Some(self.source.clone())
    }
}

fn ramp_bank() -> OneNoteBank {
    let samples: Arc<[f32]> = Arc::from((0..64).map(|i| i as f32 / 64.0).collect::<Vec<_>>());
    OneNoteBank {
        source: SampleSource {
            samples,
            sample_rate: 44100,
            base_note: 60,
            loop_start: 0,
            loop_end: 63,
            constant_pitch: false,
            freq_mult: 1.0,
            volume_mult: 1.0,
        },
    }
}

#[test]
fn a_note_sounds_then_releases_and_the_engine_goes_idle() {
    // tempo=120, pulse_rate=48, bank/instrument select, note on, wait, voice off, wait, end.
    let program = vec![
        0xFE, 0x00, 120, // set_tempo
        0xFD, 0x00, 48, // set_pulse_rate
        0xE2, 0x00, // set_bank 0
        0xE3, 0x00, // set_instrument 0
        60, 0x01, 0x7F, // note_on note=60 voice=1 vel=127
        0x80, 0x02, // wait 2
        0x81, // voice_off voice 0
        0x80, 0x05, // wait 5, long enough for the release to finish
        0xFF,
    ];
    let bank = ramp_bank();
    let mut engine = Engine::new(program, 0, 44100);

    let mut pulses = 0;
    while engine.can_render() && pulses < 64 {
        engine.render_pulse(Some(&bank as &dyn InstrumentSource)).unwrap();
        pulses += 1;
    }

    assert!(!engine.can_render());
    assert!(engine.tracks()[0].voices.is_empty());
    assert!(engine.tracks()[0].voices_off.is_empty());
}

#[test]
fn a_subtrack_runs_concurrently_with_the_main_track() {
    let mut program = vec![
        0xFE, 0x00, 120, 0xFD, 0x00, 48, // tempo/pulse setup (6 bytes)
        0xC1, 9, 0x00, 0x00, 0x00, // start_track(id=9, offset=TBD) (5 bytes, offset at index 8..11)
        0x80, 0x01, // wait 1
        0xFF,
    ];
    let subtrack_offset = program.len();
    program[8] = ((subtrack_offset >> 16) & 0xFF) as u8;
    program[9] = ((subtrack_offset >> 8) & 0xFF) as u8;
    program[10] = (subtrack_offset & 0xFF) as u8;
    program.extend_from_slice(&[0x80, 0x03, 0xFF]); // subtrack: wait 3, end

    let mut engine = Engine::new(program, 0, 44100);
    engine.render_pulse(None).unwrap();
    assert_eq!(engine.tracks().len(), 2);
    assert_eq!(engine.tracks()[1].id, 9);
}

#[test]
fn muting_a_track_silences_its_output_without_stopping_playback() {
    let program = vec![
        0xFE, 0x00, 120, 0xFD, 0x00, 48, 0xE2, 0x00, 0xE3, 0x00, 60, 0x01, 0x7F, 0x80, 0x04, 0xFF,
    ];
    let bank = ramp_bank();
    let mut engine = Engine::new(program, 0, 44100);
    engine.mute(-1);
    let buf = engine.render_pulse(Some(&bank as &dyn InstrumentSource)).unwrap();
    assert!(buf.iter().all(|&s| s == 0.0));
}
