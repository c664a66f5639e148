use std::sync::Arc;
use std::thread;
use std::time::Duration;

use keyplay::{
    EventSequence, KeyDirection, MemorySource, PlaybackMode, PressSettings, PressStateMachine,
    Result, SequenceCursor, SequenceEvent, SynthesizerPort, TouchSettings,
};
use parking_lot::Mutex;

const C4: u8 = 60;
const D4: u8 = 62;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    On(u8, u8),
    Off(u8, u8),
    Program(u8, u8),
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl SynthesizerPort for Recorder {
    fn note_on(&self, channel: u8, pitch: u8, _velocity: u8) -> Result<()> {
        self.calls.lock().push(Call::On(channel, pitch));
        Ok(())
    }

    fn note_off(&self, channel: u8, pitch: u8) -> Result<()> {
        self.calls.lock().push(Call::Off(channel, pitch));
        Ok(())
    }

    fn program_select(&self, channel: u8, program: u8) -> Result<()> {
        self.calls.lock().push(Call::Program(channel, program));
        Ok(())
    }
}

fn seq_a(step: Duration) -> EventSequence {
    EventSequence::new(
        "SeqA",
        480,
        vec![
            SequenceEvent::note_on(0, C4, 100).after(240, step),
            SequenceEvent::note_on(0, D4, 100).after(240, step),
            SequenceEvent::note_off(0, C4).after(240, step),
            SequenceEvent::note_off(0, D4).after(240, step),
        ],
    )
}

fn setup(min_press_time: Duration) -> (PressStateMachine, Arc<Recorder>) {
    let source = MemorySource::new().with(seq_a(Duration::from_millis(10)));
    let cursor = Arc::new(SequenceCursor::load(&source, &["SeqA".to_string()]).unwrap());
    let synth = Arc::new(Recorder::default());
    let machine = PressStateMachine::new(
        cursor,
        Some(synth.clone() as Arc<dyn SynthesizerPort>),
        PressSettings {
            min_press_time,
            ..PressSettings::default()
        },
        TouchSettings {
            base_time: Duration::from_millis(50),
            ..TouchSettings::default()
        },
    );
    (machine, synth)
}

#[test]
fn quick_tap_plays_one_c4() {
    let (machine, synth) = setup(Duration::from_millis(1500));

    machine.on_key_event("x", KeyDirection::Down).unwrap();
    thread::sleep(Duration::from_millis(20));
    machine.on_key_event("x", KeyDirection::Up).unwrap();
    thread::sleep(Duration::from_millis(200));

    assert_eq!(synth.calls(), vec![Call::On(0, C4), Call::Off(0, C4)]);
    assert_eq!(machine.mode(), PlaybackMode::Idle);
    assert_eq!(machine.autoplay_starts(), 0);
}

#[test]
fn long_hold_escalates_then_silences() {
    let (machine, synth) = setup(Duration::from_millis(150));

    machine.on_key_event("x", KeyDirection::Down).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(machine.mode(), PlaybackMode::Idle);

    thread::sleep(Duration::from_millis(150));
    assert_eq!(machine.mode(), PlaybackMode::Autoplaying);
    assert_eq!(machine.held_keys(), vec!["x"]);

    machine.on_key_event("x", KeyDirection::Up).unwrap();
    assert_eq!(machine.mode(), PlaybackMode::Idle);
    assert_eq!(machine.autoplay_starts(), 1);

    let calls = synth.calls();
    // Manual C4 and its release come first.
    assert_eq!(calls[0], Call::On(0, C4));
    assert!(calls.contains(&Call::Off(0, C4)));

    // The manual scan consumed up to C4's release, so autoplay picks up at D4's.
    let sweep_start = calls.len() - 16 * 128;
    let autoplayed = &calls[..sweep_start];
    assert!(autoplayed.contains(&Call::Off(0, D4)));

    let sweep = &calls[sweep_start..];
    for (i, call) in sweep.iter().enumerate() {
        let expected = Call::Off((i / 128) as u8, (i % 128) as u8);
        assert_eq!(*call, expected);
    }

    thread::sleep(Duration::from_millis(50));
    assert_eq!(synth.calls().len(), calls.len());
}
