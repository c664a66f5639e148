use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::forward_control;
use crate::Result;
use crate::sequence::SequenceCursor;
use crate::synth::SynthesizerPort;

#[derive(Debug, Clone, Copy)]
pub struct TouchSettings {
    pub base_time: Duration,
    pub min_factor: f32,
    pub max_factor: f32,
    pub floor_duration: Duration,
}

impl Default for TouchSettings {
    fn default() -> Self {
        Self {
            base_time: Duration::from_millis(500),
            min_factor: 0.7,
            max_factor: 1.3,
            floor_duration: Duration::from_millis(50),
        }
    }
}

impl TouchSettings {
    /// Hold time of a manual note. Deliberately independent of the sequence's
    /// own note length.
    pub fn note_duration<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let factor = if self.min_factor < self.max_factor {
            rng.gen_range(self.min_factor..=self.max_factor)
        } else {
            self.min_factor
        };
        let scaled = self.base_time.as_secs_f32() * factor.max(0.0);
        Duration::try_from_secs_f32(scaled)
            .unwrap_or(Duration::MAX)
            .max(self.floor_duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggeredNote {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub duration: Duration,
    /// Ticks until the sequence's own release of the note, or half a beat
    /// when the sequence ended first.
    pub scanned_ticks: u64,
}

pub struct ManualTrigger {
    cursor: Arc<SequenceCursor>,
    synth: Arc<dyn SynthesizerPort>,
    settings: TouchSettings,
}

impl ManualTrigger {
    pub fn new(
        cursor: Arc<SequenceCursor>,
        synth: Arc<dyn SynthesizerPort>,
        settings: TouchSettings,
    ) -> Self {
        Self {
            cursor,
            synth,
            settings,
        }
    }

    /// Plays the next melodic note of the shared sequence for a randomized
    /// duration. Releases and program changes met on the way are forwarded
    /// immediately. Returns `Ok(None)` after a whole playlist cycle without a
    /// playable note.
    ///
    /// The note-off is sent from a detached thread; the caller only waits for
    /// the cursor scan and the note-on.
    pub fn touch(&self) -> Result<Option<TriggeredNote>> {
        let mut budget = self.cursor.lock().cycle_len();
        while budget > 0 {
            budget -= 1;

            let mut cursor = self.cursor.lock();
            let event = cursor.next_event();
            let Some((pitch, velocity)) = event.struck() else {
                drop(cursor);
                forward_control(&*self.synth, &event)?;
                continue;
            };
            if event.is_percussion() {
                continue;
            }
            let scanned_ticks = cursor
                .scan_release(event.channel, pitch)
                .unwrap_or(cursor.ticks_per_beat() as u64 / 2);
            drop(cursor);

            let note = TriggeredNote {
                channel: event.channel,
                pitch,
                velocity,
                duration: self.settings.note_duration(&mut rand::thread_rng()),
                scanned_ticks,
            };
            self.play(note)?;
            debug!(
                pitch = note.pitch,
                velocity = note.velocity,
                channel = note.channel,
                duration = ?note.duration,
                "manual note"
            );
            return Ok(Some(note));
        }
        warn!("no playable note in a full playlist cycle");
        Ok(None)
    }

    fn play(&self, note: TriggeredNote) -> Result<()> {
        self.synth.note_on(note.channel, note.pitch, note.velocity)?;

        let synth = self.synth.clone();
        let spawned = thread::Builder::new()
            .name("note-off".into())
            .spawn(move || {
                thread::sleep(note.duration);
                if let Err(e) = synth.note_off(note.channel, note.pitch) {
                    warn!(pitch = note.pitch, channel = note.channel, "note-off failed: {e}");
                }
            });
        if let Err(e) = spawned {
            // No thread to release it later, so release it now.
            self.synth.note_off(note.channel, note.pitch)?;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SequenceEvent;
    use crate::sequence::EventSequence;
    use crate::synth::recording::{Call, RecordingSynth};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn trigger(events: Vec<SequenceEvent>, settings: TouchSettings) -> (ManualTrigger, Arc<RecordingSynth>) {
        let cursor = Arc::new(SequenceCursor::new(vec![EventSequence::new("s", 96, events)]).unwrap());
        let synth = Arc::new(RecordingSynth::default());
        (ManualTrigger::new(cursor, synth.clone(), settings), synth)
    }

    fn quick() -> TouchSettings {
        TouchSettings {
            base_time: Duration::from_millis(20),
            min_factor: 1.0,
            max_factor: 1.0,
            floor_duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn duration_stays_in_range() {
        let settings = TouchSettings::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let d = settings.note_duration(&mut rng);
            assert!(d >= Duration::from_millis(349), "{d:?}");
            assert!(d <= Duration::from_millis(651), "{d:?}");
        }
    }

    #[test]
    fn duration_respects_floor() {
        let settings = TouchSettings {
            base_time: Duration::from_millis(10),
            min_factor: 0.1,
            max_factor: 0.2,
            floor_duration: Duration::from_millis(50),
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(settings.note_duration(&mut rng), Duration::from_millis(50));
    }

    #[test]
    fn oversized_duration_saturates() {
        let settings = TouchSettings {
            base_time: Duration::from_secs(u64::MAX / 2),
            min_factor: 4.0,
            max_factor: 4.0,
            floor_duration: Duration::from_millis(50),
        };
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(settings.note_duration(&mut rng), Duration::MAX);
    }

    #[test]
    fn emits_balanced_pair() {
        let (trigger, synth) = trigger(
            vec![
                SequenceEvent::note_on(0, 60, 90),
                SequenceEvent::note_on(0, 62, 90),
                SequenceEvent::note_off(0, 60).after(48, Duration::ZERO),
            ],
            quick(),
        );
        let note = trigger.touch().unwrap().unwrap();
        assert_eq!((note.channel, note.pitch, note.velocity), (0, 60, 90));
        assert_eq!(note.scanned_ticks, 48);
        assert_eq!(
            synth.calls(),
            vec![Call::NoteOn { channel: 0, pitch: 60, velocity: 90 }]
        );

        thread::sleep(Duration::from_millis(150));
        let calls = synth.timed_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, Call::NoteOff { channel: 0, pitch: 60 });
        assert!(calls[1].0 - calls[0].0 >= Duration::from_millis(20));
    }

    #[test]
    fn skips_percussion_and_forwards_controls() {
        let (trigger, synth) = trigger(
            vec![
                SequenceEvent::program_change(1, 40),
                SequenceEvent::note_on(9, 36, 100),
                SequenceEvent::note_off(2, 50),
                SequenceEvent::note_on(1, 64, 70),
            ],
            quick(),
        );
        let note = trigger.touch().unwrap().unwrap();
        assert_eq!((note.channel, note.pitch), (1, 64));
        assert_eq!(note.scanned_ticks, 48);
        assert_eq!(
            synth.calls(),
            vec![
                Call::Program { channel: 1, program: 40 },
                Call::NoteOff { channel: 2, pitch: 50 },
                Call::NoteOn { channel: 1, pitch: 64, velocity: 70 },
            ]
        );
    }

    #[test]
    fn gives_up_after_a_cycle_without_notes() {
        let (trigger, synth) = trigger(
            vec![SequenceEvent::note_on(9, 36, 100), SequenceEvent::note_off(9, 36)],
            quick(),
        );
        assert_eq!(trigger.touch().unwrap(), None);
        assert!(synth.note_ons().is_empty());
    }

    #[test]
    fn surfaces_synth_failure() {
        let (trigger, synth) = trigger(vec![SequenceEvent::note_on(0, 60, 90)], quick());
        synth.fail_from_now();
        assert!(trigger.touch().is_err());
    }
}
