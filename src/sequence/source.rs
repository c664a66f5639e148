use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use midly::{MetaMessage, Smf, Timing, TrackEventKind};

use super::{DEFAULT_TEMPO, EventSequence};
use crate::events::{MidiMessage, SequenceEvent};
use crate::{Error, Result};

pub trait SequenceSource {
    fn load(&self, id: &str) -> Result<EventSequence>;
}

/// Loads Standard MIDI Files relative to a directory.
pub struct MidiFileSource {
    dir: PathBuf,
}

impl MidiFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_of(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }
}

impl SequenceSource for MidiFileSource {
    fn load(&self, id: &str) -> Result<EventSequence> {
        let path = self.path_of(id);
        let data = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::sequence_load(id, format!("not found: {}", path.display())),
            _ => Error::sequence_load(id, e),
        })?;
        parse_smf(id, &data)
    }
}

enum Raw {
    Tempo(u32),
    Channel { channel: u8, message: MidiMessage },
}

/// Merges every track of `data` into one time-ordered sequence. Events with
/// equal ticks keep track order, then file order.
pub(crate) fn parse_smf(id: &str, data: &[u8]) -> Result<EventSequence> {
    let smf = Smf::parse(data).map_err(|e| Error::sequence_load(id, e))?;

    let mut raw: Vec<(u64, Raw)> = Vec::new();
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            let item = match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Raw::Tempo(tempo.as_int()),
                TrackEventKind::Midi { channel, message } => {
                    let message = match message {
                        midly::MidiMessage::NoteOn { key, vel } => MidiMessage::NoteOn {
                            pitch: key.as_int(),
                            velocity: vel.as_int(),
                        },
                        midly::MidiMessage::NoteOff { key, .. } => {
                            MidiMessage::NoteOff { pitch: key.as_int() }
                        }
                        midly::MidiMessage::ProgramChange { program } => {
                            MidiMessage::ProgramChange {
                                program: program.as_int(),
                            }
                        }
                        _ => continue,
                    };
                    Raw::Channel {
                        channel: channel.as_int(),
                        message,
                    }
                }
                _ => continue,
            };
            raw.push((tick, item));
        }
    }
    raw.sort_by_key(|(tick, _)| *tick);

    let clock = match smf.header.timing {
        Timing::Metrical(tpb) => Clock::Metrical {
            ticks_per_beat: tpb.as_int().max(1),
            tempo: DEFAULT_TEMPO,
        },
        Timing::Timecode(fps, subframes) => Clock::Timecode {
            ticks_per_second: (fps.as_f32() * subframes as f32).max(1.0),
        },
    };
    let ticks_per_beat = clock.ticks_per_beat();
    let mut clock = clock;

    let mut events = Vec::new();
    let mut last_tick = 0u64;
    let mut pending_ticks = 0u64;
    let mut pending = Duration::ZERO;
    for (tick, item) in raw {
        let delta = tick - last_tick;
        last_tick = tick;
        pending_ticks += delta;
        pending += clock.to_duration(delta);

        match item {
            Raw::Tempo(tempo) => clock.set_tempo(tempo),
            Raw::Channel { channel, message } => {
                let ticks = u32::try_from(pending_ticks).unwrap_or(u32::MAX);
                events.push(SequenceEvent::new(channel, message).after(ticks, pending));
                pending_ticks = 0;
                pending = Duration::ZERO;
            }
        }
    }

    Ok(EventSequence::new(id, ticks_per_beat, events))
}

#[derive(Clone, Copy)]
enum Clock {
    Metrical { ticks_per_beat: u16, tempo: u32 },
    Timecode { ticks_per_second: f32 },
}

impl Clock {
    fn ticks_per_beat(&self) -> u16 {
        match self {
            Clock::Metrical { ticks_per_beat, .. } => *ticks_per_beat,
            // A beat at the default tempo lasts half a second.
            Clock::Timecode { ticks_per_second } => {
                (ticks_per_second * DEFAULT_TEMPO as f32 / 1_000_000.0) as u16
            }
        }
    }

    fn set_tempo(&mut self, new_tempo: u32) {
        if let Clock::Metrical { tempo, .. } = self {
            *tempo = new_tempo;
        }
    }

    fn to_duration(&self, ticks: u64) -> Duration {
        if ticks == 0 {
            return Duration::ZERO;
        }
        match self {
            Clock::Metrical {
                ticks_per_beat,
                tempo,
            } => Duration::from_micros(ticks * *tempo as u64 / *ticks_per_beat as u64),
            Clock::Timecode { ticks_per_second } => {
                Duration::from_secs_f64(ticks as f64 / *ticks_per_second as f64)
            }
        }
    }
}

/// In-memory sequences keyed by name.
#[derive(Default)]
pub struct MemorySource {
    sequences: HashMap<String, EventSequence>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sequence: EventSequence) -> Self {
        self.insert(sequence);
        self
    }

    pub fn insert(&mut self, sequence: EventSequence) {
        self.sequences.insert(sequence.name.clone(), sequence);
    }
}

impl SequenceSource for MemorySource {
    fn load(&self, id: &str) -> Result<EventSequence> {
        self.sequences
            .get(id)
            .cloned()
            .ok_or_else(|| Error::sequence_load(id, "not found"))
    }
}
