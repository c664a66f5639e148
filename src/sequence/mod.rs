mod cursor;
mod source;

pub use cursor::{Cursor, SequenceCursor};
pub use source::{MemorySource, MidiFileSource, SequenceSource};

use crate::events::SequenceEvent;

/// Default MIDI tempo, in microseconds per quarter note.
pub const DEFAULT_TEMPO: u32 = 500_000;

#[derive(Debug, Clone, PartialEq)]
pub struct EventSequence {
    pub name: String,
    pub ticks_per_beat: u16,
    pub events: Vec<SequenceEvent>,
}

impl EventSequence {
    pub fn new(name: impl Into<String>, ticks_per_beat: u16, events: Vec<SequenceEvent>) -> Self {
        Self {
            name: name.into(),
            ticks_per_beat,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
