use std::time::Duration;

/// General MIDI reserves channel 10 (index 9) for percussion.
pub const PERCUSSION_CHANNEL: u8 = 9;
pub const NUM_CHANNELS: u8 = 16;
pub const NUM_NOTES: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    ProgramChange { program: u8 },
}

/// One timed event of a sequence. `delta_ticks` and `delta` both measure the
/// distance from the previous event of the same sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceEvent {
    pub channel: u8,
    pub message: MidiMessage,
    pub delta_ticks: u32,
    pub delta: Duration,
}

impl SequenceEvent {
    pub fn new(channel: u8, message: MidiMessage) -> Self {
        Self {
            channel,
            message,
            delta_ticks: 0,
            delta: Duration::ZERO,
        }
    }

    pub fn note_on(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self::new(channel, MidiMessage::NoteOn { pitch, velocity })
    }

    pub fn note_off(channel: u8, pitch: u8) -> Self {
        Self::new(channel, MidiMessage::NoteOff { pitch })
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::new(channel, MidiMessage::ProgramChange { program })
    }

    pub fn after(mut self, delta_ticks: u32, delta: Duration) -> Self {
        self.delta_ticks = delta_ticks;
        self.delta = delta;
        self
    }

    /// Pitch and velocity of a note-on that actually sounds.
    pub fn struck(&self) -> Option<(u8, u8)> {
        match self.message {
            MidiMessage::NoteOn { pitch, velocity } if velocity > 0 => Some((pitch, velocity)),
            _ => None,
        }
    }

    /// Note-offs and zero-velocity note-ons both release a note.
    pub fn released(&self) -> Option<u8> {
        match self.message {
            MidiMessage::NoteOff { pitch } => Some(pitch),
            MidiMessage::NoteOn { pitch, velocity: 0 } => Some(pitch),
            _ => None,
        }
    }

    pub fn releases(&self, channel: u8, pitch: u8) -> bool {
        self.channel == channel && self.released() == Some(pitch)
    }

    pub fn is_percussion(&self) -> bool {
        self.channel == PERCUSSION_CHANNEL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Down,
    Up,
}
