pub mod audio;
pub mod config;
mod error;
pub mod events;
pub mod input;
pub mod playback;
pub mod sequence;
pub mod synth;
pub mod timing;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use events::{KeyDirection, MidiMessage, SequenceEvent};
pub use input::{KeyInput, KeyRouter, TerminalKeys};
pub use playback::{AutoplayEngine, ManualTrigger, TouchSettings};
pub use sequence::{EventSequence, MemorySource, MidiFileSource, SequenceCursor, SequenceSource};
pub use synth::{MidiOutSynth, SynthesizerPort};
pub use timing::{PlaybackMode, PressSettings, PressStateMachine};
