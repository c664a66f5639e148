mod autoplay;
mod manual;

pub use autoplay::{AutoplayEngine, AutoplayWorker};
pub use manual::{ManualTrigger, TouchSettings, TriggeredNote};

use crate::Result;
use crate::events::{MidiMessage, SequenceEvent};
use crate::synth::SynthesizerPort;

/// Sends a control event (release or program change) straight to the synth.
/// Returns `false` for events that start a note.
fn forward_control(synth: &dyn SynthesizerPort, event: &SequenceEvent) -> Result<bool> {
    if let Some(pitch) = event.released() {
        synth.note_off(event.channel, pitch)?;
        return Ok(true);
    }
    if let MidiMessage::ProgramChange { program } = event.message {
        synth.program_select(event.channel, program)?;
        return Ok(true);
    }
    Ok(false)
}
