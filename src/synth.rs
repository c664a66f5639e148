use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::info;

use crate::events::{NUM_CHANNELS, NUM_NOTES};
use crate::{Error, Result};

/// Note-level control of an external synthesizer. Implementations must be
/// callable from several threads at once.
pub trait SynthesizerPort: Send + Sync {
    fn note_on(&self, channel: u8, pitch: u8, velocity: u8) -> Result<()>;
    fn note_off(&self, channel: u8, pitch: u8) -> Result<()>;
    fn program_select(&self, channel: u8, program: u8) -> Result<()>;
}

/// Sends a note-off for every note on every channel. Keeps going after a
/// failed call and reports the first failure.
pub fn stop_all_notes(synth: &dyn SynthesizerPort) -> Result<()> {
    let mut first_err = None;
    for channel in 0..NUM_CHANNELS {
        for pitch in 0..NUM_NOTES {
            if let Err(e) = synth.note_off(channel, pitch) {
                first_err.get_or_insert(e);
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Drives any synthesizer reachable through a MIDI output port.
pub struct MidiOutSynth {
    conn: Mutex<MidiOutputConnection>,
    bank: u8,
}

impl MidiOutSynth {
    /// Connects to the first output port whose name contains `port_hint`, or
    /// to the first port when no hint is given.
    pub fn connect(port_hint: Option<&str>, bank: u8) -> Result<Self> {
        let midi_out = MidiOutput::new("keyplay").map_err(|e| Error::Synth(e.to_string()))?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| match port_hint {
                Some(hint) => midi_out.port_name(p).unwrap_or_default().contains(hint),
                None => true,
            })
            .ok_or(Error::SynthUnavailable)?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let conn = midi_out
            .connect(port, "keyplay-out")
            .map_err(|e| Error::Synth(e.to_string()))?;
        info!(port = %name, "connected to MIDI output");

        let synth = Self {
            conn: Mutex::new(conn),
            bank,
        };
        synth.program_select(0, 0)?;
        Ok(synth)
    }

    fn send(&self, message: &[u8]) -> Result<()> {
        self.conn
            .lock()
            .send(message)
            .map_err(|e| Error::Synth(e.to_string()))
    }
}

impl SynthesizerPort for MidiOutSynth {
    fn note_on(&self, channel: u8, pitch: u8, velocity: u8) -> Result<()> {
        self.send(&[0x90 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F])
    }

    fn note_off(&self, channel: u8, pitch: u8) -> Result<()> {
        self.send(&[0x80 | (channel & 0x0F), pitch & 0x7F, 0])
    }

    fn program_select(&self, channel: u8, program: u8) -> Result<()> {
        let channel = channel & 0x0F;
        if self.bank != 0 {
            self.send(&[0xB0 | channel, 0x00, self.bank & 0x7F])?;
        }
        self.send(&[0xC0 | channel, program & 0x7F])
    }
}
