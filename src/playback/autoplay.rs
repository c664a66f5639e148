use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use super::forward_control;
use crate::Result;
use crate::events::SequenceEvent;
use crate::sequence::SequenceCursor;
use crate::synth::{SynthesizerPort, stop_all_notes};

/// Plays the shared sequence in the background at its own tempo.
pub struct AutoplayEngine {
    cursor: Arc<SequenceCursor>,
    synth: Arc<dyn SynthesizerPort>,
}

/// Handle to a running autoplay thread.
pub struct AutoplayWorker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl AutoplayEngine {
    pub fn new(cursor: Arc<SequenceCursor>, synth: Arc<dyn SynthesizerPort>) -> Self {
        Self { cursor, synth }
    }

    pub fn spawn(&self) -> Result<AutoplayWorker> {
        let (stop_tx, stop_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded(1);
        let cursor = self.cursor.clone();
        let synth = self.synth.clone();

        let handle = thread::Builder::new()
            .name("autoplay".into())
            .spawn(move || run(&cursor, synth, &stop_rx, done_tx))?;

        Ok(AutoplayWorker {
            stop_tx,
            done_rx,
            handle: Some(handle),
        })
    }
}

/// Silences every note and reports completion when the worker exits, even
/// by panic.
struct Silencer {
    synth: Arc<dyn SynthesizerPort>,
    done_tx: Sender<()>,
}

impl Drop for Silencer {
    fn drop(&mut self) {
        if let Err(e) = stop_all_notes(&*self.synth) {
            warn!("silencing after autoplay failed: {e}");
        }
        let _ = self.done_tx.try_send(());
    }
}

fn run(
    cursor: &SequenceCursor,
    synth: Arc<dyn SynthesizerPort>,
    stop_rx: &Receiver<()>,
    done_tx: Sender<()>,
) {
    let silencer = Silencer { synth, done_tx };
    debug!("autoplay worker started");

    loop {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        let event = cursor.next_event();
        if !event.delta.is_zero() {
            match stop_rx.recv_timeout(event.delta) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => {
                    // The event is already off the cursor. Releases and
                    // program changes still reach the synth; only a new
                    // note-on is dropped.
                    if let Err(e) = forward_control(&*silencer.synth, &event) {
                        warn!(?event, "autoplay event failed: {e}");
                    }
                    break;
                }
            }
        }

        if let Err(e) = play(&*silencer.synth, &event) {
            warn!(?event, "autoplay event failed: {e}");
        }
    }

    debug!("autoplay worker stopping");
}

fn play(synth: &dyn SynthesizerPort, event: &SequenceEvent) -> Result<()> {
    if forward_control(synth, event)? {
        return Ok(());
    }
    match event.struck() {
        Some((pitch, velocity)) if !event.is_percussion() => {
            synth.note_on(event.channel, pitch, velocity)
        }
        _ => Ok(()),
    }
}

impl AutoplayWorker {
    /// Signals the worker and waits up to `timeout` for it to finish its
    /// silence sweep. Returns `false` if it did not finish in time; the
    /// worker keeps running and `stop` may be called again.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        if self.handle.is_none() {
            return true;
        }
        let _ = self.stop_tx.try_send(());
        match self.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "autoplay worker did not stop in time");
                false
            }
            _ => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!("autoplay worker panicked");
                    }
                }
                true
            }
        }
    }
}

impl Drop for AutoplayWorker {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
    }
}
