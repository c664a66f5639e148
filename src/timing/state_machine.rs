use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::LongPressTimer;
use crate::Result;
use crate::events::KeyDirection;
use crate::playback::{AutoplayEngine, AutoplayWorker, ManualTrigger, TouchSettings};
use crate::sequence::SequenceCursor;
use crate::synth::SynthesizerPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Idle,
    Autoplaying,
}

#[derive(Debug, Clone)]
pub struct PressSettings {
    pub min_press_time: Duration,
    /// Upper bound on waiting for the autoplay worker after the last release.
    pub stop_timeout: Duration,
    /// Keys allowed to escalate into autoplay. `None` allows every key.
    pub autoplay_keys: Option<HashSet<String>>,
}

impl Default for PressSettings {
    fn default() -> Self {
        Self {
            min_press_time: Duration::from_millis(1500),
            stop_timeout: Duration::from_secs(1),
            autoplay_keys: None,
        }
    }
}

enum KeyPhase {
    Released,
    Pending { id: u64, timer: LongPressTimer },
    Held,
}

struct KeyState {
    phase: KeyPhase,
    /// Set when a release cancels a pending timer, so a timer that already
    /// elapsed cannot escalate the key afterwards.
    cancelled: bool,
}

impl Default for KeyState {
    fn default() -> Self {
        Self {
            phase: KeyPhase::Released,
            cancelled: false,
        }
    }
}

struct PressState {
    keys: HashMap<String, KeyState>,
    mode: PlaybackMode,
    worker: Option<AutoplayWorker>,
    /// A worker that missed its stop deadline and may still be sweeping.
    lagging: Option<AutoplayWorker>,
    next_timer: u64,
    autoplay_starts: usize,
}

impl PressState {
    fn held_keys(&self) -> Vec<String> {
        let mut held: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, s)| matches!(s.phase, KeyPhase::Held))
            .map(|(k, _)| k.clone())
            .collect();
        held.sort();
        held
    }

    fn stop_autoplay(&mut self, timeout: Duration) {
        self.mode = PlaybackMode::Idle;
        if let Some(mut worker) = self.worker.take() {
            if worker.stop(timeout) {
                debug!("autoplay stopped, all notes off");
            } else {
                self.lagging = Some(worker);
            }
        }
    }

    /// Waits for a worker that missed its stop deadline. Returns `false`
    /// while it is still running.
    fn settle_lagging(&mut self, timeout: Duration) -> bool {
        if let Some(worker) = self.lagging.as_mut() {
            if !worker.stop(timeout) {
                return false;
            }
        }
        self.lagging = None;
        true
    }
}

struct Core {
    state: Mutex<PressState>,
    settings: PressSettings,
    manual: ManualTrigger,
    autoplay: AutoplayEngine,
}

/// Arbitrates between manual notes and autoplay from raw key presses.
///
/// A key down always plays one manual note, unless that key is already
/// holding autoplay. Holding an eligible key for `min_press_time` adds it to
/// the held set and starts the single autoplay worker if none runs. Autoplay
/// stops once the held set becomes empty.
pub struct PressStateMachine {
    core: Option<Arc<Core>>,
}

impl PressStateMachine {
    /// Without a synthesizer the machine is inert and ignores every key.
    pub fn new(
        cursor: Arc<SequenceCursor>,
        synth: Option<Arc<dyn SynthesizerPort>>,
        settings: PressSettings,
        touch: TouchSettings,
    ) -> Self {
        let core = synth.map(|synth| {
            Arc::new(Core {
                state: Mutex::new(PressState {
                    keys: HashMap::new(),
                    mode: PlaybackMode::Idle,
                    worker: None,
                    lagging: None,
                    next_timer: 0,
                    autoplay_starts: 0,
                }),
                settings,
                manual: ManualTrigger::new(cursor.clone(), synth.clone(), touch),
                autoplay: AutoplayEngine::new(cursor, synth),
            })
        });
        if core.is_none() {
            warn!("no synthesizer available, key events will be ignored");
        }
        Self { core }
    }

    pub fn on_key_event(&self, key: &str, direction: KeyDirection) -> Result<()> {
        let Some(core) = &self.core else {
            debug!(key, ?direction, "synthesizer unavailable, ignoring key");
            return Ok(());
        };
        match direction {
            KeyDirection::Down => core.key_down(key),
            KeyDirection::Up => {
                core.key_up(key);
                Ok(())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.core.is_some()
    }

    pub fn mode(&self) -> PlaybackMode {
        self.core
            .as_ref()
            .map_or(PlaybackMode::Idle, |core| core.state.lock().mode)
    }

    pub fn held_keys(&self) -> Vec<String> {
        self.core
            .as_ref()
            .map_or_else(Vec::new, |core| core.state.lock().held_keys())
    }

    pub fn has_pending_timer(&self, key: &str) -> bool {
        self.core.as_ref().is_some_and(|core| {
            core.state
                .lock()
                .keys
                .get(key)
                .is_some_and(|s| matches!(s.phase, KeyPhase::Pending { .. }))
        })
    }

    /// How many times autoplay has been started.
    pub fn autoplay_starts(&self) -> usize {
        self.core
            .as_ref()
            .map_or(0, |core| core.state.lock().autoplay_starts)
    }

    /// Cancels every pending timer and stops autoplay.
    pub fn shutdown(&self) {
        if let Some(core) = &self.core {
            core.shutdown();
        }
    }
}

impl Drop for PressStateMachine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Core {
    fn eligible(&self, key: &str) -> bool {
        self.settings
            .autoplay_keys
            .as_ref()
            .is_none_or(|keys| keys.contains(key))
    }

    fn key_down(self: &Arc<Self>, key: &str) -> Result<()> {
        // Held for the whole press, touch included. Timer callbacks and
        // releases for other keys wait here, which keeps key phases and the
        // single worker consistent.
        let mut state = self.state.lock();
        let entry = state.keys.entry(key.to_string()).or_default();
        if entry.cancelled {
            debug!(key, "clearing stale cancellation");
            entry.cancelled = false;
        }
        let held = matches!(entry.phase, KeyPhase::Held);
        let pending = matches!(entry.phase, KeyPhase::Pending { .. });
        debug!(key, held, pending, mode = ?state.mode, "key down");

        let touched = if held { Ok(None) } else { self.manual.touch() };

        if self.eligible(key) && !held && !pending {
            let id = state.next_timer;
            state.next_timer += 1;

            let core = Arc::downgrade(self);
            let owned = key.to_string();
            let started = LongPressTimer::start(key, self.settings.min_press_time, move || {
                if let Some(core) = core.upgrade() {
                    core.long_press_elapsed(&owned, id);
                }
            });
            match started {
                Ok(timer) => {
                    debug!(key, "long-press timer started");
                    if let Some(entry) = state.keys.get_mut(key) {
                        entry.phase = KeyPhase::Pending { id, timer };
                    }
                }
                Err(e) => warn!(key, "could not start long-press timer: {e}"),
            }
        }

        touched.map(|_| ())
    }

    fn long_press_elapsed(&self, key: &str, id: u64) {
        let mut state = self.state.lock();
        let Some(entry) = state.keys.get_mut(key) else {
            return;
        };
        if entry.cancelled {
            debug!(key, "timer fired after release, ignoring");
            entry.cancelled = false;
            return;
        }
        if !matches!(entry.phase, KeyPhase::Pending { id: current, .. } if current == id) {
            debug!(key, "stale timer, ignoring");
            return;
        }
        entry.phase = KeyPhase::Held;
        debug!(key, held = ?state.held_keys(), "key held for autoplay");

        if state.mode == PlaybackMode::Idle {
            if !state.settle_lagging(self.settings.stop_timeout) {
                error!(key, "previous autoplay worker still running, not starting another");
                return;
            }
            match self.autoplay.spawn() {
                Ok(worker) => {
                    info!(key, "starting autoplay");
                    state.worker = Some(worker);
                    state.mode = PlaybackMode::Autoplaying;
                    state.autoplay_starts += 1;
                }
                Err(e) => error!(key, "could not start autoplay: {e}"),
            }
        }
    }

    fn key_up(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.keys.get_mut(key) {
            match std::mem::replace(&mut entry.phase, KeyPhase::Released) {
                KeyPhase::Pending { timer, .. } => {
                    timer.cancel();
                    entry.cancelled = true;
                    debug!(key, "long-press timer cancelled");
                }
                KeyPhase::Held => debug!(key, "key left autoplay"),
                KeyPhase::Released => {}
            }
            let forget = !entry.cancelled;
            if forget {
                state.keys.remove(key);
            }
        }

        let held = state.held_keys();
        debug!(key, ?held, "key up");
        // Stopping under the lock means no timer can spawn a second worker
        // before this one has finished its sweep or timed out.
        if held.is_empty() && state.mode == PlaybackMode::Autoplaying {
            info!("all keys released, stopping autoplay");
            state.stop_autoplay(self.settings.stop_timeout);
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        for (_, entry) in state.keys.drain() {
            if let KeyPhase::Pending { timer, .. } = entry.phase {
                timer.cancel();
            }
        }
        if state.mode == PlaybackMode::Autoplaying {
            state.stop_autoplay(self.settings.stop_timeout);
        }
        if !state.settle_lagging(self.settings.stop_timeout) {
            warn!("autoplay worker still running at shutdown, leaving it detached");
            state.lagging = None;
        }
    }
}
