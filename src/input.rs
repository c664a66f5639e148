use std::collections::HashSet;
use std::io;

use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use rand::Rng;
use tracing::{debug, warn};

use crate::audio::ClipPort;
use crate::events::KeyDirection;
use crate::timing::PressStateMachine;
use crate::{Error, Result};

const IGNORED_KEYS: [&str; 2] = ["num lock", "numlock"];

/// Routes raw key presses: player keys drive the note player, all other keys
/// play a randomly pitched clip.
pub struct KeyRouter {
    machine: PressStateMachine,
    clips: Option<Box<dyn ClipPort>>,
    player_keys: HashSet<String>,
    pressed: HashSet<String>,
}

impl KeyRouter {
    pub fn new(
        machine: PressStateMachine,
        clips: Option<Box<dyn ClipPort>>,
        player_keys: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            machine,
            clips,
            player_keys: player_keys.into_iter().collect(),
            pressed: HashSet::new(),
        }
    }

    pub fn machine(&self) -> &PressStateMachine {
        &self.machine
    }

    /// Auto-repeated downs and ups without a matching down are dropped.
    pub fn handle(&mut self, key: &str, direction: KeyDirection) -> Result<()> {
        if IGNORED_KEYS.contains(&key.to_lowercase().as_str()) {
            return Ok(());
        }
        let fresh = match direction {
            KeyDirection::Down => self.pressed.insert(key.to_string()),
            KeyDirection::Up => self.pressed.remove(key),
        };
        if !fresh {
            return Ok(());
        }

        if self.player_keys.contains(key) {
            return self.machine.on_key_event(key, direction);
        }
        if direction == KeyDirection::Down {
            if let Some(clips) = self.clips.as_mut() {
                let count = clips.variants();
                if count > 0 {
                    let variant = rand::thread_rng().gen_range(0..count);
                    debug!(key, variant, "clip");
                    clips.play(variant)?;
                }
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.machine.shutdown();
    }
}

/// Stable name for a terminal key, matching the names used in config files.
pub fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char(c) => c.to_lowercase().to_string(),
        KeyCode::Enter => "enter".into(),
        KeyCode::Tab => "tab".into(),
        KeyCode::Backspace => "backspace".into(),
        KeyCode::Delete => "delete".into(),
        KeyCode::Insert => "insert".into(),
        KeyCode::Esc => "esc".into(),
        KeyCode::Up => "up".into(),
        KeyCode::Down => "down".into(),
        KeyCode::Left => "left".into(),
        KeyCode::Right => "right".into(),
        KeyCode::Home => "home".into(),
        KeyCode::End => "end".into(),
        KeyCode::PageUp => "page up".into(),
        KeyCode::PageDown => "page down".into(),
        KeyCode::NumLock => "num lock".into(),
        KeyCode::F(n) => format!("f{n}"),
        _ => return None,
    };
    Some(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    Key(String, KeyDirection),
    Quit,
}

/// Raw-mode terminal key feed. Restores the terminal when dropped.
pub struct TerminalKeys {
    reports_release: bool,
    pending_up: Option<String>,
}

impl TerminalKeys {
    pub fn open() -> Result<Self> {
        let term_err = |e: io::Error| Error::Terminal(e.to_string());
        terminal::enable_raw_mode().map_err(term_err)?;

        let reports_release = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if reports_release {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )
            .map_err(term_err)?;
        } else {
            warn!("terminal does not report key releases; holding a key will not start autoplay");
        }

        Ok(Self {
            reports_release,
            pending_up: None,
        })
    }

    /// Blocks until the next key transition.
    pub fn next_input(&mut self) -> Result<KeyInput> {
        if let Some(key) = self.pending_up.take() {
            return Ok(KeyInput::Key(key, KeyDirection::Up));
        }
        loop {
            let Event::Key(key) = event::read().map_err(|e| Error::Terminal(e.to_string()))? else {
                continue;
            };
            if key.code == KeyCode::Esc {
                return Ok(KeyInput::Quit);
            }
            let Some(name) = key_name(key.code) else {
                continue;
            };
            match key.kind {
                KeyEventKind::Press => {
                    if !self.reports_release {
                        self.pending_up = Some(name.clone());
                    }
                    return Ok(KeyInput::Key(name, KeyDirection::Down));
                }
                KeyEventKind::Release => return Ok(KeyInput::Key(name, KeyDirection::Up)),
                KeyEventKind::Repeat => continue,
            }
        }
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if self.reports_release {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
    }
}
