use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::playback::TouchSettings;
use crate::timing::PressSettings;
use crate::{Error, Result};

/// Everything the binary reads from its RON file. Times are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub playlist: Vec<String>,
    pub sequence_dir: PathBuf,
    /// Keys that may escalate into autoplay; `None` means all player keys.
    pub autoplay_keys: Option<Vec<String>>,
    /// Keys handled by the note player. Every other key plays a clip.
    pub player_keys: Vec<String>,
    pub min_press_time: f32,
    pub min_factor: f32,
    pub max_factor: f32,
    pub base_time: f32,
    pub floor_duration: f32,
    pub stop_timeout: f32,
    pub midi_port: Option<String>,
    pub bank: u8,
    pub clip: Option<PathBuf>,
    pub pitch_factors: Vec<f32>,
    pub clip_gain: f32,
    pub log_file: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            playlist: ["Beat.mid", "Beat3.mid", "Batman.mid", "Shreksophone.mid"]
                .into_iter()
                .map(String::from)
                .collect(),
            sequence_dir: PathBuf::from("."),
            autoplay_keys: None,
            player_keys: vec!["a".into(), "enter".into()],
            min_press_time: 1.5,
            min_factor: 0.7,
            max_factor: 1.3,
            base_time: 0.5,
            floor_duration: 0.05,
            stop_timeout: 1.0,
            midi_port: None,
            bank: 0,
            clip: Some(PathBuf::from("burp.wav")),
            pitch_factors: vec![0.9, 1.0, 1.1, 1.2],
            clip_gain: 1.0,
            log_file: None,
        }
    }
}

impl PlayerConfig {
    /// A missing file means defaults; an unreadable or invalid one is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: PlayerConfig =
            ron::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.playlist.is_empty() {
            return Err(Error::Config("playlist is empty".into()));
        }
        if !(self.min_factor > 0.0 && self.min_factor <= self.max_factor) {
            return Err(Error::Config(format!(
                "factors must satisfy 0 < min_factor <= max_factor (got {} and {})",
                self.min_factor, self.max_factor
            )));
        }
        let times = [
            ("min_press_time", self.min_press_time),
            ("base_time", self.base_time),
            ("floor_duration", self.floor_duration),
            ("stop_timeout", self.stop_timeout),
        ];
        for (name, value) in times {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{name} must be positive (got {value})")));
            }
            if Duration::try_from_secs_f32(value).is_err() {
                return Err(Error::Config(format!("{name} is too large (got {value})")));
            }
        }
        if self.pitch_factors.iter().any(|f| !(f.is_finite() && *f > 0.0)) {
            return Err(Error::Config("pitch factors must be positive".into()));
        }
        Ok(())
    }

    pub fn press_settings(&self) -> PressSettings {
        PressSettings {
            min_press_time: secs(self.min_press_time),
            stop_timeout: secs(self.stop_timeout),
            autoplay_keys: self
                .autoplay_keys
                .as_ref()
                .map(|keys| keys.iter().cloned().collect()),
        }
    }

    pub fn touch_settings(&self) -> TouchSettings {
        TouchSettings {
            base_time: secs(self.base_time),
            min_factor: self.min_factor,
            max_factor: self.max_factor,
            floor_duration: secs(self.floor_duration),
        }
    }
}

fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::MAX)
}
