use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load sequence {id}: {reason}")]
    SequenceLoad { id: String, reason: String },

    #[error("Playlist has no playable events")]
    EmptyPlaylist,

    #[error("Synthesizer error: {0}")]
    Synth(String),

    #[error("Synthesizer is not available")]
    SynthUnavailable,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio output error: {0}")]
    Audio(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn sequence_load(id: impl Into<String>, reason: impl ToString) -> Self {
        Error::SequenceLoad {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
