use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use keyplay::audio::{ClipPort, CpalClipPlayer};
use keyplay::{
    KeyInput, KeyRouter, MidiFileSource, MidiOutSynth, PlayerConfig, PressStateMachine,
    SequenceCursor, SynthesizerPort, TerminalKeys,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "keyplay.ron";

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> keyplay::Result<()> {
    let config_path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = PlayerConfig::load_or_default(&config_path)?;
    init_tracing(&config)?;

    let source = MidiFileSource::new(&config.sequence_dir);
    let cursor = Arc::new(SequenceCursor::load(&source, &config.playlist)?);

    let synth: Option<Arc<dyn SynthesizerPort>> =
        match MidiOutSynth::connect(config.midi_port.as_deref(), config.bank) {
            Ok(synth) => Some(Arc::new(synth)),
            Err(e) => {
                warn!("{e}; notes are disabled");
                None
            }
        };
    let machine = PressStateMachine::new(
        cursor,
        synth,
        config.press_settings(),
        config.touch_settings(),
    );

    let clips: Option<Box<dyn ClipPort>> = config.clip.as_ref().and_then(|path| {
        match CpalClipPlayer::open(path, &config.pitch_factors, config.clip_gain) {
            Ok(player) => Some(Box::new(player) as Box<dyn ClipPort>),
            Err(e) => {
                warn!("{e}; clips are disabled");
                None
            }
        }
    });

    let mut router = KeyRouter::new(machine, clips, config.player_keys.iter().cloned());
    let mut keys = TerminalKeys::open()?;
    info!("listening for keys (Esc to quit)");

    loop {
        match keys.next_input()? {
            KeyInput::Quit => break,
            KeyInput::Key(key, direction) => {
                if let Err(e) = router.handle(&key, direction) {
                    warn!(key = %key, ?direction, "{e}");
                }
            }
        }
    }

    router.shutdown();
    info!("bye");
    Ok(())
}

fn init_tracing(config: &PlayerConfig) -> keyplay::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keyplay=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &config.log_file {
        Some(path) => {
            let file = File::create(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
