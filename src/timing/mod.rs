mod scheduler;
mod state_machine;

pub use scheduler::LongPressTimer;
pub use state_machine::{PlaybackMode, PressSettings, PressStateMachine};
