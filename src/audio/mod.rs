mod clips;

pub use clips::{ClipPort, CpalClipPlayer, PitchedClips, resample};
