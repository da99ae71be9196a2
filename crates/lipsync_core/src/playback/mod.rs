//! Preview playback: keeps the active mouth shape in step with audio.
//!
//! The [`Synchronizer`] owns the preview state machine
//! (`Idle → Loaded ⇄ Playing ⇄ Paused`, with transient `Seeking`) and
//! maps positions to cues. Positions come from an [`AudioPlayer`].

mod player;
mod synchronizer;

pub use player::{AudioPlayer, ClockPlayer};
pub use synchronizer::{
    ActiveCueChange, CueObserver, PlaybackError, PlaybackResult, PlaybackState, Synchronizer,
};
