//! Orchestration facade for front-ends.
//!
//! A [`Session`] wires the pieces together: supervisor → parsers →
//! synchronizer → listeners. Front-ends subscribe once and receive
//! [`SessionEvent`]s for progress, terminal states, new timelines and
//! active-cue changes.

mod error;
mod events;
mod facade;

pub use error::{SessionError, SessionResult};
pub use events::{SessionEvent, SessionListener};
pub use facade::Session;
