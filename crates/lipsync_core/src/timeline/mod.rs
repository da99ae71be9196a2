//! Canonical mouth-cue timeline.
//!
//! Every export format is normalized into a [`Timeline`]: an ordered,
//! non-overlapping sequence of [`Cue`]s. Construction validates the
//! ordering invariants so downstream code (the playback synchronizer in
//! particular) can rely on binary search.

mod error;
mod shape;
mod types;

pub use error::{TimelineError, TimelineResult};
pub use shape::{ExtendedShapes, MouthShape};
pub use types::{Cue, Timeline, TimelineMetadata};
