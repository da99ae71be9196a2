//! Cue and timeline data structures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::{TimelineError, TimelineResult};
use super::shape::MouthShape;

/// One mouth-shape interval, `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start time in seconds (inclusive).
    pub start: f64,
    /// End time in seconds (exclusive).
    pub end: f64,
    /// Mouth shape shown during the interval.
    pub shape: MouthShape,
}

impl Cue {
    /// Create a new cue.
    pub fn new(start: f64, end: f64, shape: MouthShape) -> Self {
        Self { start, end, shape }
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `time` falls inside `[start, end)`.
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }
}

/// Optional information carried by structured exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineMetadata {
    /// Sound file the cues were generated for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_file: Option<String>,
    /// Total duration of the sound file in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// File the timeline was parsed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

/// Ordered, non-overlapping sequence of cues for one audio file.
///
/// A timeline is validated on construction and never mutated afterwards;
/// share it with `Arc<Timeline>` and read it from any thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    cues: Vec<Cue>,
    metadata: TimelineMetadata,
}

impl Timeline {
    /// Build a timeline, checking the ordering invariants.
    ///
    /// Cues must have finite, non-negative times with `end > start`,
    /// must be sorted by start time and must not overlap. Gaps between
    /// cues are allowed.
    pub fn new(cues: Vec<Cue>) -> TimelineResult<Self> {
        validate(&cues)?;
        Ok(Self {
            cues,
            metadata: TimelineMetadata::default(),
        })
    }

    /// An empty timeline (silence-only input).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: TimelineMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn metadata(&self) -> &TimelineMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cue> {
        self.cues.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cue> {
        self.cues.iter()
    }

    /// End of the last cue, or the declared sound duration if longer.
    pub fn duration(&self) -> f64 {
        let last_end = self.cues.last().map(|c| c.end).unwrap_or(0.0);
        self.metadata
            .duration
            .map_or(last_end, |declared| declared.max(last_end))
    }

    /// Index of the cue active at `time`.
    ///
    /// Binary search over start times; returns `None` before the first
    /// cue, after the last one, inside a gap, or for a non-finite time.
    pub fn cue_index_at(&self, time: f64) -> Option<usize> {
        if !time.is_finite() {
            return None;
        }
        let after = self.cues.partition_point(|cue| cue.start <= time);
        let index = after.checked_sub(1)?;
        (time < self.cues[index].end).then_some(index)
    }

    /// Cue active at `time`.
    pub fn cue_at(&self, time: f64) -> Option<&Cue> {
        self.cue_index_at(time).map(|i| &self.cues[i])
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Cue;
    type IntoIter = std::slice::Iter<'a, Cue>;

    fn into_iter(self) -> Self::IntoIter {
        self.cues.iter()
    }
}

fn validate(cues: &[Cue]) -> TimelineResult<()> {
    let mut previous: Option<&Cue> = None;

    for (index, cue) in cues.iter().enumerate() {
        for value in [cue.start, cue.end] {
            if !value.is_finite() || value < 0.0 {
                return Err(TimelineError::InvalidTime { index, value });
            }
        }
        if cue.end <= cue.start {
            return Err(TimelineError::EmptyInterval {
                index,
                start: cue.start,
                end: cue.end,
            });
        }

        if let Some(prev) = previous {
            if cue.start < prev.start {
                return Err(TimelineError::OutOfOrder {
                    index,
                    previous_start: prev.start,
                    start: cue.start,
                });
            }
            if cue.start < prev.end {
                return Err(TimelineError::Overlap {
                    index,
                    previous_end: prev.end,
                    start: cue.start,
                });
            }
        }
        previous = Some(cue);
    }

    Ok(())
}
