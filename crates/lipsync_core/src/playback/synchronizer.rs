//! Active-cue tracking against a playback position.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::timeline::{Cue, Timeline};

/// Synchronizer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No timeline attached.
    Idle,
    Loaded,
    Playing,
    Paused,
    /// Transient while a seek recomputes the active cue.
    Seeking,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loaded => "loaded",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Seeking => "seeking",
        };
        f.write_str(name)
    }
}

/// Errors from invalid synchronizer operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("No timeline loaded")]
    NoTimeline,

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: PlaybackState,
        action: &'static str,
    },

    #[error("Invalid playback position: {0}")]
    InvalidPosition(f64),
}

/// Result type for playback operations.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Notification that the active cue changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCueChange {
    /// Position that produced the change, in seconds.
    pub position: f64,
    /// Index of the new active cue in the timeline.
    pub index: Option<usize>,
    pub cue: Option<Cue>,
    pub previous: Option<Cue>,
}

/// Observer for active-cue changes.
pub type CueObserver = Box<dyn FnMut(&ActiveCueChange) + Send>;

/// Tracks which cue is active for the current playback position.
///
/// Fed by an external position source (an audio player) at arbitrary
/// intervals. Lookups are binary searches over the shared timeline;
/// observers hear only about changes of the active cue, so repeated
/// updates with the same position are idempotent.
pub struct Synchronizer {
    state: PlaybackState,
    timeline: Option<Arc<Timeline>>,
    position: f64,
    active: Option<usize>,
    observers: Vec<CueObserver>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            timeline: None,
            position: 0.0,
            active: None,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn timeline(&self) -> Option<&Arc<Timeline>> {
        self.timeline.as_ref()
    }

    /// Last position applied, in seconds.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_cue(&self) -> Option<Cue> {
        let timeline = self.timeline.as_ref()?;
        self.active.and_then(|i| timeline.get(i)).copied()
    }

    /// Register an observer for active-cue changes.
    pub fn subscribe(&mut self, observer: CueObserver) {
        self.observers.push(observer);
    }

    /// Attach a timeline and rewind to the start.
    ///
    /// Stops playback first when playing; the synchronizer ends up in
    /// `Loaded` either way.
    pub fn load(&mut self, timeline: Arc<Timeline>) -> Option<ActiveCueChange> {
        if self.state == PlaybackState::Playing {
            tracing::debug!("Stopping playback to load a new timeline");
        }

        let previous = self.active_cue();
        self.timeline = Some(timeline);
        self.state = PlaybackState::Loaded;
        self.position = 0.0;
        self.active = None;

        let change = self.recompute_from(previous, true);
        tracing::debug!(
            "Loaded timeline with {} cues",
            self.timeline.as_ref().map_or(0, |t| t.len())
        );
        change
    }

    /// Detach the timeline (→ `Idle`).
    pub fn unload(&mut self) -> Option<ActiveCueChange> {
        let previous = self.active_cue();
        self.timeline = None;
        self.state = PlaybackState::Idle;
        self.position = 0.0;
        self.active = None;

        previous.map(|previous| {
            let change = ActiveCueChange {
                position: 0.0,
                index: None,
                cue: None,
                previous: Some(previous),
            };
            self.notify(&change);
            change
        })
    }

    /// Loaded/Paused → Playing.
    pub fn play(&mut self) -> PlaybackResult<()> {
        match self.state {
            PlaybackState::Loaded | PlaybackState::Paused => {
                self.state = PlaybackState::Playing;
                Ok(())
            }
            PlaybackState::Playing => Ok(()),
            state => Err(self.invalid(state, "play")),
        }
    }

    /// Playing → Paused. The active cue is retained.
    pub fn pause(&mut self) -> PlaybackResult<()> {
        match self.state {
            PlaybackState::Playing => {
                self.state = PlaybackState::Paused;
                Ok(())
            }
            PlaybackState::Paused => Ok(()),
            state => Err(self.invalid(state, "pause")),
        }
    }

    /// Playing/Paused → Loaded, rewound to the start.
    pub fn stop(&mut self) -> PlaybackResult<Option<ActiveCueChange>> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Loaded => {
                self.state = PlaybackState::Loaded;
                self.position = 0.0;
                let previous = self.active_cue();
                Ok(self.recompute_from(previous, false))
            }
            state => Err(self.invalid(state, "stop")),
        }
    }

    /// Jump to `position` and recompute the active cue immediately.
    ///
    /// Passes through `Seeking` and returns to the state it started in.
    /// Negative and non-finite positions are rejected without any change.
    pub fn seek(&mut self, position: f64) -> PlaybackResult<Option<ActiveCueChange>> {
        if !position.is_finite() || position < 0.0 {
            return Err(PlaybackError::InvalidPosition(position));
        }

        let resume = match self.state {
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Loaded => self.state,
            PlaybackState::Idle => return Err(PlaybackError::NoTimeline),
            state => return Err(self.invalid(state, "seek")),
        };

        self.state = PlaybackState::Seeking;
        self.position = position;
        let previous = self.active_cue();
        let change = self.recompute_from(previous, false);
        self.state = resume;

        Ok(change)
    }

    /// Apply a position reported by the player.
    ///
    /// Only honored while `Playing`; otherwise ignored. Returns the change
    /// if the active cue moved.
    pub fn update_position(&mut self, position: f64) -> Option<ActiveCueChange> {
        if self.state != PlaybackState::Playing || !position.is_finite() {
            return None;
        }

        self.position = position.max(0.0);
        let previous = self.active_cue();
        self.recompute_from(previous, false)
    }

    /// Recompute the active cue for the current position.
    ///
    /// `reloaded` forces a notification whenever the old timeline had an
    /// active cue, since cue identity does not carry across loads.
    fn recompute_from(
        &mut self,
        previous: Option<Cue>,
        reloaded: bool,
    ) -> Option<ActiveCueChange> {
        let index = self
            .timeline
            .as_ref()
            .and_then(|t| t.cue_index_at(self.position));

        let changed = if reloaded {
            previous.is_some() || index.is_some()
        } else {
            index != self.active
        };
        self.active = index;

        if !changed {
            return None;
        }

        let change = ActiveCueChange {
            position: self.position,
            index,
            cue: self.active_cue(),
            previous,
        };
        tracing::trace!(
            "Active cue -> {:?} at {:.3}s",
            change.cue.map(|c| c.shape),
            self.position
        );
        self.notify(&change);
        Some(change)
    }

    fn notify(&mut self, change: &ActiveCueChange) {
        for observer in &mut self.observers {
            observer(change);
        }
    }

    fn invalid(&self, state: PlaybackState, action: &'static str) -> PlaybackError {
        if state == PlaybackState::Idle {
            PlaybackError::NoTimeline
        } else {
            PlaybackError::InvalidTransition { state, action }
        }
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("state", &self.state)
            .field("position", &self.position)
            .field("active", &self.active)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::MouthShape;
    use parking_lot::Mutex;

    fn timeline() -> Arc<Timeline> {
        Arc::new(
            Timeline::new(vec![
                Cue::new(0.0, 0.5, MouthShape::A),
                Cue::new(0.5, 1.0, MouthShape::B),
                Cue::new(1.0, 2.0, MouthShape::C),
                // gap 2.0 .. 2.5
                Cue::new(2.5, 3.0, MouthShape::X),
            ])
            .unwrap(),
        )
    }

    fn playing() -> Synchronizer {
        let mut sync = Synchronizer::new();
        sync.load(timeline());
        sync.play().unwrap();
        sync
    }

    fn shapes_at(sync: &mut Synchronizer, positions: &[f64]) -> Vec<Option<MouthShape>> {
        positions
            .iter()
            .map(|&t| {
                sync.seek(t).unwrap();
                sync.active_cue().map(|c| c.shape)
            })
            .collect()
    }

    #[test]
    fn starts_idle() {
        let mut sync = Synchronizer::new();
        assert_eq!(sync.state(), PlaybackState::Idle);
        assert_eq!(sync.play(), Err(PlaybackError::NoTimeline));
        assert_eq!(sync.seek(1.0), Err(PlaybackError::NoTimeline));
    }

    #[test]
    fn load_selects_cue_at_start() {
        let mut sync = Synchronizer::new();
        let change = sync.load(timeline()).unwrap();
        assert_eq!(sync.state(), PlaybackState::Loaded);
        assert_eq!(sync.active_index(), Some(0));
        assert_eq!(change.cue.map(|c| c.shape), Some(MouthShape::A));
        assert_eq!(change.previous, None);
    }

    #[test]
    fn reloading_same_cues_still_reports_change() {
        let mut sync = Synchronizer::new();
        sync.load(timeline());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        sync.subscribe(Box::new(move |change: &ActiveCueChange| {
            sink.lock().push(change.clone());
        }));

        // Same index, same cue, new timeline
        let change = sync.load(timeline()).unwrap();
        assert_eq!(change.index, Some(0));
        assert_eq!(change.previous, change.cue);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn boundary_belongs_to_next_cue() {
        let mut sync = playing();

        sync.update_position(1.0);
        assert_eq!(sync.active_cue().map(|c| c.shape), Some(MouthShape::C));

        sync.update_position(1.999);
        assert_eq!(sync.active_cue().map(|c| c.shape), Some(MouthShape::C));

        // End is exclusive, and 2.0 .. 2.5 is a gap
        sync.update_position(2.0);
        assert_eq!(sync.active_cue(), None);

        sync.update_position(3.5);
        assert_eq!(sync.active_cue(), None);
    }

    #[test]
    fn notifies_only_on_change() {
        let mut sync = playing();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        sync.subscribe(Box::new(move |change| {
            sink.lock().push(change.cue.map(|c| c.shape));
        }));

        assert!(sync.update_position(0.1).is_none());
        assert!(sync.update_position(0.2).is_none());
        assert!(sync.update_position(0.6).is_some());
        assert!(sync.update_position(0.6).is_none());
        assert!(sync.update_position(2.1).is_some());
        assert!(sync.update_position(2.2).is_none());

        assert_eq!(*seen.lock(), vec![Some(MouthShape::B), None]);
    }

    #[test]
    fn seeking_has_no_hysteresis() {
        let positions = [0.1, 0.7, 1.5, 2.2, 2.7, 3.2];

        let mut forward = playing();
        let expected = shapes_at(&mut forward, &positions);

        let mut scrubbed = playing();
        scrubbed.seek(3.0).unwrap();
        scrubbed.seek(0.0).unwrap();
        scrubbed.seek(2.9).unwrap();
        assert_eq!(shapes_at(&mut scrubbed, &positions), expected);
        assert_eq!(
            expected,
            vec![
                Some(MouthShape::A),
                Some(MouthShape::B),
                Some(MouthShape::C),
                None,
                Some(MouthShape::X),
                None
            ]
        );
    }

    #[test]
    fn seek_returns_to_previous_state() {
        let mut sync = playing();
        sync.pause().unwrap();

        let change = sync.seek(0.75).unwrap().unwrap();
        assert_eq!(change.cue.map(|c| c.shape), Some(MouthShape::B));
        assert_eq!(sync.state(), PlaybackState::Paused);

        sync.play().unwrap();
        sync.seek(1.5).unwrap();
        assert_eq!(sync.state(), PlaybackState::Playing);
    }

    #[test]
    fn position_updates_ignored_unless_playing() {
        let mut sync = playing();
        sync.update_position(0.7);
        sync.pause().unwrap();

        assert!(sync.update_position(1.5).is_none());
        assert_eq!(sync.active_cue().map(|c| c.shape), Some(MouthShape::B));
        assert_eq!(sync.position(), 0.7);
    }

    #[test]
    fn load_while_playing_stops_playback() {
        let mut sync = playing();
        sync.update_position(1.2);

        let next = Arc::new(Timeline::new(vec![Cue::new(0.0, 1.0, MouthShape::X)]).unwrap());
        let change = sync.load(next).unwrap();

        assert_eq!(sync.state(), PlaybackState::Loaded);
        assert_eq!(sync.position(), 0.0);
        assert_eq!(change.previous.map(|c| c.shape), Some(MouthShape::C));
        assert_eq!(change.cue.map(|c| c.shape), Some(MouthShape::X));
        assert!(sync.update_position(0.5).is_none());
    }

    #[test]
    fn empty_timeline_has_no_active_cue() {
        let mut sync = Synchronizer::new();
        assert!(sync.load(Arc::new(Timeline::empty())).is_none());
        sync.play().unwrap();
        assert!(sync.update_position(1.0).is_none());
        assert_eq!(sync.active_cue(), None);
    }

    #[test]
    fn stop_rewinds_and_unload_goes_idle() {
        let mut sync = playing();
        sync.update_position(1.5);

        let change = sync.stop().unwrap().unwrap();
        assert_eq!(change.cue.map(|c| c.shape), Some(MouthShape::A));
        assert_eq!(sync.state(), PlaybackState::Loaded);

        let change = sync.unload().unwrap();
        assert_eq!(change.cue, None);
        assert_eq!(sync.state(), PlaybackState::Idle);
        assert!(matches!(sync.pause(), Err(PlaybackError::NoTimeline)));
    }

    #[test]
    fn rejects_non_finite_seek() {
        let mut sync = playing();
        assert!(matches!(
            sync.seek(f64::NAN),
            Err(PlaybackError::InvalidPosition(_))
        ));
        assert_eq!(sync.state(), PlaybackState::Playing);
    }

    #[test]
    fn rejects_negative_seek() {
        let mut sync = playing();
        sync.seek(0.7).unwrap();
        let active = sync.active_index();

        match sync.seek(-1.0) {
            Err(PlaybackError::InvalidPosition(position)) => assert_eq!(position, -1.0),
            other => panic!("expected invalid position, got {:?}", other),
        }
        assert_eq!(sync.position(), 0.7);
        assert_eq!(sync.active_index(), active);
        assert_eq!(sync.state(), PlaybackState::Playing);
    }
}
