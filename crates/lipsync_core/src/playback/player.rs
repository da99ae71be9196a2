//! Audio player abstraction and a wall-clock implementation.

use std::time::Instant;

/// External audio player driving the preview.
///
/// Treated as a black box: the synchronizer only reads its position and
/// forwards transport commands.
pub trait AudioPlayer: Send {
    /// Current playback position in seconds.
    fn position(&self) -> f64;

    /// Total length in seconds, if known.
    fn duration(&self) -> Option<f64>;

    fn is_playing(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, position: f64);
}

/// Player that advances with the wall clock without producing sound.
///
/// Stops by itself when it reaches its duration.
#[derive(Debug, Clone)]
pub struct ClockPlayer {
    duration: Option<f64>,
    /// Position when playback last started or was seeked.
    base: f64,
    started: Option<Instant>,
    rate: f64,
}

impl ClockPlayer {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration,
            base: 0.0,
            started: None,
            rate: 1.0,
        }
    }

    /// Playback speed multiplier (1.0 = real time).
    pub fn with_rate(mut self, rate: f64) -> Self {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
        self
    }

    fn elapsed(&self) -> f64 {
        self.started
            .map_or(0.0, |started| started.elapsed().as_secs_f64() * self.rate)
    }

    fn clamp(&self, position: f64) -> f64 {
        let position = position.max(0.0);
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn reached_end(&self) -> bool {
        matches!(self.duration, Some(d) if self.base + self.elapsed() >= d)
    }
}

impl AudioPlayer for ClockPlayer {
    fn position(&self) -> f64 {
        self.clamp(self.base + self.elapsed())
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.started.is_some() && !self.reached_end()
    }

    fn play(&mut self) {
        if self.started.is_none() {
            if self.reached_end() {
                self.base = 0.0;
            }
            self.started = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.base = self.position();
        self.started = None;
    }

    fn seek(&mut self, position: f64) {
        self.base = self.clamp(position);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn paused_player_does_not_advance() {
        let mut player = ClockPlayer::new(Some(10.0));
        player.seek(2.0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(player.position(), 2.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn playing_player_advances_and_pauses() {
        let mut player = ClockPlayer::new(Some(10.0));
        player.play();
        thread::sleep(Duration::from_millis(20));
        player.pause();

        let position = player.position();
        assert!(position >= 0.02, "position {}", position);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(player.position(), position);
    }

    #[test]
    fn stops_at_duration() {
        let mut player = ClockPlayer::new(Some(0.01)).with_rate(4.0);
        player.play();
        thread::sleep(Duration::from_millis(20));
        assert!(!player.is_playing());
        assert_eq!(player.position(), 0.01);

        // Playing again after the end restarts from zero
        player.pause();
        player.play();
        assert!(player.position() < 0.01);
    }

    #[test]
    fn seek_is_clamped() {
        let mut player = ClockPlayer::new(Some(3.0));
        player.seek(-1.0);
        assert_eq!(player.position(), 0.0);
        player.seek(5.0);
        assert_eq!(player.position(), 3.0);
    }
}
