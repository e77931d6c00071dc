//! Playback session state machine
//!
//! Pure transition logic. The controller applies the returned effects to the
//! media stream.

use serde::Serialize;

use super::pipeline::MediaSource;
use crate::viewport::Viewport;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    /// No session
    #[default]
    Idle,
    /// Media opened, not yet started
    Ready,
    Playing,
    Paused,
    /// Reached the end without looping
    Ended,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Ended => "ended",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options supplied with `init`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub autoplay: bool,
    pub loop_enabled: bool,
    pub viewport: Viewport,
}

/// Observable copy of the session, published after every change
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    /// Seconds
    pub current_time: f64,
    /// Seconds, NaN while unknown
    pub total_duration: f64,
    pub loop_enabled: bool,
    pub autoplay: bool,
    pub viewport: Option<Viewport>,
    pub session_open: bool,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            current_time: 0.0,
            total_duration: f64::NAN,
            loop_enabled: false,
            autoplay: false,
            viewport: None,
            session_open: false,
        }
    }
}

/// What the stream must do after `play`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayEffect {
    /// Start or resume from the current position
    Resume,
    /// Seek to zero, then start
    Restart,
    /// Already playing
    None,
}

/// What the stream must do after end of stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndEffect {
    /// Seek to zero and keep playing
    Loop,
    /// Stay at the end
    Stop,
    /// Not playing, event is stale
    Ignore,
}

/// An open playback session
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    source: MediaSource,
    state: PlaybackState,
    current_time: f64,
    total_duration: f64,
    options: SessionOptions,
}

impl PlaybackSession {
    /// Session for freshly opened media, in `Ready` at time zero
    pub fn new(source: MediaSource, options: SessionOptions) -> Self {
        Self {
            source,
            state: PlaybackState::Ready,
            current_time: 0.0,
            total_duration: f64::NAN,
            options,
        }
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Clamp to [0, total]; only the lower bound applies while the total is unknown
    pub fn clamp_time(&self, seconds: f64) -> f64 {
        let lower = seconds.max(0.0);
        if self.total_duration.is_finite() {
            lower.min(self.total_duration)
        } else {
            lower
        }
    }

    fn at_end(&self) -> bool {
        self.total_duration.is_finite() && self.current_time >= self.total_duration
    }

    pub fn play(&mut self) -> PlayEffect {
        match self.state {
            PlaybackState::Ready | PlaybackState::Paused => {
                self.state = PlaybackState::Playing;
                PlayEffect::Resume
            }
            PlaybackState::Ended if self.at_end() => {
                self.state = PlaybackState::Playing;
                self.current_time = 0.0;
                PlayEffect::Restart
            }
            PlaybackState::Ended => {
                self.state = PlaybackState::Playing;
                PlayEffect::Resume
            }
            PlaybackState::Playing | PlaybackState::Idle => PlayEffect::None,
        }
    }

    /// Returns true if playback was halted
    pub fn pause(&mut self) -> bool {
        if self.state.is_playing() {
            self.state = PlaybackState::Paused;
            true
        } else {
            false
        }
    }

    /// Move to `seconds`, clamped. Returns the target to seek the stream to.
    pub fn jump_to(&mut self, seconds: f64) -> f64 {
        self.current_time = self.clamp_time(seconds);
        self.current_time
    }

    /// Target for a relative seek
    pub fn seek_target(&self, delta: f64) -> f64 {
        self.clamp_time(self.current_time + delta)
    }

    pub fn end_of_stream(&mut self) -> EndEffect {
        if !self.state.is_playing() {
            return EndEffect::Ignore;
        }
        if self.options.loop_enabled {
            self.current_time = 0.0;
            EndEffect::Loop
        } else {
            self.state = PlaybackState::Ended;
            if self.total_duration.is_finite() {
                self.current_time = self.total_duration;
            }
            EndEffect::Stop
        }
    }

    /// Take position and duration reported by the stream
    pub fn sync(&mut self, position: f64, duration: f64) {
        self.total_duration = if duration.is_finite() && duration >= 0.0 {
            duration
        } else {
            f64::NAN
        };
        if position.is_finite() {
            self.current_time = self.clamp_time(position);
        } else {
            self.current_time = self.clamp_time(self.current_time);
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            current_time: self.current_time,
            total_duration: self.total_duration,
            loop_enabled: self.options.loop_enabled,
            autoplay: self.options.autoplay,
            viewport: Some(self.options.viewport),
            session_open: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(loop_enabled: bool) -> PlaybackSession {
        let mut session = PlaybackSession::new(
            MediaSource::parse("test://pattern").unwrap(),
            SessionOptions {
                autoplay: false,
                loop_enabled,
                viewport: Viewport::new(300.0, 300.0).unwrap(),
            },
        );
        session.sync(0.0, 120.0);
        session
    }

    #[test]
    fn test_new_session_is_ready_at_zero() {
        let session = session(false);
        assert_eq!(session.state(), PlaybackState::Ready);
        assert_eq!(session.current_time(), 0.0);
        assert!(session.snapshot().session_open);
    }

    #[test]
    fn test_play_pause_transitions() {
        let mut session = session(false);
        assert_eq!(session.play(), PlayEffect::Resume);
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(session.play(), PlayEffect::None);

        assert!(session.pause());
        assert_eq!(session.state(), PlaybackState::Paused);
        assert!(!session.pause());

        assert_eq!(session.play(), PlayEffect::Resume);
    }

    #[test]
    fn test_pause_from_ready_is_noop() {
        let mut session = session(false);
        assert!(!session.pause());
        assert_eq!(session.state(), PlaybackState::Ready);
    }

    #[test]
    fn test_jump_to_is_clamped() {
        let mut session = session(false);
        assert_eq!(session.jump_to(-10.0), 0.0);
        assert_eq!(session.jump_to(500.0), 120.0);
        assert_eq!(session.jump_to(42.5), 42.5);
    }

    #[test]
    fn test_clamp_with_unknown_total() {
        let mut session = session(false);
        session.sync(0.0, f64::NAN);
        assert_eq!(session.jump_to(-1.0), 0.0);
        assert_eq!(session.jump_to(9_999.0), 9_999.0);
    }

    #[test]
    fn test_seek_target_is_relative() {
        let mut session = session(false);
        session.jump_to(30.0);
        assert_eq!(session.seek_target(15.0), 45.0);
        assert_eq!(session.seek_target(-60.0), 0.0);
        assert_eq!(session.seek_target(200.0), 120.0);
    }

    #[test]
    fn test_end_without_loop_ends() {
        let mut session = session(false);
        session.play();
        assert_eq!(session.end_of_stream(), EndEffect::Stop);
        assert_eq!(session.state(), PlaybackState::Ended);
        assert_eq!(session.current_time(), 120.0);

        // Playing again starts over
        assert_eq!(session.play(), PlayEffect::Restart);
        assert_eq!(session.current_time(), 0.0);
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_end_with_loop_keeps_playing() {
        let mut session = session(true);
        session.play();
        session.jump_to(119.0);
        assert_eq!(session.end_of_stream(), EndEffect::Loop);
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(session.current_time(), 0.0);
    }

    #[test]
    fn test_jump_after_end_resumes_from_target() {
        let mut session = session(false);
        session.play();
        session.end_of_stream();
        session.jump_to(10.0);
        assert_eq!(session.state(), PlaybackState::Ended);
        assert_eq!(session.play(), PlayEffect::Resume);
        assert_eq!(session.current_time(), 10.0);
    }

    #[test]
    fn test_stale_end_is_ignored() {
        let mut session = session(false);
        assert_eq!(session.end_of_stream(), EndEffect::Ignore);
        assert_eq!(session.state(), PlaybackState::Ready);
    }

    #[test]
    fn test_sync_clamps_position() {
        let mut session = session(false);
        session.sync(130.0, 120.0);
        assert_eq!(session.current_time(), 120.0);
        session.sync(f64::NAN, 120.0);
        assert_eq!(session.current_time(), 120.0);
        session.sync(5.0, -1.0);
        assert!(session.total_duration().is_nan());
        assert_eq!(session.current_time(), 5.0);
    }
}
