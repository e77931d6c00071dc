//! Media pipeline interface
//!
//! The decoder lives outside the engine. A [`MediaPipeline`] opens a
//! [`MediaStream`] for a source; the stream pushes decoded frames into the
//! frame slot and reports end of stream through the event channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::render::FrameSlot;

/// Errors raised by media pipelines
#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    #[error("media source is empty")]
    EmptySource,
    #[error("failed to open {uri}: {reason}")]
    OpenFailed { uri: String, reason: String },
}

/// Location of the media to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    uri: String,
}

impl MediaSource {
    pub fn parse(uri: &str) -> Result<Self, MediaError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(MediaError::EmptySource);
        }
        Ok(Self { uri: uri.to_string() })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl std::fmt::Display for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Asynchronous notifications from an open stream
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Playback reached the end of the media
    EndOfStream,
    /// Decoding failed; the stream stopped
    Failed(String),
}

/// Buffering state of a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub ready_to_play: bool,
    /// Enough is buffered to play without stalling
    pub likely_to_keep_up: bool,
    pub is_playing: bool,
}

impl StreamStatus {
    /// Ready, buffered and not already playing
    pub fn can_autoplay(&self) -> bool {
        self.ready_to_play && self.likely_to_keep_up && !self.is_playing
    }
}

/// Channels handed to a stream on open
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub events: mpsc::UnboundedSender<PipelineEvent>,
    pub frames: Arc<FrameSlot>,
}

/// External decoder
pub trait MediaPipeline: Send + Sync {
    fn open(&self, source: &MediaSource, ctx: PipelineContext) -> Result<Box<dyn MediaStream>, MediaError>;
}

/// An open media stream. Calls must not block on decode I/O.
pub trait MediaStream: Send {
    fn status(&self) -> StreamStatus;

    /// Total duration in seconds, NaN while unknown
    fn duration(&self) -> f64;

    /// Current position in seconds
    fn position(&self) -> f64;

    fn play(&mut self);

    fn pause(&mut self);

    /// Request a seek; takes effect asynchronously
    fn seek(&mut self, seconds: f64);

    /// Stop decoding and release resources. Must be safe to call twice.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        let source = MediaSource::parse("  https://example.com/360.mp4 ").unwrap();
        assert_eq!(source.uri(), "https://example.com/360.mp4");
        assert_eq!(source.to_string(), "https://example.com/360.mp4");
        assert!(matches!(MediaSource::parse("   "), Err(MediaError::EmptySource)));
    }

    #[test]
    fn test_can_autoplay() {
        let mut status = StreamStatus {
            ready_to_play: true,
            likely_to_keep_up: true,
            is_playing: false,
        };
        assert!(status.can_autoplay());
        status.is_playing = true;
        assert!(!status.can_autoplay());
        status = StreamStatus {
            ready_to_play: true,
            ..StreamStatus::default()
        };
        assert!(!status.can_autoplay());
    }
}
