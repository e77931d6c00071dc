//! Playback control
//!
//! - `state`: the session state machine
//! - `controller`: the actor that owns the session and drives the media stream
//! - `pipeline`: traits for the external decoder
//! - `test_pattern`: synthetic decoder for demos and tests

pub mod controller;
pub mod pipeline;
pub mod state;
pub mod test_pattern;
pub mod time_format;

pub use controller::{PlaybackController, PlaybackError};
pub use pipeline::{MediaError, MediaPipeline, MediaSource, MediaStream, PipelineContext, PipelineEvent, StreamStatus};
pub use state::{PlaybackSession, PlaybackSnapshot, PlaybackState, SessionOptions};
pub use test_pattern::TestPatternPipeline;
pub use time_format::{format_clock, time_update, TimeUpdate};
