//! Synthetic media pipeline
//!
//! Produces equirectangular test frames on a background thread at a fixed
//! frame rate. The stream becomes ready after a short preroll, which lets the
//! autoplay path run without a real decoder.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::pipeline::{MediaError, MediaPipeline, MediaSource, MediaStream, PipelineContext, PipelineEvent, StreamStatus};
use crate::render::VideoFrame;

/// Configuration of generated streams
#[derive(Debug, Clone)]
pub struct TestPatternPipeline {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Seconds, `None` for a stream of unknown length
    pub duration: Option<f64>,
    /// Delay before the stream reports ready
    pub preroll: Duration,
}

impl Default for TestPatternPipeline {
    fn default() -> Self {
        Self {
            width: 512,
            height: 256,
            frame_rate: 30.0,
            duration: Some(30.0),
            preroll: Duration::from_millis(300),
        }
    }
}

impl TestPatternPipeline {
    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_preroll(mut self, preroll: Duration) -> Self {
        self.preroll = preroll;
        self
    }
}

impl MediaPipeline for TestPatternPipeline {
    fn open(&self, source: &MediaSource, ctx: PipelineContext) -> Result<Box<dyn MediaStream>, MediaError> {
        if self.width == 0 || self.height == 0 || !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(MediaError::OpenFailed {
                uri: source.uri().to_string(),
                reason: format!("invalid pattern {}x{} @ {}fps", self.width, self.height, self.frame_rate),
            });
        }

        tracing::info!(
            target: "immersive_360::playback",
            uri = source.uri(),
            width = self.width,
            height = self.height,
            fps = self.frame_rate,
            "Opening test pattern stream"
        );
        TestPatternStream::start(self.clone(), ctx).map(|s| Box::new(s) as Box<dyn MediaStream>)
    }
}

/// Shared state between generator thread and stream handle
struct SharedState {
    running: AtomicBool,
    ready: AtomicBool,
    playing: AtomicBool,
    /// f64 bits
    position: AtomicU64,
    seek_request: Mutex<Option<f64>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            position: AtomicU64::new(0f64.to_bits()),
            seek_request: Mutex::new(None),
        }
    }

    fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }

    fn set_position(&self, seconds: f64) {
        self.position.store(seconds.to_bits(), Ordering::Release);
    }

    fn take_seek(&self) -> Option<f64> {
        match self.seek_request.lock() {
            Ok(mut request) => request.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Stream handle returned by [`TestPatternPipeline`]
pub struct TestPatternStream {
    state: Arc<SharedState>,
    thread_handle: Option<JoinHandle<()>>,
    duration: f64,
}

impl TestPatternStream {
    fn start(config: TestPatternPipeline, ctx: PipelineContext) -> Result<Self, MediaError> {
        let state = Arc::new(SharedState::new());
        let thread_state = Arc::clone(&state);
        let duration = config.duration.unwrap_or(f64::NAN);

        let thread_handle = thread::Builder::new()
            .name("test-pattern".into())
            .spawn(move || generate_loop(thread_state, config, ctx))
            .map_err(|e| MediaError::OpenFailed {
                uri: "test-pattern".into(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            state,
            thread_handle: Some(thread_handle),
            duration,
        })
    }
}

fn generate_loop(state: Arc<SharedState>, config: TestPatternPipeline, ctx: PipelineContext) {
    let frame_duration = Duration::from_secs_f64(1.0 / config.frame_rate);
    let preroll_end = Instant::now() + config.preroll;

    // Preroll: publish the first frame, then wait until buffered
    ctx.frames.publish(pattern_frame(&config, 0.0, 0));
    while state.running.load(Ordering::Acquire) && Instant::now() < preroll_end {
        thread::sleep(Duration::from_millis(10));
    }
    state.ready.store(true, Ordering::Release);

    let mut frame_index: u64 = 1;
    let mut next_frame_time = Instant::now();

    while state.running.load(Ordering::Acquire) {
        if let Some(target) = state.take_seek() {
            state.set_position(target);
            ctx.frames.publish(pattern_frame(&config, target, frame_index));
            frame_index += 1;
        }

        if !state.playing.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(10));
            next_frame_time = Instant::now();
            continue;
        }

        let now = Instant::now();
        if now < next_frame_time {
            thread::sleep(next_frame_time - now);
            continue;
        }

        let position = state.position() + frame_duration.as_secs_f64();
        if let Some(total) = config.duration {
            if position >= total {
                state.set_position(total);
                state.playing.store(false, Ordering::Release);
                tracing::debug!(target: "immersive_360::playback", "Test pattern reached end of stream");
                if ctx.events.send(PipelineEvent::EndOfStream).is_err() {
                    break;
                }
                continue;
            }
        }

        state.set_position(position);
        ctx.frames.publish(pattern_frame(&config, position, frame_index));
        frame_index += 1;

        next_frame_time += frame_duration;
        // Fell behind: resync instead of bursting
        let now = Instant::now();
        if next_frame_time < now {
            next_frame_time = now;
        }
    }
}

/// Longitude/latitude gradient with a vertical band that sweeps once per second
fn pattern_frame(config: &TestPatternPipeline, pts: f64, frame_index: u64) -> VideoFrame {
    let (width, height) = (config.width, config.height);
    let band = ((pts.fract() * width as f64) as u32).min(width - 1);
    let (max_x, max_y) = (width.saturating_sub(1).max(1), height.saturating_sub(1).max(1));
    let mut data = Vec::with_capacity(VideoFrame::expected_size(width, height));

    for y in 0..height {
        let g = (y * 255 / max_y) as u8;
        for x in 0..width {
            let r = (x * 255 / max_x) as u8;
            // Grid lines every 30 degrees of longitude
            let grid = x % (width / 12).max(1) == 0;
            let b = if x.abs_diff(band) < 2 || grid { 255 } else { 64 };
            data.extend_from_slice(&[r, g, b, 255]);
        }
    }

    VideoFrame::new(data, width, height, pts, frame_index)
}

impl MediaStream for TestPatternStream {
    fn status(&self) -> StreamStatus {
        let ready = self.state.ready.load(Ordering::Acquire);
        StreamStatus {
            ready_to_play: ready,
            likely_to_keep_up: ready,
            is_playing: self.state.playing.load(Ordering::Acquire),
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn position(&self) -> f64 {
        self.state.position()
    }

    fn play(&mut self) {
        self.state.playing.store(true, Ordering::Release);
    }

    fn pause(&mut self) {
        self.state.playing.store(false, Ordering::Release);
    }

    fn seek(&mut self, seconds: f64) {
        // Visible to position() immediately so time updates reflect the jump
        self.state.set_position(seconds);
        match self.state.seek_request.lock() {
            Ok(mut request) => *request = Some(seconds),
            Err(poisoned) => *poisoned.into_inner() = Some(seconds),
        }
    }

    fn close(&mut self) {
        self.state.running.store(false, Ordering::Release);
        self.state.playing.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(target: "immersive_360::playback", "Failed to join test pattern thread: {:?}", e);
            }
        }
    }
}

impl Drop for TestPatternStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FrameSlot;
    use tokio::sync::mpsc;

    fn open(pipeline: &TestPatternPipeline) -> (Box<dyn MediaStream>, Arc<FrameSlot>, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let frames = Arc::new(FrameSlot::new());
        let ctx = PipelineContext {
            events,
            frames: Arc::clone(&frames),
        };
        let stream = pipeline
            .open(&MediaSource::parse("test://pattern").unwrap(), ctx)
            .unwrap();
        (stream, frames, rx)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_pattern_frame_is_valid() {
        let config = TestPatternPipeline {
            width: 64,
            height: 32,
            ..Default::default()
        };
        let frame = pattern_frame(&config, 0.5, 3);
        assert!(frame.is_valid());
        assert_eq!(frame.frame_index, 3);
    }

    #[test]
    fn test_stream_becomes_ready_after_preroll() {
        let pipeline = TestPatternPipeline {
            width: 16,
            height: 8,
            ..Default::default()
        }
        .with_preroll(Duration::from_millis(20));
        let (mut stream, frames, _rx) = open(&pipeline);

        assert!(wait_until(|| stream.status().can_autoplay()));
        assert!(frames.acquire().is_some());
        assert_eq!(stream.duration(), 30.0);
        stream.close();
        stream.close();
    }

    #[test]
    fn test_stream_reports_end_of_stream() {
        let pipeline = TestPatternPipeline {
            width: 16,
            height: 8,
            frame_rate: 200.0,
            duration: Some(0.05),
            preroll: Duration::ZERO,
        };
        let (mut stream, _frames, mut rx) = open(&pipeline);
        stream.play();

        assert!(wait_until(|| matches!(rx.try_recv(), Ok(PipelineEvent::EndOfStream))));
        assert!(!stream.status().is_playing);
        assert_eq!(stream.position(), 0.05);
    }

    #[test]
    fn test_seek_moves_position() {
        let pipeline = TestPatternPipeline {
            width: 16,
            height: 8,
            ..Default::default()
        };
        let (mut stream, _frames, _rx) = open(&pipeline);
        stream.seek(12.0);
        assert_eq!(stream.position(), 12.0);
    }

    #[test]
    fn test_invalid_pattern_fails_to_open() {
        let pipeline = TestPatternPipeline {
            width: 0,
            ..Default::default()
        };
        let (events, _rx) = mpsc::unbounded_channel();
        let ctx = PipelineContext {
            events,
            frames: Arc::new(FrameSlot::new()),
        };
        let result = pipeline.open(&MediaSource::parse("test://pattern").unwrap(), ctx);
        assert!(matches!(result, Err(MediaError::OpenFailed { .. })));
    }
}
