//! Display-rate render thread
//!
//! Each tick reads the playback snapshot and the orientation snapshot and asks
//! the renderer to draw. Ticks missed because a render overran are skipped
//! rather than queued. A paused session redraws only when the view changes or
//! a seek publishes a new frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::Quat;
use tokio::sync::watch;

use super::frame::VideoFrame;
use super::frame_slot::FrameSlot;
use super::renderer::FrameRenderer;
use crate::orientation::OrientationReader;
use crate::playback::PlaybackSnapshot;
use crate::telemetry::{FrameProfiler, FrameStats, RenderCounters, RenderStats};
use crate::viewport::Viewport;

/// Everything the render thread reads
#[derive(Clone)]
pub struct RenderInputs {
    pub playback: watch::Receiver<PlaybackSnapshot>,
    pub orientation: OrientationReader,
    pub frames: Arc<FrameSlot>,
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    /// Nothing changed since the last draw
    Unchanged,
    /// No viewport or no frame yet
    NothingToDraw,
    Failed,
}

/// Per-thread render state, advanced once per tick
pub struct RenderTicker {
    renderer: Box<dyn FrameRenderer>,
    inputs: RenderInputs,
    stats: Arc<RenderStats>,
    current: Option<Arc<VideoFrame>>,
    last_drawn: Option<(Quat, Viewport)>,
}

impl RenderTicker {
    pub fn new(renderer: Box<dyn FrameRenderer>, inputs: RenderInputs, stats: Arc<RenderStats>) -> Self {
        Self {
            renderer,
            inputs,
            stats,
            current: None,
            last_drawn: None,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        let snapshot = self.inputs.playback.borrow().clone();
        let Some(viewport) = snapshot.viewport.filter(|_| snapshot.session_open) else {
            return TickOutcome::NothingToDraw;
        };

        // Paused sessions still pick up frames published by a seek
        let mut new_frame = false;
        if snapshot.state.is_playing() || self.current.is_none() || self.inputs.frames.has_pending() {
            if let Some(acquired) = self.inputs.frames.acquire() {
                new_frame = acquired.is_new;
                self.current = Some(acquired.frame);
            }
        }

        let Some(frame) = self.current.as_ref() else {
            return TickOutcome::NothingToDraw;
        };

        let view = self.inputs.orientation.current_view();
        if !new_frame && self.last_drawn == Some((view, viewport)) {
            return TickOutcome::Unchanged;
        }

        match self.renderer.render_frame(frame, view, viewport) {
            Ok(()) => {
                self.last_drawn = Some((view, viewport));
                self.stats.record_rendered();
                TickOutcome::Rendered
            }
            Err(e) => {
                self.stats.record_error();
                tracing::warn!(target: "immersive_360::render", error = %e, "Frame render failed");
                TickOutcome::Failed
            }
        }
    }
}

/// Advance the tick deadline past `now`, returning how many ticks were missed
pub(crate) fn catch_up(next_tick: Instant, now: Instant, interval: Duration) -> (Instant, u64) {
    if now < next_tick || interval.is_zero() {
        return (next_tick, 0);
    }
    let behind = now - next_tick;
    let interval_nanos = interval.as_nanos();
    let missed = u64::try_from(behind.as_nanos() / interval_nanos)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    // Remainder is below one interval
    let into_tick = Duration::from_nanos((behind.as_nanos() % interval_nanos) as u64);
    (now + (interval - into_tick), missed)
}

/// Background render thread driving a [`FrameRenderer`]
pub struct RenderLoop {
    running: Arc<AtomicBool>,
    stats: Arc<RenderStats>,
    profiler: Arc<Mutex<FrameProfiler>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl RenderLoop {
    pub fn spawn(
        renderer: Box<dyn FrameRenderer>,
        inputs: RenderInputs,
        tick_interval: Duration,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(RenderStats::default());
        let profiler = Arc::new(Mutex::new(FrameProfiler::new()));

        let mut ticker = RenderTicker::new(renderer, inputs, Arc::clone(&stats));
        let thread_running = Arc::clone(&running);
        let thread_stats = Arc::clone(&stats);
        let thread_profiler = Arc::clone(&profiler);

        let handle = thread::Builder::new().name("render".into()).spawn(move || {
            tracing::debug!(
                target: "immersive_360::render",
                interval_ms = tick_interval.as_secs_f64() * 1000.0,
                "Render loop started"
            );
            let mut next_tick = Instant::now();

            while thread_running.load(Ordering::Acquire) {
                let now = Instant::now();
                if now < next_tick {
                    thread::sleep(next_tick - now);
                    continue;
                }

                let start = Instant::now();
                if ticker.tick() == TickOutcome::Rendered {
                    if let Ok(mut profiler) = thread_profiler.lock() {
                        profiler.record(start, start.elapsed());
                    }
                }

                next_tick += tick_interval;
                let (caught_up, missed) = catch_up(next_tick, Instant::now(), tick_interval);
                if missed > 0 {
                    thread_stats.record_skipped(missed);
                    tracing::trace!(target: "immersive_360::render", missed, "Render overran tick budget");
                }
                next_tick = caught_up;
            }

            tracing::debug!(target: "immersive_360::render", "Render loop stopped");
        })?;

        Ok(Self {
            running,
            stats,
            profiler,
            thread_handle: Some(handle),
        })
    }

    /// Signal the thread to stop and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(target: "immersive_360::render", "Failed to join render thread: {:?}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    pub fn counters(&self) -> RenderCounters {
        self.stats.counters()
    }

    pub fn frame_stats(&self) -> FrameStats {
        match self.profiler.lock() {
            Ok(profiler) => profiler.stats(),
            Err(poisoned) => poisoned.into_inner().stats(),
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::OrientationTracker;
    use crate::playback::PlaybackState;
    use crate::render::RenderError;
    use crate::settings::{OrientationSettings, RenderSettings};

    #[derive(Default)]
    struct Recorded {
        frames: Vec<u64>,
        views: Vec<Quat>,
    }

    struct RecordingRenderer(Arc<Mutex<Recorded>>);

    impl FrameRenderer for RecordingRenderer {
        fn render_frame(&mut self, frame: &VideoFrame, view: Quat, _viewport: Viewport) -> Result<(), RenderError> {
            let mut recorded = self.0.lock().unwrap();
            recorded.frames.push(frame.frame_index);
            recorded.views.push(view);
            Ok(())
        }
    }

    struct Harness {
        ticker: RenderTicker,
        recorded: Arc<Mutex<Recorded>>,
        playback: watch::Sender<PlaybackSnapshot>,
        tracker: OrientationTracker,
        frames: Arc<FrameSlot>,
        stats: Arc<RenderStats>,
    }

    fn harness() -> Harness {
        let tracker = OrientationTracker::new(&OrientationSettings::default(), &RenderSettings::default());
        tracker.set_viewport(Viewport::new(300.0, 300.0).unwrap());
        let (playback, rx) = watch::channel(PlaybackSnapshot {
            state: PlaybackState::Ready,
            session_open: true,
            viewport: Viewport::new(300.0, 300.0),
            ..PlaybackSnapshot::default()
        });
        let frames = Arc::new(FrameSlot::new());
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let stats = Arc::new(RenderStats::default());
        let inputs = RenderInputs {
            playback: rx,
            orientation: tracker.reader(),
            frames: Arc::clone(&frames),
        };
        Harness {
            ticker: RenderTicker::new(
                Box::new(RecordingRenderer(Arc::clone(&recorded))),
                inputs,
                Arc::clone(&stats),
            ),
            recorded,
            playback,
            tracker,
            frames,
            stats,
        }
    }

    fn frame(index: u64) -> VideoFrame {
        VideoFrame::new(vec![0; 4], 1, 1, index as f64, index)
    }

    fn set_state(h: &Harness, state: PlaybackState) {
        h.playback.send_modify(|s| s.state = state);
    }

    #[test]
    fn test_nothing_to_draw_without_frame() {
        let mut h = harness();
        assert_eq!(h.ticker.tick(), TickOutcome::NothingToDraw);
    }

    #[test]
    fn test_playing_draws_each_new_frame() {
        let mut h = harness();
        set_state(&h, PlaybackState::Playing);
        for i in 0..3 {
            h.frames.publish(frame(i));
            assert_eq!(h.ticker.tick(), TickOutcome::Rendered);
        }
        assert_eq!(h.recorded.lock().unwrap().frames, vec![0, 1, 2]);
        assert_eq!(h.stats.counters().rendered, 3);
    }

    #[test]
    fn test_paused_redraws_only_on_view_change() {
        let mut h = harness();
        h.frames.publish(frame(0));
        // First frame is shown even before playback starts
        assert_eq!(h.ticker.tick(), TickOutcome::Rendered);
        set_state(&h, PlaybackState::Paused);

        assert_eq!(h.ticker.tick(), TickOutcome::Unchanged);

        h.tracker.on_pan_gesture(true, (0.0, 150.0));
        h.tracker.on_pan_gesture(false, (30.0, 150.0));
        assert_eq!(h.ticker.tick(), TickOutcome::Rendered);
        assert_eq!(h.ticker.tick(), TickOutcome::Unchanged);

        let recorded = h.recorded.lock().unwrap();
        assert_eq!(recorded.frames, vec![0, 0]);
        assert_eq!(recorded.views[1], h.tracker.current_view());
    }

    #[test]
    fn test_seek_while_paused_shows_new_frame() {
        for state in [PlaybackState::Paused, PlaybackState::Ready] {
            let mut h = harness();
            h.frames.publish(frame(0));
            assert_eq!(h.ticker.tick(), TickOutcome::Rendered);
            set_state(&h, state);

            // Frame decoded at the seek target
            h.frames.publish(frame(7));
            assert_eq!(h.ticker.tick(), TickOutcome::Rendered);
            assert_eq!(h.ticker.tick(), TickOutcome::Unchanged);
            assert_eq!(h.recorded.lock().unwrap().frames, vec![0, 7]);
        }
    }

    #[test]
    fn test_closed_session_draws_nothing() {
        let mut h = harness();
        h.frames.publish(frame(0));
        h.playback.send_modify(|s| s.session_open = false);
        assert_eq!(h.ticker.tick(), TickOutcome::NothingToDraw);
    }

    #[test]
    fn test_catch_up_skips_missed_ticks() {
        let interval = Duration::from_millis(10);
        let start = Instant::now();

        let (next, missed) = catch_up(start + interval, start, interval);
        assert_eq!((next, missed), (start + interval, 0));

        // Render took 35 ms past the deadline: ticks at +0, +10, +20, +30 are gone
        let (next, missed) = catch_up(start, start + Duration::from_millis(35), interval);
        assert_eq!(missed, 4);
        assert_eq!(next, start + Duration::from_millis(40));
    }

    #[test]
    fn test_catch_up_counts_beyond_u32() {
        let interval = Duration::from_nanos(1);
        let start = Instant::now();
        let now = start + Duration::from_secs(10);

        let (next, missed) = catch_up(start, now, interval);
        assert_eq!(missed, 10_000_000_001);
        assert!(next > now);
        assert!(next - now <= interval);
    }

    #[test]
    fn test_render_loop_stops_on_drop() {
        let h = harness();
        h.frames.publish(frame(0));
        let inputs = RenderInputs {
            playback: h.playback.subscribe(),
            orientation: h.tracker.reader(),
            frames: Arc::clone(&h.frames),
        };
        let mut render_loop = RenderLoop::spawn(
            Box::new(RecordingRenderer(Arc::clone(&h.recorded))),
            inputs,
            Duration::from_millis(1),
        )
        .unwrap();
        assert!(render_loop.is_running());

        std::thread::sleep(Duration::from_millis(50));
        render_loop.stop();
        assert!(!render_loop.is_running());
        assert!(render_loop.counters().rendered >= 1);
        let timing = render_loop.frame_stats();
        assert!(timing.sample_count >= 1);
        assert!(timing.max_ms >= timing.min_ms);
        drop(render_loop);
    }
}
