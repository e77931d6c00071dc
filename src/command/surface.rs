//! Command surface
//!
//! Entry point for the host. Translates method calls into controller and
//! tracker operations, and owns everything that must be torn down on
//! `dispose`: the sensor source, the render loop and the frame slot.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use super::error::CommandError;
use super::types::{self, Command, MethodCall};
use crate::orientation::{NoSensor, OrientationTracker, SensorSource};
use crate::playback::{
    MediaPipeline, MediaSource, PlaybackController, PlaybackError, PlaybackSnapshot, SessionOptions, TimeUpdate,
};
use crate::render::{FrameRenderer, FrameSlot, RenderError, RenderInputs, RenderLoop};
use crate::settings::EngineSettings;
use crate::telemetry::RenderCounters;

/// Creates the renderer when a session opens
pub type RendererFactory = Box<dyn Fn() -> Result<Box<dyn FrameRenderer>, RenderError> + Send + Sync>;

/// Outbound notification for the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    UpdateTime(TimeUpdate),
}

impl EngineEvent {
    /// Encode as a method call for the host channel
    pub fn to_method_call(&self) -> MethodCall {
        match self {
            EngineEvent::UpdateTime(update) => MethodCall::new(
                types::UPDATE_TIME,
                json!({ "duration": update.duration, "total": update.total }),
            ),
        }
    }
}

/// Stream of [`EngineEvent`]s
#[derive(Debug)]
pub struct EngineEvents {
    updates: mpsc::UnboundedReceiver<TimeUpdate>,
}

impl EngineEvents {
    /// Wait for the next event; `None` once the engine is gone
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.updates.recv().await.map(EngineEvent::UpdateTime)
    }

    /// Next event if one is queued
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.updates.try_recv().ok().map(EngineEvent::UpdateTime)
    }
}

/// Host-facing engine handle
pub struct CommandSurface {
    settings: EngineSettings,
    controller: PlaybackController,
    tracker: Arc<OrientationTracker>,
    frames: Arc<FrameSlot>,
    sensor: Box<dyn SensorSource>,
    renderer_factory: Option<RendererFactory>,
    render_loop: Option<RenderLoop>,
}

impl CommandSurface {
    /// Create the engine. Must be called within a tokio runtime.
    pub fn new(settings: EngineSettings, pipeline: Arc<dyn MediaPipeline>) -> (Self, EngineEvents) {
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let frames = Arc::new(FrameSlot::new());
        let controller = PlaybackController::spawn(pipeline, Arc::clone(&frames), &settings.playback, updates_tx);
        let tracker = Arc::new(OrientationTracker::new(&settings.orientation, &settings.render));

        let surface = Self {
            settings,
            controller,
            tracker,
            frames,
            sensor: Box::new(NoSensor),
            renderer_factory: None,
            render_loop: None,
        };
        (surface, EngineEvents { updates })
    }

    /// Motion sensor attached on `init`
    pub fn with_sensor(mut self, sensor: Box<dyn SensorSource>) -> Self {
        self.sensor = sensor;
        self
    }

    /// Renderer started on `init`; without one no render loop runs
    pub fn with_renderer(mut self, factory: RendererFactory) -> Self {
        self.renderer_factory = Some(factory);
        self
    }

    /// Dispatch one method call
    pub async fn handle(&mut self, call: &MethodCall) -> Result<(), CommandError> {
        let command = match Command::parse(call) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(target: "immersive_360::command", method = %call.method, error = %e.message, "Rejected command");
                return Err(e);
            }
        };
        tracing::debug!(target: "immersive_360::command", method = command.name(), "Command");
        self.execute(command).await
    }

    pub async fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        let name = command.name();
        let playback = |e| CommandError::from_playback(name, e);

        match command {
            Command::Init {
                url,
                autoplay,
                repeat,
                viewport,
            } => {
                let source = MediaSource::parse(&url).map_err(|e| CommandError::invalid_argument(name, e.to_string()))?;
                let options = SessionOptions {
                    autoplay,
                    loop_enabled: repeat,
                    viewport,
                };
                self.controller.init(source, options).await.map_err(playback)?;

                self.tracker.set_viewport(viewport);
                let sensor = self.tracker.attach(self.sensor.as_mut());
                tracing::debug!(target: "immersive_360::command", ?sensor, mode = ?sensor.tracking_mode(), "Orientation input");
                self.start_render_loop();
                Ok(())
            }
            Command::Play => self.controller.play().await.map_err(playback),
            Command::Stop => self.controller.pause().await.map_err(playback),
            Command::Reset => self.controller.jump_to(0.0).await.map_err(playback),
            Command::JumpTo { millisecond } => self.controller.jump_to(millisecond / 1000.0).await.map_err(playback),
            Command::SeekTo { millisecond } => self.controller.seek_by(millisecond / 1000.0).await.map_err(playback),
            Command::PanUpdate { is_start, x, y } => {
                let snapshot = self.controller.snapshot();
                let viewport = match snapshot.viewport.filter(|_| snapshot.session_open) {
                    Some(viewport) => viewport,
                    None => return Err(playback(PlaybackError::SessionNotOpen)),
                };
                if !viewport.contains(x, y) {
                    return Err(CommandError::invalid_argument(
                        name,
                        format!("point ({x}, {y}) outside {}x{} viewport", viewport.width, viewport.height),
                    ));
                }
                self.tracker.on_pan_gesture(is_start, (x, y));
                Ok(())
            }
            Command::Dispose => {
                self.dispose().await;
                Ok(())
            }
        }
    }

    fn start_render_loop(&mut self) {
        let Some(factory) = self.renderer_factory.as_ref() else {
            return;
        };
        let renderer = match factory() {
            Ok(renderer) => renderer,
            Err(e) => {
                tracing::warn!(target: "immersive_360::command", error = %e, "Renderer unavailable, continuing without output");
                return;
            }
        };

        let inputs = RenderInputs {
            playback: self.controller.subscribe(),
            orientation: self.tracker.reader(),
            frames: Arc::clone(&self.frames),
        };
        match RenderLoop::spawn(renderer, inputs, self.settings.render.tick_interval()) {
            Ok(render_loop) => self.render_loop = Some(render_loop),
            Err(e) => {
                tracing::warn!(target: "immersive_360::command", error = %e, "Failed to start render thread");
            }
        }
    }

    /// Release the session and everything attached to it. Idempotent.
    pub async fn dispose(&mut self) {
        self.tracker.detach(self.sensor.as_mut());
        self.controller.dispose().await;
        if let Some(mut render_loop) = self.render_loop.take() {
            render_loop.stop();
            let counters = render_loop.counters();
            let timing = render_loop.frame_stats();
            tracing::debug!(
                target: "immersive_360::command",
                rendered = counters.rendered,
                skipped_ticks = counters.skipped_ticks,
                replaced_frames = self.frames.replaced_count(),
                avg_ms = timing.avg_ms,
                p95_ms = timing.p95_ms,
                "Render loop stopped"
            );
        }
        self.tracker.reset();
        self.frames.clear();
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.controller.snapshot()
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    /// Tracker, for hosts that deliver sensor samples themselves
    pub fn tracker(&self) -> &Arc<OrientationTracker> {
        &self.tracker
    }

    pub fn frames(&self) -> &Arc<FrameSlot> {
        &self.frames
    }

    pub fn render_counters(&self) -> Option<RenderCounters> {
        self.render_loop.as_ref().map(RenderLoop::counters)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl Drop for CommandSurface {
    fn drop(&mut self) {
        // The controller tears its session down once the last handle drops
        self.sensor.stop();
        if let Some(mut render_loop) = self.render_loop.take() {
            render_loop.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_time_encodes_as_method_call() {
        let event = EngineEvent::UpdateTime(TimeUpdate {
            duration: "00:07".into(),
            total: "02:30".into(),
        });
        let call = event.to_method_call();
        assert_eq!(call.method, "updateTime");
        assert_eq!(call.arguments, json!({"duration": "00:07", "total": "02:30"}));
    }
}
