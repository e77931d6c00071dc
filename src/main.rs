//! Immersive 360 - Demo Entry Point
//!
//! Plays the synthetic test pattern through the full engine: simulated gyro,
//! headless GPU renderer (or a null renderer when no adapter exists), and a
//! scripted sequence of host commands. Time updates are printed as they would
//! be sent to the host.

use std::sync::Arc;
use std::time::Duration;

use immersive_360::orientation::SimulatedSensor;
use immersive_360::render::{FrameRenderer, NullRenderer, RenderError};
use immersive_360::telemetry::{init_logging, LogConfig};
use immersive_360::{CommandSurface, EngineSettings, GpuContext, MethodCall, SphereRenderer, TestPatternPipeline};
use serde_json::json;

fn main() {
    let log_config = LogConfig::default();
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Immersive 360 v{}", env!("CARGO_PKG_VERSION"));

    let settings = EngineSettings::load();
    tracing::info!(
        fov = settings.render.fov_degrees,
        tick_rate = settings.render.tick_rate_hz,
        "Settings loaded"
    );

    // Adapter and device are requested before the runtime starts
    let gpu = match GpuContext::headless_blocking() {
        Ok(gpu) => Some(Arc::new(gpu)),
        Err(e) => {
            tracing::warn!("GPU unavailable ({}), rendering disabled", e);
            None
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(run(settings, gpu));
}

async fn run(settings: EngineSettings, gpu: Option<Arc<GpuContext>>) {
    let render_settings = settings.render.clone();
    let pipeline = Arc::new(TestPatternPipeline::default().with_duration(Some(12.0)));
    let (surface, mut events) = CommandSurface::new(settings, pipeline);
    let mut surface = surface
        .with_sensor(Box::new(SimulatedSensor::new(100, 0.2)))
        .with_renderer(Box::new(move || {
            let renderer: Box<dyn FrameRenderer> = match &gpu {
                Some(gpu) => Box::new(SphereRenderer::new(Arc::clone(gpu), &render_settings)),
                None => Box::new(NullRenderer::default()),
            };
            Ok::<_, RenderError>(renderer)
        }));

    let script = [
        (0, MethodCall::new("init", json!({"url": "test://pattern", "isAutoPlay": true, "isRepeat": true, "width": 1280, "height": 720}))),
        (2, MethodCall::new("onPanUpdate", json!({"isStart": true, "x": 640, "y": 360}))),
        (0, MethodCall::new("onPanUpdate", json!({"isStart": false, "x": 900, "y": 300}))),
        (2, MethodCall::new("seekTo", json!({"millisecond": 5000}))),
        (3, MethodCall::bare("stop")),
        (1, MethodCall::new("jumpTo", json!({"millisecond": 11000}))),
        (0, MethodCall::bare("play")),
        (4, MethodCall::bare("reset")),
        (2, MethodCall::bare("dispose")),
    ];

    for (delay_secs, call) in script {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(delay_secs);
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
            let call = event.to_method_call();
            println!("{} {}", call.method, call.arguments);
        }

        match surface.handle(&call).await {
            Ok(()) => tracing::info!(method = %call.method, state = %surface.snapshot().state, "Command applied"),
            Err(e) => tracing::warn!(method = %call.method, kind = ?e.kind, "{}", e.message),
        }
    }

    tracing::info!(frames_replaced = surface.frames().replaced_count(), "Demo finished");
}
