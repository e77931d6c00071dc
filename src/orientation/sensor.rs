//! Inertial sensor sources
//!
//! A `SensorSource` is the platform motion manager. It is started with a
//! [`SensorSink`] and pushes samples into the tracker until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::Vec3;

use super::tracker::OrientationTracker;
use super::types::SensorSample;

/// Errors raised while starting a sensor
#[derive(Debug, Clone, thiserror::Error)]
pub enum SensorError {
    #[error("motion sensor not present on this device")]
    NotPresent,
    #[error("motion sensor access denied")]
    PermissionDenied,
    #[error("motion sensor failed to start: {0}")]
    StartFailed(String),
}

/// Handle a sensor uses to deliver samples
#[derive(Debug, Clone)]
pub struct SensorSink {
    tracker: Weak<OrientationTracker>,
}

impl SensorSink {
    pub(crate) fn new(tracker: Weak<OrientationTracker>) -> Self {
        Self { tracker }
    }

    /// Push a sample. Returns `false` once the tracker is gone.
    pub fn deliver(&self, sample: SensorSample) -> bool {
        match self.tracker.upgrade() {
            Some(tracker) => {
                tracker.on_sensor_sample(sample);
                true
            }
            None => false,
        }
    }
}

/// Platform motion manager
pub trait SensorSource: Send {
    /// Human-readable sensor name used in logs
    fn name(&self) -> &str;

    /// Register the sink and begin delivering samples
    fn start(&mut self, sink: SensorSink) -> Result<(), SensorError>;

    /// Unregister and stop delivering samples. Must be safe to call twice.
    fn stop(&mut self);
}

/// Sensor that reports itself missing
///
/// Stands in for devices without a gyroscope so the tracker degrades to
/// pan-only control.
#[derive(Debug, Default)]
pub struct NoSensor;

impl SensorSource for NoSensor {
    fn name(&self) -> &str {
        "none"
    }

    fn start(&mut self, _sink: SensorSink) -> Result<(), SensorError> {
        Err(SensorError::NotPresent)
    }

    fn stop(&mut self) {}
}

/// Synthetic gyroscope that slowly turns the device about the vertical axis
///
/// Emits samples from a background thread at a fixed rate, with gravity
/// pointing straight down.
pub struct SimulatedSensor {
    rate_hz: u32,
    yaw_rate: f32,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SimulatedSensor {
    /// `yaw_rate` in radians per second
    pub fn new(rate_hz: u32, yaw_rate: f32) -> Self {
        Self {
            rate_hz: rate_hz.max(1),
            yaw_rate,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }
}

impl SensorSource for SimulatedSensor {
    fn name(&self) -> &str {
        "simulated-gyro"
    }

    fn start(&mut self, sink: SensorSink) -> Result<(), SensorError> {
        if self.thread_handle.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let interval = Duration::from_secs_f64(1.0 / self.rate_hz as f64);
        let rotation_rate = Vec3::new(0.0, self.yaw_rate, 0.0);

        let handle = thread::Builder::new()
            .name("sensor".into())
            .spawn(move || {
                let origin = Instant::now();
                while running.load(Ordering::Acquire) {
                    let sample = SensorSample::gyro(origin.elapsed().as_secs_f64(), rotation_rate)
                        .with_gravity(Vec3::NEG_Y);
                    if !sink.deliver(sample) {
                        break;
                    }
                    thread::sleep(interval);
                }
            })
            .map_err(|e| SensorError::StartFailed(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(target: "immersive_360::orientation", "Failed to join sensor thread: {:?}", e);
            }
        }
    }
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{OrientationSettings, RenderSettings};
    use glam::Quat;

    fn tracker() -> Arc<OrientationTracker> {
        Arc::new(OrientationTracker::new(&OrientationSettings::default(), &RenderSettings::default()))
    }

    #[test]
    fn test_sink_reports_dropped_tracker() {
        let tracker = tracker();
        let sink = SensorSink::new(Arc::downgrade(&tracker));
        assert!(sink.deliver(SensorSample::gyro(0.0, Vec3::ZERO)));

        drop(tracker);
        assert!(!sink.deliver(SensorSample::gyro(0.01, Vec3::ZERO)));
    }

    #[test]
    fn test_no_sensor_fails_to_start() {
        let tracker = tracker();
        let mut sensor = NoSensor;
        let result = sensor.start(SensorSink::new(Arc::downgrade(&tracker)));
        assert!(matches!(result, Err(SensorError::NotPresent)));
    }

    #[test]
    fn test_simulated_sensor_turns_view() {
        let tracker = tracker();
        let mut sensor = SimulatedSensor::new(200, 1.0);
        sensor.start(SensorSink::new(Arc::downgrade(&tracker))).unwrap();

        thread::sleep(Duration::from_millis(150));
        sensor.stop();
        let after_stop = tracker.current_view();
        assert!(!after_stop.abs_diff_eq(Quat::IDENTITY, 1e-3));

        // Stopped sensors deliver nothing more
        thread::sleep(Duration::from_millis(30));
        assert_eq!(tracker.current_view(), after_stop);
        sensor.stop();
    }
}
