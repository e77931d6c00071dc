//! Orientation tracker
//!
//! Fuses gyroscope and gravity samples into a device attitude with a
//! complementary filter, and layers a user pan offset on top. Writers take
//! the inner mutex; readers get a copy of the last published state.

use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use glam::{Quat, Vec3};

use super::sensor::{SensorSink, SensorSource};
use super::types::{OrientationState, PanOffset, SensorSample, SensorStatus, TrackingMode, FORWARD};
use crate::settings::{OrientationSettings, RenderSettings};
use crate::viewport::Viewport;

/// Largest integration step; longer gaps are treated as this long
pub const MAX_SAMPLE_DT: f64 = 0.1;

struct TrackerInner {
    device: Quat,
    pan: PanOffset,
    last_sample_time: Option<f64>,
    tilt_seeded: bool,
    drag_anchor: Option<(f64, f64)>,
    viewport: Option<Viewport>,
    sensor_status: SensorStatus,
}

impl TrackerInner {
    fn new() -> Self {
        Self {
            device: Quat::IDENTITY,
            pan: PanOffset::default(),
            last_sample_time: None,
            tilt_seeded: false,
            drag_anchor: None,
            viewport: None,
            sensor_status: SensorStatus::Detached,
        }
    }
}

/// Read-only view of the published orientation
#[derive(Debug, Clone)]
pub struct OrientationReader {
    published: Arc<RwLock<OrientationState>>,
}

impl OrientationReader {
    /// Latest committed orientation
    pub fn snapshot(&self) -> OrientationState {
        match self.published.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Combined view quaternion
    pub fn current_view(&self) -> Quat {
        self.snapshot().combined
    }
}

/// Tracks device attitude and pan offset
pub struct OrientationTracker {
    inner: Mutex<TrackerInner>,
    published: Arc<RwLock<OrientationState>>,
    /// Gyro weight of the complementary filter
    alpha: f32,
    pan_sensitivity: f32,
    /// Vertical field of view of the camera, radians
    fov_y: f32,
}

impl std::fmt::Debug for OrientationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrientationTracker")
            .field("state", &self.current_state())
            .field("alpha", &self.alpha)
            .finish()
    }
}

impl OrientationTracker {
    pub fn new(settings: &OrientationSettings, render: &RenderSettings) -> Self {
        Self {
            inner: Mutex::new(TrackerInner::new()),
            published: Arc::new(RwLock::new(OrientationState::default())),
            alpha: settings.filter_alpha.clamp(0.0, 1.0),
            pan_sensitivity: settings.pan_sensitivity,
            fov_y: render.fov_radians(),
        }
    }

    /// Handle for the render thread
    pub fn reader(&self) -> OrientationReader {
        OrientationReader {
            published: Arc::clone(&self.published),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, inner: &TrackerInner) {
        let state = OrientationState::compose(inner.device, inner.pan);
        match self.published.write() {
            Ok(mut published) => *published = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// Integrate one sensor sample
    ///
    /// The gyro rate is integrated in device coordinates, then the tilt is
    /// pulled toward the measured gravity by `1 - alpha`. The first sample
    /// carrying gravity snaps the tilt. Non-finite or out-of-order samples
    /// are dropped.
    pub fn on_sensor_sample(&self, sample: SensorSample) {
        if !sample.is_finite() {
            tracing::trace!(target: "immersive_360::orientation", "Dropping non-finite sensor sample");
            return;
        }

        let mut inner = self.lock();

        let dt = match inner.last_sample_time {
            None => 0.0,
            Some(last) if sample.timestamp <= last => return,
            Some(last) => (sample.timestamp - last).min(MAX_SAMPLE_DT),
        };
        inner.last_sample_time = Some(sample.timestamp);

        let mut attitude = inner.device;
        if dt > 0.0 {
            let step = Quat::from_scaled_axis(sample.rotation_rate * dt as f32);
            attitude = (attitude * step).normalize();
        }

        if let Some(gravity) = sample.gravity {
            if gravity.length_squared() > 1e-6 {
                let measured_up = attitude * (-gravity).normalize();
                let correction = Quat::from_rotation_arc(measured_up, Vec3::Y);
                let weight = if inner.tilt_seeded { 1.0 - self.alpha } else { 1.0 };
                attitude = (Quat::IDENTITY.slerp(correction, weight) * attitude).normalize();
                inner.tilt_seeded = true;
            }
        }

        inner.device = attitude;
        inner.pan.pitch = clamp_pan_pitch(inner.pan.pitch, attitude);
        self.publish(&inner);
    }

    /// Begin or continue a drag at `point` (viewport coordinates)
    ///
    /// Horizontal motion of one viewport width turns the view by the
    /// horizontal field of view. Pitch saturates at straight up / down.
    pub fn on_pan_gesture(&self, is_start: bool, point: (f64, f64)) {
        let mut inner = self.lock();

        let Some(viewport) = inner.viewport else {
            tracing::debug!(target: "immersive_360::orientation", "Pan ignored: no viewport");
            return;
        };

        let anchor = inner.drag_anchor;
        inner.drag_anchor = Some(point);

        let Some((last_x, last_y)) = anchor.filter(|_| !is_start) else {
            return;
        };

        let fov_x = 2.0 * ((self.fov_y * 0.5).tan() * viewport.aspect()).atan();
        let yaw_per_px = fov_x / viewport.width as f32 * self.pan_sensitivity;
        let pitch_per_px = self.fov_y / viewport.height as f32 * self.pan_sensitivity;

        let dx = (point.0 - last_x) as f32;
        let dy = (point.1 - last_y) as f32;

        inner.pan.yaw = wrap_angle(inner.pan.yaw + dx * yaw_per_px);
        inner.pan.pitch = clamp_pan_pitch(inner.pan.pitch + dy * pitch_per_px, inner.device);

        self.publish(&inner);
    }

    /// Combined device + pan view. Side-effect free.
    pub fn current_view(&self) -> Quat {
        self.current_state().combined
    }

    pub fn current_state(&self) -> OrientationState {
        self.reader().snapshot()
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        let mut inner = self.lock();
        inner.viewport = Some(viewport);
        inner.drag_anchor = None;
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.lock().viewport
    }

    /// Start a sensor source, degrading to pan-only control on failure
    pub fn attach(self: &Arc<Self>, source: &mut dyn SensorSource) -> SensorStatus {
        let status = match source.start(SensorSink::new(Arc::downgrade(self))) {
            Ok(()) => {
                tracing::info!(target: "immersive_360::orientation", sensor = source.name(), "Motion sensor attached");
                SensorStatus::Active {
                    source: source.name().to_string(),
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "immersive_360::orientation",
                    sensor = source.name(),
                    error = %e,
                    "Motion sensor unavailable, falling back to pan-only control"
                );
                SensorStatus::Unavailable {
                    reason: e.to_string(),
                }
            }
        };
        self.lock().sensor_status = status.clone();
        status
    }

    /// Stop a sensor source previously attached
    pub fn detach(&self, source: &mut dyn SensorSource) {
        source.stop();
        let mut inner = self.lock();
        if matches!(inner.sensor_status, SensorStatus::Active { .. }) {
            inner.sensor_status = SensorStatus::Detached;
        }
    }

    pub fn sensor_status(&self) -> SensorStatus {
        self.lock().sensor_status.clone()
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        self.lock().sensor_status.tracking_mode()
    }

    /// Forget attitude, pan and drag state
    pub fn reset(&self) {
        let mut inner = self.lock();
        let viewport = inner.viewport.take();
        let status = std::mem::take(&mut inner.sensor_status);
        *inner = TrackerInner::new();
        inner.viewport = viewport;
        inner.sensor_status = status;
        self.publish(&inner);
    }
}

/// Elevation of the device's forward direction above the horizon
fn device_elevation(device: Quat) -> f32 {
    (device * FORWARD).y.clamp(-1.0, 1.0).asin()
}

/// Limit the pan pitch so the combined view stays within straight up / down
fn clamp_pan_pitch(pitch: f32, device: Quat) -> f32 {
    let elevation = device_elevation(device);
    pitch.clamp(-FRAC_PI_2 - elevation, FRAC_PI_2 - elevation)
}

/// Wrap to (-PI, PI]
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}
