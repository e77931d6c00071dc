//! Orientation tracking types

use glam::{Quat, Vec3};

/// One inertial sensor reading in device coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Sample time in seconds (monotonic, any origin)
    pub timestamp: f64,
    /// Gyroscope rotation rate in radians per second
    pub rotation_rate: Vec3,
    /// Direction of gravity (toward the ground), if the sensor reports it
    pub gravity: Option<Vec3>,
}

impl SensorSample {
    pub fn gyro(timestamp: f64, rotation_rate: Vec3) -> Self {
        Self {
            timestamp,
            rotation_rate,
            gravity: None,
        }
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = Some(gravity);
        self
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.rotation_rate.is_finite()
            && self.gravity.map_or(true, |g| g.is_finite())
    }
}

/// User drag offset applied on top of the device orientation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PanOffset {
    /// Rotation about world up, radians in (-PI, PI]
    pub yaw: f32,
    /// Rotation about the camera's horizontal axis, radians in [-PI/2, PI/2]
    pub pitch: f32,
}

impl PanOffset {
    pub fn quat_yaw(&self) -> Quat {
        Quat::from_rotation_y(self.yaw)
    }

    pub fn quat_pitch(&self) -> Quat {
        Quat::from_rotation_x(self.pitch)
    }
}

/// Snapshot of the tracker, read by the renderer each tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationState {
    /// Filtered device attitude
    pub device: Quat,
    /// Accumulated pan gesture offset
    pub pan: PanOffset,
    /// `yaw * device * pitch`
    pub combined: Quat,
}

impl OrientationState {
    pub fn compose(device: Quat, pan: PanOffset) -> Self {
        Self {
            device,
            pan,
            combined: (pan.quat_yaw() * device * pan.quat_pitch()).normalize(),
        }
    }
}

impl Default for OrientationState {
    fn default() -> Self {
        Self::compose(Quat::IDENTITY, PanOffset::default())
    }
}

/// Availability of the inertial sensor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SensorStatus {
    /// No sensor attached yet
    #[default]
    Detached,
    /// Sensor delivering samples
    Active { source: String },
    /// Sensor missing or failed to start
    Unavailable { reason: String },
}

/// Which inputs drive the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Device attitude plus pan offset
    SensorFused,
    /// Pan gestures only
    PanOnly,
}

impl SensorStatus {
    pub fn tracking_mode(&self) -> TrackingMode {
        match self {
            SensorStatus::Active { .. } => TrackingMode::SensorFused,
            SensorStatus::Detached | SensorStatus::Unavailable { .. } => TrackingMode::PanOnly,
        }
    }
}

/// Forward direction of the default camera
pub const FORWARD: Vec3 = Vec3::NEG_Z;
