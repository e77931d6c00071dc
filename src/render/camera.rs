//! View camera at the center of the projection sphere
//!
//! The camera never moves; only its orientation changes.

use glam::{Mat4, Quat, Vec3};

use crate::settings::RenderSettings;
use crate::viewport::Viewport;

/// Perspective camera rotated by the combined view quaternion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCamera {
    /// World orientation of the camera
    orientation: Quat,
    /// Aspect ratio (width/height) for projection
    aspect: f32,
    /// Vertical field of view in radians
    fov_y: f32,
    /// Near clipping plane
    near: f32,
    /// Far clipping plane
    far: f32,
}

impl ViewCamera {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            orientation: Quat::IDENTITY,
            aspect: 1.0,
            fov_y: settings.fov_radians(),
            near: settings.near,
            far: settings.far,
        }
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.orientation).inverse()
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Direction the camera looks at
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation.normalize();
    }

    /// Update aspect ratio on resize
    pub fn set_viewport(&mut self, viewport: &Viewport) {
        self.aspect = viewport.aspect();
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }
}
