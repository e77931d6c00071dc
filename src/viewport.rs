//! Output viewport dimensions
//!
//! The viewport is the size of the surface the sphere is rendered into, as
//! handed over by the host on `init`. Pan gestures are expressed in the same
//! coordinate space.

use serde::{Deserialize, Serialize};

/// Size of the output surface in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Create a viewport, returning `None` unless both sides are finite and positive
    pub fn new(width: f64, height: f64) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        (valid(width) && valid(height)).then_some(Self { width, height })
    }

    /// Width / height
    pub fn aspect(&self) -> f32 {
        (self.width / self.height) as f32
    }

    /// Whether a point lies inside the viewport (edges included)
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }

    /// Render target size in whole pixels (never zero)
    pub fn pixel_size(&self) -> (u32, u32) {
        let px = |v: f64| (v.round() as u32).max(1);
        (px(self.width), px(self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_degenerate_sizes() {
        assert!(Viewport::new(0.0, 100.0).is_none());
        assert!(Viewport::new(100.0, -1.0).is_none());
        assert!(Viewport::new(f64::NAN, 100.0).is_none());
        assert!(Viewport::new(f64::INFINITY, 100.0).is_none());
        assert!(Viewport::new(300.0, 300.0).is_some());
    }

    #[test]
    fn test_contains_includes_edges() {
        let viewport = Viewport::new(300.0, 200.0).unwrap();
        assert!(viewport.contains(0.0, 0.0));
        assert!(viewport.contains(300.0, 200.0));
        assert!(!viewport.contains(-5.0, 10.0));
        assert!(!viewport.contains(10.0, 200.5));
        assert!(!viewport.contains(f64::NAN, 10.0));
    }

    #[test]
    fn test_pixel_size() {
        let viewport = Viewport::new(299.6, 0.2).unwrap();
        assert_eq!(viewport.pixel_size(), (300, 1));
    }
}
