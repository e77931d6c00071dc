//! Settings management for the 360 engine
//!
//! Handles loading/saving of engine settings as XML, either from an explicit
//! path or from the per-user config directory.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rendering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Vertical field of view in degrees
    #[serde(rename = "fovDegrees", default = "default_fov_degrees")]
    pub fov_degrees: f32,
    /// Near clipping plane
    #[serde(rename = "near", default = "default_near")]
    pub near: f32,
    /// Far clipping plane
    #[serde(rename = "far", default = "default_far")]
    pub far: f32,
    /// Display tick rate of the render loop
    #[serde(rename = "tickRateHz", default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    /// Sphere radius in world units
    #[serde(rename = "sphereRadius", default = "default_sphere_radius")]
    pub sphere_radius: f32,
    /// Longitude segments used for a 1080p-class viewport
    #[serde(rename = "baseSegments", default = "default_base_segments")]
    pub base_segments: u32,
}

fn default_fov_degrees() -> f32 {
    75.0
}
fn default_near() -> f32 {
    0.05
}
fn default_far() -> f32 {
    100.0
}
fn default_tick_rate() -> u32 {
    60
}
fn default_sphere_radius() -> f32 {
    10.0
}
fn default_base_segments() -> u32 {
    64
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fov_degrees: default_fov_degrees(),
            near: default_near(),
            far: default_far(),
            tick_rate_hz: default_tick_rate(),
            sphere_radius: default_sphere_radius(),
            base_segments: default_base_segments(),
        }
    }
}

impl RenderSettings {
    /// Vertical field of view in radians
    pub fn fov_radians(&self) -> f32 {
        self.fov_degrees.to_radians()
    }

    /// Time budget of one display tick
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }
}

/// Orientation filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationSettings {
    /// Complementary filter weight of the integrated gyro (0..1)
    #[serde(rename = "filterAlpha", default = "default_filter_alpha")]
    pub filter_alpha: f32,
    /// Multiplier applied to pan gestures (1.0 = one viewport width per FOV)
    #[serde(rename = "panSensitivity", default = "default_pan_sensitivity")]
    pub pan_sensitivity: f32,
}

fn default_filter_alpha() -> f32 {
    0.98
}
fn default_pan_sensitivity() -> f32 {
    1.0
}

impl Default for OrientationSettings {
    fn default() -> Self {
        Self {
            filter_alpha: default_filter_alpha(),
            pan_sensitivity: default_pan_sensitivity(),
        }
    }
}

/// Playback timer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Interval of the autoplay readiness poll
    #[serde(rename = "readinessPollMs", default = "default_readiness_poll_ms")]
    pub readiness_poll_ms: u64,
    /// Interval of outbound time updates
    #[serde(rename = "timeUpdateMs", default = "default_time_update_ms")]
    pub time_update_ms: u64,
}

fn default_readiness_poll_ms() -> u64 {
    500
}
fn default_time_update_ms() -> u64 {
    1000
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            readiness_poll_ms: default_readiness_poll_ms(),
            time_update_ms: default_time_update_ms(),
        }
    }
}

impl PlaybackSettings {
    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn time_update_interval(&self) -> Duration {
        Duration::from_millis(self.time_update_ms)
    }
}

/// Top-level engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "Immersive360Settings")]
pub struct EngineSettings {
    #[serde(rename = "render", default)]
    pub render: RenderSettings,
    #[serde(rename = "orientation", default)]
    pub orientation: OrientationSettings,
    #[serde(rename = "playback", default)]
    pub playback: PlaybackSettings,
}

impl EngineSettings {
    /// Load settings from an XML file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_xml(&contents)
    }

    /// Parse settings from XML, clamping out-of-range values
    pub fn from_xml(contents: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = from_str(contents)?;
        settings.clamp();
        Ok(settings)
    }

    /// Save settings to an XML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);
        fs::write(path, formatted)?;
        Ok(())
    }

    /// Path of the per-user settings file
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("Immersive360");
            p.push("settings.xml");
            p
        })
    }

    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    target: "immersive_360::settings",
                    path = %path.display(),
                    error = %e,
                    "Failed to load settings, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::settings_path() else {
            return Err(SettingsError::NoConfigDir);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        self.save_to_file(&path)
    }

    fn clamp(&mut self) {
        let render = &mut self.render;
        render.fov_degrees = finite_or(render.fov_degrees, default_fov_degrees()).clamp(20.0, 150.0);
        render.near = finite_or(render.near, default_near()).clamp(0.001, 1.0);
        render.far = finite_or(render.far, default_far()).max(render.near * 2.0);
        render.tick_rate_hz = render.tick_rate_hz.clamp(1, 240);
        render.sphere_radius = finite_or(render.sphere_radius, default_sphere_radius()).max(render.near * 4.0);
        render.base_segments = render.base_segments.clamp(8, 256);

        let orientation = &mut self.orientation;
        orientation.filter_alpha = finite_or(orientation.filter_alpha, default_filter_alpha()).clamp(0.0, 1.0);
        orientation.pan_sensitivity =
            finite_or(orientation.pan_sensitivity, default_pan_sensitivity()).clamp(0.05, 10.0);

        let playback = &mut self.playback;
        playback.readiness_poll_ms = playback.readiness_poll_ms.clamp(10, 10_000);
        playback.time_update_ms = playback.time_update_ms.clamp(100, 10_000);
    }
}

/// NaN and infinities read from a file fall back to the default
fn finite_or(value: f32, default: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

/// Settings-related errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),
    #[error("Could not find config directory")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.render.tick_rate_hz, 60);
        assert_eq!(settings.playback.readiness_poll_ms, 500);
        assert_eq!(settings.playback.time_update_ms, 1000);
        assert!((settings.orientation.filter_alpha - 0.98).abs() < f32::EPSILON);
    }

    #[test]
    fn test_xml_roundtrip_preserves_values() {
        let mut settings = EngineSettings::default();
        settings.render.fov_degrees = 90.0;
        settings.playback.readiness_poll_ms = 250;

        let xml = to_string(&settings).unwrap();
        let parsed = EngineSettings::from_xml(&xml).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let xml = r#"<Immersive360Settings>
            <render><fovDegrees>400</fovDegrees><tickRateHz>0</tickRateHz></render>
            <orientation><filterAlpha>3.5</filterAlpha></orientation>
        </Immersive360Settings>"#;
        let settings = EngineSettings::from_xml(xml).unwrap();
        assert_eq!(settings.render.fov_degrees, 150.0);
        assert_eq!(settings.render.tick_rate_hz, 1);
        assert_eq!(settings.orientation.filter_alpha, 1.0);
        // Missing sections fall back to defaults
        assert_eq!(settings.playback, PlaybackSettings::default());
    }

    #[test]
    fn test_non_finite_values_use_defaults() {
        let xml = r#"<Immersive360Settings>
            <render><fovDegrees>NaN</fovDegrees><far>inf</far><sphereRadius>NaN</sphereRadius></render>
            <orientation><filterAlpha>NaN</filterAlpha><panSensitivity>-inf</panSensitivity></orientation>
        </Immersive360Settings>"#;
        let settings = EngineSettings::from_xml(xml).unwrap();
        let defaults = EngineSettings::default();
        assert_eq!(settings.render.fov_degrees, defaults.render.fov_degrees);
        assert_eq!(settings.render.far, defaults.render.far);
        assert_eq!(settings.render.sphere_radius, defaults.render.sphere_radius);
        assert_eq!(settings.orientation, defaults.orientation);
        assert!(settings.render.fov_radians().is_finite());
    }

    #[test]
    fn test_tick_interval() {
        let render = RenderSettings::default();
        let interval = render.tick_interval();
        assert!((interval.as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);
    }
}
