//! Immersive 360 Library
//!
//! Playback engine for 360° equirectangular video. Projects decoded frames on
//! the inside of a sphere, steers the view from the motion sensor and pan
//! gestures, and drives play/pause/seek/loop through a method-channel style
//! command surface.

pub mod command;
pub mod gpu_context;
pub mod orientation;
pub mod playback;
pub mod projection;
pub mod render;
pub mod settings;
pub mod telemetry;
pub mod viewport;

pub use command::{Command, CommandError, CommandErrorKind, CommandSurface, EngineEvent, EngineEvents, MethodCall};
pub use gpu_context::GpuContext;
pub use orientation::{OrientationTracker, SensorSample, SensorSource, SensorStatus, TrackingMode};
pub use playback::{MediaPipeline, MediaStream, PlaybackController, PlaybackSnapshot, PlaybackState, TestPatternPipeline};
pub use projection::{MeshCache, MeshGeometry};
pub use render::{FrameRenderer, FrameSlot, SphereRenderer, VideoFrame};
pub use settings::EngineSettings;
pub use viewport::Viewport;
