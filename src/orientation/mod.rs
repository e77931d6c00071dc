//! Device orientation and pan gesture tracking
//!
//! The tracker owns the view direction. Sensor sources push samples into it
//! from their own threads; the render loop reads the published state.

pub mod sensor;
pub mod tracker;
pub mod types;

pub use sensor::{NoSensor, SensorError, SensorSink, SensorSource, SimulatedSensor};
pub use tracker::{OrientationReader, OrientationTracker};
pub use types::{OrientationState, PanOffset, SensorSample, SensorStatus, TrackingMode, FORWARD};
