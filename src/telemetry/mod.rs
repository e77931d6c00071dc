//! Telemetry and logging infrastructure
//!
//! Provides structured logging with tracing and render-loop frame statistics.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogGuard};
pub use metrics::{FrameProfiler, FrameStats, RenderCounters, RenderStats};
