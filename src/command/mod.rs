//! Host command surface
//!
//! Method-channel style entry point: named calls with JSON arguments in,
//! `updateTime` events out.

pub mod error;
pub mod surface;
pub mod types;

pub use error::{CommandError, CommandErrorKind};
pub use surface::{CommandSurface, EngineEvent, EngineEvents, RendererFactory};
pub use types::{Command, MethodCall};
