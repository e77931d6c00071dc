//! Frame rendering
//!
//! The render loop pulls frames from the [`FrameSlot`] and the view from the
//! orientation tracker, and hands both to a [`FrameRenderer`].

pub mod camera;
pub mod frame;
pub mod frame_slot;
pub mod render_loop;
pub mod renderer;
pub mod texture;

pub use camera::ViewCamera;
pub use frame::VideoFrame;
pub use frame_slot::{AcquiredFrame, FrameSlot};
pub use render_loop::{RenderInputs, RenderLoop, RenderTicker, TickOutcome};
pub use renderer::{FrameRenderer, NullRenderer, RenderError, SphereMeshState, SphereRenderer};
pub use texture::FrameTexture;
