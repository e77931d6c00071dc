//! Projection geometry
//!
//! Builds the sphere an equirectangular frame is wrapped onto.

pub mod mesh;

pub use mesh::{segments_for_viewport, MeshCache, MeshGeometry, MeshKey, SphereVertex};
