//! Sphere mesh generation for equirectangular projection
//!
//! Builds a UV sphere viewed from its center. Longitude maps to `u` and
//! latitude to `v` so an equirectangular frame wraps the inner surface.

use bytemuck::{Pod, Zeroable};
use std::collections::{HashMap, VecDeque};
use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use crate::viewport::Viewport;

/// Longitude segment bounds
pub const MIN_SEGMENTS: u32 = 8;
pub const MAX_SEGMENTS: u32 = 256;

/// Vertex of the projection sphere
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SphereVertex {
    /// Position in world space
    pub position: [f32; 3],
    /// Equirectangular texture coordinates
    pub uv: [f32; 2],
}

impl SphereVertex {
    /// Size of vertex in bytes
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Vertex buffer layout for wgpu
    pub fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // uv
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Immutable sphere geometry
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGeometry {
    pub vertices: Vec<SphereVertex>,
    pub indices: Vec<u32>,
    /// Longitude segments after clamping
    pub segments: u32,
    /// Latitude rings
    pub rings: u32,
    pub radius: f32,
}

impl MeshGeometry {
    /// Build an inward-facing UV sphere
    ///
    /// `u` runs west to east with the seam (u = 0 / 1) directly behind the
    /// default forward direction (-Z); u = 0.5 is straight ahead. `v` = 0 at
    /// the north pole (+Y). Triangles wind counter-clockwise as seen from the
    /// center; degenerate triangles at the poles are omitted.
    pub fn build(segments: u32, radius: f32) -> Self {
        let segments = segments.clamp(MIN_SEGMENTS, MAX_SEGMENTS);
        let rings = (segments / 2).max(4);
        let columns = segments + 1;

        let mut vertices = Vec::with_capacity(((rings + 1) * columns) as usize);
        let mut indices = Vec::with_capacity((segments * (rings - 1) * 6) as usize);

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let phi = v * PI;
            let y = phi.cos() * radius;
            let ring_radius = phi.sin() * radius;

            for column in 0..=segments {
                let u = column as f32 / segments as f32;
                let longitude = (u - 0.5) * TAU;
                let x = longitude.sin() * ring_radius;
                let z = -longitude.cos() * ring_radius;

                vertices.push(SphereVertex {
                    position: [x, y, z],
                    uv: [u, v],
                });
            }
        }

        for ring in 0..rings {
            for column in 0..segments {
                let top_left = ring * columns + column;
                let top_right = top_left + 1;
                let bottom_left = top_left + columns;
                let bottom_right = bottom_left + 1;

                // Top row collapses onto the north pole
                if ring != 0 {
                    indices.extend_from_slice(&[top_left, bottom_left, top_right]);
                }
                // Bottom row collapses onto the south pole
                if ring != rings - 1 {
                    indices.extend_from_slice(&[top_right, bottom_left, bottom_right]);
                }
            }
        }

        Self {
            vertices,
            indices,
            segments,
            rings,
            radius,
        }
    }

    /// Get vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get index count
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// Pick longitude segments for a viewport
///
/// `base` is the tessellation used for a 1920x1080 surface; smaller surfaces
/// get coarser meshes. Results are multiples of 8.
pub fn segments_for_viewport(viewport: &Viewport, base: u32) -> u32 {
    let (width, height) = viewport.pixel_size();
    let scale = ((width as f64 * height as f64) / (1920.0 * 1080.0)).sqrt();
    let raw = (base as f64 * scale.clamp(0.25, 2.0)).round() as u32;
    let snapped = raw.div_ceil(8) * 8;
    snapped.clamp(MIN_SEGMENTS, MAX_SEGMENTS)
}

/// Cache key for built geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshKey {
    segments: u32,
    radius_bits: u32,
}

impl MeshKey {
    pub fn new(segments: u32, radius: f32) -> Self {
        Self {
            segments: segments.clamp(MIN_SEGMENTS, MAX_SEGMENTS),
            radius_bits: radius.to_bits(),
        }
    }
}

/// Meshes kept by default: the current one and the previous one
pub const DEFAULT_CACHED_MESHES: usize = 2;

/// Geometry cache keyed by (segments, radius)
///
/// Holds at most `capacity` meshes and evicts the least recently used.
#[derive(Debug)]
pub struct MeshCache {
    meshes: HashMap<MeshKey, Arc<MeshGeometry>>,
    /// Keys from least to most recently used
    recent: VecDeque<MeshKey>,
    capacity: usize,
}

impl Default for MeshCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHED_MESHES)
    }
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            meshes: HashMap::with_capacity(capacity),
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Return cached geometry, building it on first use
    pub fn get_or_build(&mut self, segments: u32, radius: f32) -> Arc<MeshGeometry> {
        let key = MeshKey::new(segments, radius);
        self.touch(key);

        let mesh = Arc::clone(self.meshes.entry(key).or_insert_with(|| {
            tracing::debug!(
                target: "immersive_360::projection",
                segments = key.segments,
                radius,
                "Building sphere mesh"
            );
            Arc::new(MeshGeometry::build(segments, radius))
        }));

        while self.recent.len() > self.capacity {
            if let Some(evicted) = self.recent.pop_front() {
                self.meshes.remove(&evicted);
            }
        }
        mesh
    }

    fn touch(&mut self, key: MeshKey) {
        if let Some(pos) = self.recent.iter().position(|k| *k == key) {
            self.recent.remove(pos);
        }
        self.recent.push_back(key);
    }

    pub fn contains(&self, segments: u32, radius: f32) -> bool {
        self.meshes.contains_key(&MeshKey::new(segments, radius))
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn position(mesh: &MeshGeometry, index: u32) -> Vec3 {
        Vec3::from_array(mesh.vertices[index as usize].position)
    }

    #[test]
    fn test_sphere_counts() {
        let mesh = MeshGeometry::build(16, 1.0);
        assert_eq!(mesh.rings, 8);
        // (rings + 1) * (segments + 1) vertices
        assert_eq!(mesh.vertex_count(), 9 * 17);
        // 2 triangles per quad, minus one per quad on both pole rows
        assert_eq!(mesh.index_count(), (16 * (2 * 8 - 2) * 3) as usize);
    }

    #[test]
    fn test_segments_are_clamped() {
        assert_eq!(MeshGeometry::build(2, 1.0).segments, MIN_SEGMENTS);
        assert_eq!(MeshGeometry::build(10_000, 1.0).segments, MAX_SEGMENTS);
    }

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(MeshGeometry::build(32, 5.0), MeshGeometry::build(32, 5.0));
    }

    #[test]
    fn test_vertices_lie_on_sphere() {
        let mesh = MeshGeometry::build(24, 3.0);
        for vertex in &mesh.vertices {
            let len = Vec3::from_array(vertex.position).length();
            assert!((len - 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_forward_direction_is_texture_center() {
        let mesh = MeshGeometry::build(16, 1.0);
        let forward = mesh
            .vertices
            .iter()
            .find(|v| (v.uv[0] - 0.5).abs() < 1e-6 && (v.uv[1] - 0.5).abs() < 1e-6)
            .expect("equator vertex at u = 0.5");
        let p = Vec3::from_array(forward.position);
        assert!((p - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_seam_is_behind_viewer() {
        let mesh = MeshGeometry::build(16, 1.0);
        for vertex in mesh.vertices.iter().filter(|v| v.uv[0] == 0.0 || v.uv[0] == 1.0) {
            let p = Vec3::from_array(vertex.position);
            // Seam vertices lie in the x = 0 half plane behind the camera
            assert!(p.x.abs() < 1e-5);
            assert!(p.z >= -1e-5);
        }
    }

    #[test]
    fn test_east_is_to_the_right() {
        let mesh = MeshGeometry::build(16, 1.0);
        let east = mesh
            .vertices
            .iter()
            .find(|v| (v.uv[0] - 0.75).abs() < 1e-6 && (v.uv[1] - 0.5).abs() < 1e-6)
            .unwrap();
        assert!((Vec3::from_array(east.position) - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_triangles_face_center() {
        let mesh = MeshGeometry::build(16, 1.0);
        for tri in mesh.indices.chunks(3) {
            let (a, b, c) = (position(&mesh, tri[0]), position(&mesh, tri[1]), position(&mesh, tri[2]));
            let normal = (b - a).cross(c - a);
            assert!(normal.length() > 1e-7, "degenerate triangle {:?}", tri);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) < 0.0);
        }
    }

    #[test]
    fn test_segments_for_viewport() {
        let full_hd = Viewport::new(1920.0, 1080.0).unwrap();
        assert_eq!(segments_for_viewport(&full_hd, 64), 64);

        let small = Viewport::new(300.0, 300.0).unwrap();
        let segments = segments_for_viewport(&small, 64);
        assert!(segments < 64 && segments >= MIN_SEGMENTS);
        assert_eq!(segments % 8, 0);
    }

    #[test]
    fn test_cache_reuses_geometry() {
        let mut cache = MeshCache::new();
        let a = cache.get_or_build(32, 10.0);
        let b = cache.get_or_build(32, 10.0);
        assert!(Arc::ptr_eq(&a, &b));

        let c = cache.get_or_build(48, 10.0);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_keeps_current_and_previous_only() {
        let mut cache = MeshCache::new();
        for segments in [16, 24, 32, 40, 48] {
            cache.get_or_build(segments, 1.0);
            assert!(cache.len() <= DEFAULT_CACHED_MESHES);
        }
        assert!(cache.contains(48, 1.0));
        assert!(cache.contains(40, 1.0));
        assert!(!cache.contains(16, 1.0));
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let mut cache = MeshCache::new();
        let first = cache.get_or_build(16, 1.0);
        cache.get_or_build(24, 1.0);
        // Touching 16 makes 24 the eviction candidate
        assert!(Arc::ptr_eq(&first, &cache.get_or_build(16, 1.0)));
        cache.get_or_build(32, 1.0);

        assert!(cache.contains(16, 1.0));
        assert!(!cache.contains(24, 1.0));
        assert_eq!(cache.len(), 2);
    }
}
