//! Sphere renderer
//!
//! Draws the current video frame onto the inside of the projection sphere as
//! seen through the view camera. Output goes to an offscreen color target
//! sized to the viewport.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Quat;
use wgpu::util::DeviceExt;

use super::camera::ViewCamera;
use super::frame::VideoFrame;
use super::texture::FrameTexture;
use crate::gpu_context::GpuContext;
use crate::projection::{segments_for_viewport, MeshCache, MeshGeometry, SphereVertex};
use crate::settings::RenderSettings;
use crate::viewport::Viewport;

/// Output color format
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

/// Errors raised by frame renderers
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("invalid frame {width}x{height} with {len} bytes")]
    InvalidFrame { width: u32, height: u32, len: usize },
}

/// Backend-independent renderer driven by the render loop
pub trait FrameRenderer: Send {
    /// Draw `frame` on the sphere as seen with orientation `view`
    fn render_frame(&mut self, frame: &VideoFrame, view: Quat, viewport: Viewport) -> Result<(), RenderError>;
}

/// Renderer that draws nothing, used when no GPU is available
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub frames: u64,
}

impl FrameRenderer for NullRenderer {
    fn render_frame(&mut self, _frame: &VideoFrame, _view: Quat, _viewport: Viewport) -> Result<(), RenderError> {
        self.frames += 1;
        Ok(())
    }
}

/// Camera uniform buffer data
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct CameraUniforms {
    view_proj: [[f32; 4]; 4],
}

/// Tracks which sphere mesh the current viewport needs
///
/// Geometry is only replaced when the viewport dimensions change.
#[derive(Debug)]
pub struct SphereMeshState {
    cache: MeshCache,
    viewport: Option<Viewport>,
    current: Option<Arc<MeshGeometry>>,
    base_segments: u32,
    radius: f32,
    rebuilds: u64,
}

impl SphereMeshState {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            cache: MeshCache::new(),
            viewport: None,
            current: None,
            base_segments: settings.base_segments,
            radius: settings.sphere_radius,
            rebuilds: 0,
        }
    }

    /// Returns new geometry when the viewport changed, `None` otherwise
    pub fn update(&mut self, viewport: Viewport) -> Option<Arc<MeshGeometry>> {
        if self.viewport == Some(viewport) {
            return None;
        }
        self.viewport = Some(viewport);

        let segments = segments_for_viewport(&viewport, self.base_segments);
        let mesh = self.cache.get_or_build(segments, self.radius);
        if self.current.as_ref().is_some_and(|current| Arc::ptr_eq(current, &mesh)) {
            return None;
        }

        self.rebuilds += 1;
        self.current = Some(Arc::clone(&mesh));
        Some(mesh)
    }

    pub fn current(&self) -> Option<&Arc<MeshGeometry>> {
        self.current.as_ref()
    }

    /// Number of times the active geometry was replaced
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}

/// GPU buffers for one sphere mesh
struct MeshBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// wgpu implementation of [`FrameRenderer`]
pub struct SphereRenderer {
    gpu: Arc<GpuContext>,

    // Render pipeline
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,

    // Camera uniforms
    camera_buffer: wgpu::Buffer,
    camera: ViewCamera,

    // Mesh
    mesh_state: SphereMeshState,
    mesh_buffers: Option<MeshBuffers>,

    // Video frame
    frame_texture: FrameTexture,
    sampler: wgpu::Sampler,
    /// (frame_index, pts bits) of the frame in `frame_texture`
    uploaded: Option<(u64, u64)>,

    // Render target
    render_texture: Option<wgpu::Texture>,
    render_view: Option<wgpu::TextureView>,
    render_width: u32,
    render_height: u32,
}

impl SphereRenderer {
    pub fn new(gpu: Arc<GpuContext>, settings: &RenderSettings) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sphere Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/sphere.wgsl").into()),
        });

        // [0] camera uniforms, [1] frame texture, [2] sampler
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sphere Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sphere Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Sphere Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[SphereVertex::buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            // Single surface around the camera, nothing to depth test
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sphere Camera Buffer"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Wrap horizontally across the seam
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sphere Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let frame_texture = FrameTexture::new(device, 1, 1);

        Self {
            camera: ViewCamera::new(settings),
            mesh_state: SphereMeshState::new(settings),
            mesh_buffers: None,
            pipeline,
            bind_group_layout,
            bind_group: None,
            camera_buffer,
            frame_texture,
            sampler,
            uploaded: None,
            render_texture: None,
            render_view: None,
            render_width: 0,
            render_height: 0,
            gpu,
        }
    }

    /// Recreate the render target and mesh when the viewport changed
    fn ensure_viewport(&mut self, viewport: Viewport) {
        let (width, height) = viewport.pixel_size();

        if self.render_width != width || self.render_height != height {
            let render_texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Sphere Render Texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });

            self.render_view = Some(render_texture.create_view(&Default::default()));
            self.render_texture = Some(render_texture);
            self.render_width = width;
            self.render_height = height;
        }

        self.camera.set_viewport(&viewport);

        if let Some(mesh) = self.mesh_state.update(viewport) {
            let device = &self.gpu.device;
            self.mesh_buffers = Some(MeshBuffers {
                vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Sphere Vertex Buffer"),
                    contents: bytemuck::cast_slice(&mesh.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Sphere Index Buffer"),
                    contents: bytemuck::cast_slice(&mesh.indices),
                    usage: wgpu::BufferUsages::INDEX,
                }),
                index_count: mesh.indices.len() as u32,
            });
            tracing::debug!(
                target: "immersive_360::render",
                segments = mesh.segments,
                width,
                height,
                "Sphere mesh uploaded"
            );
        }
    }

    /// Upload the frame if it differs from the one already on the GPU
    fn upload_frame(&mut self, frame: &VideoFrame) -> Result<(), RenderError> {
        let key = (frame.frame_index, frame.pts.to_bits());
        if self.uploaded == Some(key) && self.bind_group.is_some() {
            return Ok(());
        }

        let recreated = self.frame_texture.upload(&self.gpu.device, &self.gpu.queue, frame)?;
        self.uploaded = Some(key);

        if recreated || self.bind_group.is_none() {
            self.bind_group = Some(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Sphere Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.camera_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(self.frame_texture.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            }));
        }
        Ok(())
    }

    /// Rendered output for the host compositor
    pub fn texture(&self) -> Option<&wgpu::Texture> {
        self.render_texture.as_ref()
    }

    pub fn texture_view(&self) -> Option<&wgpu::TextureView> {
        self.render_view.as_ref()
    }

    /// Get render target dimensions
    pub fn render_size(&self) -> (u32, u32) {
        (self.render_width, self.render_height)
    }

    pub fn camera(&self) -> &ViewCamera {
        &self.camera
    }
}

impl FrameRenderer for SphereRenderer {
    fn render_frame(&mut self, frame: &VideoFrame, view: Quat, viewport: Viewport) -> Result<(), RenderError> {
        self.ensure_viewport(viewport);
        self.upload_frame(frame)?;

        self.camera.set_orientation(view);
        let uniforms = CameraUniforms {
            view_proj: self.camera.view_projection_matrix().to_cols_array_2d(),
        };
        self.gpu
            .queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniforms));

        let (Some(render_view), Some(bind_group), Some(mesh)) =
            (&self.render_view, &self.bind_group, &self.mesh_buffers)
        else {
            return Ok(());
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sphere Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sphere Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: render_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_built_on_first_viewport() {
        let mut state = SphereMeshState::new(&RenderSettings::default());
        let mesh = state.update(Viewport::new(1920.0, 1080.0).unwrap()).unwrap();
        assert_eq!(mesh.segments, RenderSettings::default().base_segments);
        assert_eq!(state.rebuilds(), 1);
    }

    #[test]
    fn test_mesh_not_rebuilt_for_same_viewport() {
        let mut state = SphereMeshState::new(&RenderSettings::default());
        let viewport = Viewport::new(300.0, 300.0).unwrap();
        assert!(state.update(viewport).is_some());
        for _ in 0..10 {
            assert!(state.update(viewport).is_none());
        }
        assert_eq!(state.rebuilds(), 1);
    }

    #[test]
    fn test_mesh_rebuilt_on_viewport_change() {
        let mut state = SphereMeshState::new(&RenderSettings::default());
        state.update(Viewport::new(300.0, 300.0).unwrap());
        let larger = state.update(Viewport::new(1920.0, 1080.0).unwrap()).unwrap();
        assert!(larger.segments > 16);
        assert_eq!(state.rebuilds(), 2);

        // Back to the first size reuses the cached geometry
        let again = state.update(Viewport::new(300.0, 300.0).unwrap()).unwrap();
        assert_eq!(state.rebuilds(), 3);
        assert!(Arc::ptr_eq(state.current().unwrap(), &again));
    }

    #[test]
    fn test_null_renderer_counts() {
        let mut renderer = NullRenderer::default();
        let frame = VideoFrame::solid(2, 1, [0, 0, 0, 255]);
        renderer
            .render_frame(&frame, Quat::IDENTITY, Viewport::new(2.0, 1.0).unwrap())
            .unwrap();
        assert_eq!(renderer.frames, 1);
    }
}
