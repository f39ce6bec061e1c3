use glam::Vec2;
use image::{Rgba, RgbaImage};
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use crate::config::Color;
use crate::error::KoiError;
use crate::model::{water, BodyInstance, Pattern, WaterPlane};
use crate::utils::{grid_for, Mesh, MeshBuffer, Vertex};
use crate::view::{Atlas, GpuContext, Systems};

/// Pixel size of one atlas slot
const SLOT_WIDTH: u32 = 64;
const SLOT_HEIGHT: u32 = 32;
/// Bodies that fit into the shared instance buffer per frame
const BODIES_MAX: u64 = 512;
/// Sand texture size in pixels and the pond area one copy covers in units
const SAND_SIZE: u32 = 128;
const SAND_UNITS: f32 = 2.5;
/// Refraction of the underwater image by the surface slope, in units
const REFRACTION: f32 = 0.12;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ViewportUniform {
    size: [f32; 2],
    scale: f32,
    _pad: f32,
}

/// Four floats, the layout every sampled texture's parameters share
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ParamsUniform {
    params: [f32; 4],
}

pub struct WgpuAtlas {
    queue: wgpu::Queue,
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    columns: u32,
}

impl WgpuAtlas {
    fn upload(&self, slot: usize, image: &RgbaImage) {
        let slot = slot as u32;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: (slot % self.columns) * SLOT_WIDTH,
                    y: (slot / self.columns) * SLOT_HEIGHT,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * SLOT_WIDTH),
                rows_per_image: Some(SLOT_HEIGHT),
            },
            wgpu::Extent3d { width: SLOT_WIDTH, height: SLOT_HEIGHT, depth_or_array_layers: 1 },
        );
    }
}

impl Atlas for WgpuAtlas {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn write(&mut self, slot: usize, pattern: &Pattern) {
        if slot >= self.capacity {
            warn!(slot, capacity = self.capacity, "atlas slot out of range");
            return;
        }
        self.upload(slot, &pattern.rasterize(SLOT_WIDTH, SLOT_HEIGHT));
    }

    fn clear(&mut self, slot: usize) {
        if slot < self.capacity {
            self.upload(slot, &RgbaImage::new(SLOT_WIDTH, SLOT_HEIGHT));
        }
    }
}

pub struct WgpuBackground {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

pub struct WgpuTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

pub struct WgpuMesh {
    buffer: wgpu::Buffer,
    capacity: usize,
    count: u32,
}

/// Height field texture, rebuilt when the water plane changes size
struct HeightField {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    columns: usize,
    rows: usize,
}

struct Pipelines {
    body: wgpu::RenderPipeline,
    background: wgpu::RenderPipeline,
    water: wgpu::RenderPipeline,
    shadow: wgpu::RenderPipeline,
}

/// Commands recorded since the last present
#[derive(Default)]
struct Frame {
    encoder: Option<wgpu::CommandEncoder>,
    output: Option<wgpu::SurfaceTexture>,
    target: Option<wgpu::TextureView>,
    clear: Option<wgpu::Color>,
    /// Scale the viewport uniform holds for this frame
    scale: Option<f32>,
    /// Bodies already written to the instance buffer
    cursor: u64,
}

impl Frame {
    /// Drop everything recorded so far, the next frame starts clean
    fn discard(&mut self) {
        if self.encoder.is_some() || self.cursor > 0 {
            debug!(bodies = self.cursor, "discarding unfinished frame");
        }
        *self = Frame::default();
    }
}

/// [`Systems`] on top of wgpu, drawing to the surface of a [`GpuContext`]
pub struct WgpuSystems {
    gpu: GpuContext,
    quad: MeshBuffer,
    viewport: wgpu::Buffer,
    viewport_bind_group: wgpu::BindGroup,
    sampled_layout: wgpu::BindGroupLayout,
    height_layout: wgpu::BindGroupLayout,
    linear: wgpu::Sampler,
    repeat: wgpu::Sampler,
    pipelines: Pipelines,
    bodies: wgpu::Buffer,
    surface_params: wgpu::Buffer,
    heights: Option<HeightField>,
    frame: Frame,
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

const QUAD_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[
        wgpu::VertexAttribute { offset: 0, shader_location: 0, format: wgpu::VertexFormat::Float32x2 },
        wgpu::VertexAttribute { offset: 8, shader_location: 1, format: wgpu::VertexFormat::Float32x2 },
    ],
};

const INSTANCE_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<BodyInstance>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Instance,
    attributes: &[
        wgpu::VertexAttribute { offset: 0, shader_location: 2, format: wgpu::VertexFormat::Float32x2 },
        wgpu::VertexAttribute { offset: 8, shader_location: 3, format: wgpu::VertexFormat::Float32x2 },
        wgpu::VertexAttribute { offset: 16, shader_location: 4, format: wgpu::VertexFormat::Float32 },
        wgpu::VertexAttribute { offset: 20, shader_location: 5, format: wgpu::VertexFormat::Uint32 },
        wgpu::VertexAttribute { offset: 24, shader_location: 6, format: wgpu::VertexFormat::Float32 },
    ],
};

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layouts: &[&wgpu::BindGroupLayout],
    buffers: &[wgpu::VertexBufferLayout<'_>],
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: layouts,
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState { format, blend: Some(blend), write_mask: wgpu::ColorWrites::ALL })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
        multiview: None,
        cache: None,
    })
}

/// Grainy sand, tileable since every pixel is independent
fn sand(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        let mut h = x.wrapping_mul(0x8da6_b343) ^ y.wrapping_mul(0xd816_3841);
        h ^= h >> 13;
        h = h.wrapping_mul(0x85eb_ca6b);
        h ^= h >> 16;
        let grain = (h & 0x1f) as u8;
        Rgba([150 + grain, 130 + grain, 90 + grain / 2, 255])
    })
}

impl WgpuSystems {
    pub fn new(gpu: GpuContext) -> Self {
        let device = &gpu.device;
        let format = gpu.format;

        let viewport_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("viewport_layout"),
            entries: &[uniform_entry(0)],
        });
        let sampled_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sampled_layout"),
            entries: &[
                texture_entry(0, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                uniform_entry(2),
            ],
        });
        let height_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("height_layout"),
            entries: &[texture_entry(0, false), uniform_entry(1)],
        });

        let viewport = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("viewport"),
            size: std::mem::size_of::<ViewportUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let viewport_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("viewport_bind_group"),
            layout: &viewport_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: viewport.as_entire_binding() }],
        });
        let surface_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("surface_params"),
            size: std::mem::size_of::<ParamsUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bodies = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bodies"),
            size: BODIES_MAX * std::mem::size_of::<BodyInstance>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("linear"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let repeat = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("repeat"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let pipelines = Pipelines {
            body: create_pipeline(
                device,
                "body",
                include_str!("../shaders/body.wgsl"),
                &[&viewport_layout, &sampled_layout],
                &[QUAD_LAYOUT, INSTANCE_LAYOUT],
                format,
                wgpu::BlendState::ALPHA_BLENDING,
            ),
            background: create_pipeline(
                device,
                "background",
                include_str!("../shaders/background.wgsl"),
                &[&viewport_layout, &sampled_layout],
                &[QUAD_LAYOUT],
                format,
                wgpu::BlendState::REPLACE,
            ),
            water: create_pipeline(
                device,
                "water",
                include_str!("../shaders/water.wgsl"),
                &[&viewport_layout, &sampled_layout, &height_layout],
                &[QUAD_LAYOUT],
                format,
                wgpu::BlendState::REPLACE,
            ),
            shadow: create_pipeline(
                device,
                "shadow",
                include_str!("../shaders/shadow.wgsl"),
                &[&viewport_layout],
                &[QUAD_LAYOUT, INSTANCE_LAYOUT],
                format,
                wgpu::BlendState::ALPHA_BLENDING,
            ),
        };

        let quad = Mesh::quad().upload(device);

        Self {
            quad,
            viewport,
            viewport_bind_group,
            sampled_layout,
            height_layout,
            linear,
            repeat,
            pipelines,
            bodies,
            surface_params,
            heights: None,
            frame: Frame::default(),
            gpu,
        }
    }

    /// Follow a window or canvas resize. The pond picks up the new size on
    /// its next resize.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }

    fn params(&self, label: &str, params: [f32; 4]) -> wgpu::Buffer {
        self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&ParamsUniform { params }),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    fn sampled_bind_group(
        &self,
        label: &str,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.sampled_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
                wgpu::BindGroupEntry { binding: 2, resource: params.as_entire_binding() },
            ],
        })
    }

    fn texture(&self, label: &str, width: u32, height: u32, format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> wgpu::Texture {
        self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }

    /// Queue writes land before the frame is submitted, so every pass of a
    /// frame sees the same viewport
    fn write_viewport(&mut self, scale: f32) {
        if self.frame.scale == Some(scale) {
            return;
        }
        let uniform = ViewportUniform {
            size: [self.gpu.width() as f32, self.gpu.height() as f32],
            scale,
            _pad: 0.0,
        };
        self.gpu.queue.write_buffer(&self.viewport, 0, bytemuck::bytes_of(&uniform));
        self.frame.scale = Some(scale);
    }

    /// Next surface texture, reconfiguring once if the surface went stale
    fn acquire(&self) -> Result<wgpu::SurfaceTexture, KoiError> {
        match self.gpu.surface.get_current_texture() {
            Ok(output) => Ok(output),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost, reconfiguring");
                self.gpu.reconfigure();
                Ok(self.gpu.surface.get_current_texture()?)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Make sure the height texture matches `water`, then upload its surface
    fn upload_heights(&mut self, water: &WaterPlane, time_factor: f32) {
        let (columns, rows) = (water.columns(), water.rows());
        let stale = self
            .heights
            .as_ref()
            .is_none_or(|heights| heights.columns != columns || heights.rows != rows);

        if stale {
            debug!(columns, rows, "creating height field texture");
            let texture = self.texture(
                "heights",
                columns as u32,
                rows as u32,
                wgpu::TextureFormat::R32Float,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("heights_bind_group"),
                layout: &self.height_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
                    wgpu::BindGroupEntry { binding: 1, resource: self.surface_params.as_entire_binding() },
                ],
            });
            self.heights = Some(HeightField { texture, bind_group, columns, rows });
        }

        let Some(heights) = &self.heights else {
            return;
        };
        let surface = water.interpolated(time_factor);
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &heights.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&surface),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * columns as u32),
                rows_per_image: Some(rows as u32),
            },
            wgpu::Extent3d { width: columns as u32, height: rows as u32, depth_or_array_layers: 1 },
        );

        let params = ParamsUniform {
            params: [columns as f32, rows as f32, water::RESOLUTION, REFRACTION],
        };
        self.gpu.queue.write_buffer(&self.surface_params, 0, bytemuck::bytes_of(&params));
    }

    /// Record one render pass on the current target
    fn pass(&mut self, draw: impl FnOnce(&mut wgpu::RenderPass<'_>, &Pipelines, &MeshBuffer, &wgpu::BindGroup)) {
        let Some(view) = self.frame.target.clone() else {
            warn!("drawing without a target");
            return;
        };
        let load = match self.frame.clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };

        let device = &self.gpu.device;
        let encoder = self.frame.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("encoder") })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("pond_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        draw(&mut pass, &self.pipelines, &self.quad, &self.viewport_bind_group);
    }
}

impl Systems for WgpuSystems {
    type Atlas = WgpuAtlas;
    type Background = WgpuBackground;
    type Target = WgpuTarget;
    type Mesh = WgpuMesh;

    fn width(&self) -> u32 {
        self.gpu.width()
    }

    fn height(&self) -> u32 {
        self.gpu.height()
    }

    fn create_atlas(&mut self, capacity: usize) -> Result<WgpuAtlas, KoiError> {
        let (columns, rows) = grid_for(capacity, SLOT_WIDTH, SLOT_HEIGHT);
        let texture = self.texture(
            "atlas",
            columns * SLOT_WIDTH,
            rows * SLOT_HEIGHT,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let grid = self.params("atlas_grid", [columns as f32, rows as f32, 0.0, 0.0]);
        let bind_group = self.sampled_bind_group("atlas_bind_group", &view, &self.linear, &grid);
        debug!(capacity, columns, rows, "created atlas");

        Ok(WgpuAtlas {
            queue: self.gpu.queue.clone(),
            texture,
            bind_group,
            capacity,
            columns,
        })
    }

    fn create_background(&mut self, width: u32, height: u32, scale: f32) -> Result<WgpuBackground, KoiError> {
        let image = sand(SAND_SIZE);
        let texture = self.gpu.device.create_texture_with_data(
            &self.gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some("sand"),
                size: wgpu::Extent3d { width: SAND_SIZE, height: SAND_SIZE, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let repeat = Vec2::new(width as f32, height as f32) / (scale * SAND_UNITS);
        let tiling = self.params("sand_tiling", [repeat.x, repeat.y, 0.0, 0.0]);
        let bind_group = self.sampled_bind_group("background_bind_group", &view, &self.repeat, &tiling);

        Ok(WgpuBackground { _texture: texture, bind_group })
    }

    fn create_target(&mut self, width: u32, height: u32) -> Result<WgpuTarget, KoiError> {
        let texture = self.texture(
            "underwater",
            width,
            height,
            self.gpu.format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let texel = self.params("underwater_texel", [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32, 0.0, 0.0]);
        let bind_group = self.sampled_bind_group("underwater_bind_group", &view, &self.linear, &texel);

        Ok(WgpuTarget { _texture: texture, view, bind_group })
    }

    fn create_mesh(&mut self, capacity: usize) -> Result<WgpuMesh, KoiError> {
        let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("constellation_mesh"),
            size: (capacity.max(1) * std::mem::size_of::<BodyInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(WgpuMesh { buffer, capacity, count: 0 })
    }

    fn target(&mut self, target: &WgpuTarget) {
        self.frame.target = Some(target.view.clone());
        self.frame.clear = Some(wgpu::Color::BLACK);
    }

    fn target_main(&mut self) -> Result<(), KoiError> {
        if self.frame.output.is_none() {
            match self.acquire() {
                Ok(output) => self.frame.output = Some(output),
                Err(error) => {
                    // No present follows, so nothing recorded this frame may linger
                    self.frame.discard();
                    return Err(error);
                }
            }
        }

        self.frame.target = self
            .frame
            .output
            .as_ref()
            .map(|output| output.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        Ok(())
    }

    fn clear(&mut self, color: Color) {
        self.frame.clear = Some(wgpu::Color {
            r: color.r as f64,
            g: color.g as f64,
            b: color.b as f64,
            a: 1.0,
        });
    }

    fn render_background(&mut self, background: &WgpuBackground) {
        self.pass(|pass, pipelines, quad, viewport| {
            pass.set_pipeline(&pipelines.background);
            pass.set_bind_group(0, viewport, &[]);
            pass.set_bind_group(1, &background.bind_group, &[]);
            pass.set_vertex_buffer(0, quad.vertex_buffer.slice(..));
            pass.set_index_buffer(quad.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..quad.index_count, 0, 0..1);
        });
    }

    fn render_bodies(&mut self, atlas: &WgpuAtlas, bodies: &[BodyInstance], scale: f32) {
        let start = self.frame.cursor;
        let count = (bodies.len() as u64).min(BODIES_MAX - start);
        if count < bodies.len() as u64 {
            warn!(bodies = bodies.len(), "body batch full, dropping bodies");
        }
        if count == 0 {
            return;
        }

        let stride = std::mem::size_of::<BodyInstance>() as u64;
        self.gpu.queue.write_buffer(
            &self.bodies,
            start * stride,
            bytemuck::cast_slice(&bodies[..count as usize]),
        );
        self.frame.cursor += count;
        self.write_viewport(scale);

        let batch = self.bodies.clone();
        self.pass(|pass, pipelines, quad, viewport| {
            pass.set_pipeline(&pipelines.body);
            pass.set_bind_group(0, viewport, &[]);
            pass.set_bind_group(1, &atlas.bind_group, &[]);
            pass.set_vertex_buffer(0, quad.vertex_buffer.slice(..));
            pass.set_vertex_buffer(1, batch.slice(start * stride..(start + count) * stride));
            pass.set_index_buffer(quad.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..quad.index_count, 0, 0..count as u32);
        });
    }

    fn update_mesh(&mut self, mesh: &mut WgpuMesh, bodies: &[BodyInstance]) {
        let count = bodies.len().min(mesh.capacity);
        self.gpu.queue.write_buffer(&mesh.buffer, 0, bytemuck::cast_slice(&bodies[..count]));
        mesh.count = count as u32;
    }

    fn render_waves(&mut self, underwater: &WgpuTarget, mesh: &WgpuMesh, water: &WaterPlane, scale: f32, time_factor: f32) {
        self.write_viewport(scale);
        self.upload_heights(water, time_factor);
        let Some(heights) = self.heights.as_ref().map(|heights| heights.bind_group.clone()) else {
            return;
        };

        self.pass(|pass, pipelines, quad, viewport| {
            pass.set_pipeline(&pipelines.water);
            pass.set_bind_group(0, viewport, &[]);
            pass.set_bind_group(1, &underwater.bind_group, &[]);
            pass.set_bind_group(2, &heights, &[]);
            pass.set_vertex_buffer(0, quad.vertex_buffer.slice(..));
            pass.set_index_buffer(quad.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..quad.index_count, 0, 0..1);

            if mesh.count > 0 {
                pass.set_pipeline(&pipelines.shadow);
                pass.set_bind_group(0, viewport, &[]);
                pass.set_vertex_buffer(1, mesh.buffer.slice(..));
                pass.draw_indexed(0..quad.index_count, 0, 0..mesh.count);
            }
        });
    }

    fn present(&mut self, _atlas: &WgpuAtlas) -> Result<(), KoiError> {
        // A clear without any drawing after it still has to reach the target
        if self.frame.clear.is_some() {
            self.pass(|_, _, _, _| {});
        }

        let frame = std::mem::take(&mut self.frame);
        if let Some(encoder) = frame.encoder {
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(output) = frame.output {
            output.present();
        }
        Ok(())
    }
}
