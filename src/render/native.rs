use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use log::{info, warn};
use pollster::block_on;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::error::RenderError;
use crate::geometry::{Primitive, VertexLayout};
use crate::render::{
    FrameQueue, IdAllocator, MeshHandle, MeshId, QueuedDraw, RenderDevice, TextureHandle,
};
use crate::shader::{LinkedProgram, ProgramHandle, ProgramTable, UniformValue};
use crate::texture::{TextureImage, TextureSlot};

/// wgpu-backed device drawing into a window surface.
pub struct WgpuDevice {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    uniform_alignment: u64,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white: GpuTexture,
    ids: IdAllocator,
    meshes: HashMap<MeshId, MeshBuffer>,
    textures: HashMap<TextureHandle, GpuTexture>,
    programs: ProgramTable<ProgramPipeline>,
    frame: FrameQueue,
}

impl WgpuDevice {
    /// Creates the surface, device and shared layouts for `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(RenderError::window_init("surface", "window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| RenderError::window_init("surface", err))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::window_init("GPU adapter", err))?;
        info!("using adapter {}", adapter.get_info().name);

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("still-life-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .map_err(|err| RenderError::window_init("GPU device", err))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(surface_format) = pick_surface_format(&surface_caps.formats) else {
            return Err(RenderError::window_init("surface", "no supported surface formats"));
        };

        // Fifo paces the loop on vsync.
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let uniform_alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program-uniform-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("repeat-linear-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white = GpuTexture::upload(
            &device,
            &queue,
            &texture_layout,
            &sampler,
            &TextureImage::white(),
            "default-white",
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            uniform_alignment,
            uniform_layout,
            texture_layout,
            sampler,
            white,
            ids: IdAllocator::default(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            programs: ProgramTable::default(),
            frame: FrameQueue::default(),
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Reconfigures the surface and depth buffer. Zero-sized requests (minimized windows) are ignored.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    fn build_pipeline(&self, program: &LinkedProgram) -> Result<ProgramPipeline, RenderError> {
        let label = program.label();
        let layout = vertex_layout_for(program.vertex_inputs());
        let attributes = vertex_attributes(layout, program.vertex_inputs());

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label}-vertex")),
            source: wgpu::ShaderSource::Wgsl(program.vertex().source().into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label}-fragment")),
            source: wgpu::ShaderSource::Wgsl(program.fragment().source().into()),
        });

        let mut bind_group_layouts = vec![&self.uniform_layout];
        if program.samples_texture() {
            bind_group_layouts.push(&self.texture_layout);
        }
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label}-layout")),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: layout.stride_bytes(),
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ShaderLink {
                program: label.to_owned(),
                log: err.to_string(),
            });
        }

        let block_size = u64::from(program.uniforms().size()).max(16);
        let uniforms = UniformStaging::new(
            &self.device,
            &self.uniform_layout,
            label,
            block_size,
            align_up(block_size, self.uniform_alignment),
            1,
        );
        Ok(ProgramPipeline {
            pipeline,
            layout,
            samples_texture: program.samples_texture(),
            uniforms,
        })
    }

    /// Packs each program's per-draw uniform snapshots into its dynamic buffer
    /// and returns the byte offset of every draw.
    fn stage_uniforms(&mut self, draws: &[QueuedDraw]) -> Vec<Option<u32>> {
        let mut packed: HashMap<ProgramHandle, Vec<u8>> = HashMap::new();
        let offsets = draws
            .iter()
            .map(|draw| {
                let slot = self.programs.get(draw.program)?;
                let stride = slot.backend.uniforms.stride as usize;
                let data = packed.entry(draw.program).or_default();
                let offset = data.len();
                data.extend_from_slice(&draw.uniforms);
                data.resize(offset + stride, 0);
                Some(offset as u32)
            })
            .collect();

        for (handle, data) in packed {
            let Some(slot) = self.programs.get_mut(handle) else {
                continue;
            };
            let staging = &mut slot.backend.uniforms;
            let needed = data.len() as u64 / staging.stride;
            if needed > staging.capacity {
                *staging = UniformStaging::new(
                    &self.device,
                    &self.uniform_layout,
                    slot.program.label(),
                    staging.block_size,
                    staging.stride,
                    needed.next_power_of_two(),
                );
            }
            self.queue.write_buffer(&staging.buffer, 0, &data);
        }
        offsets
    }
}

impl RenderDevice for WgpuDevice {
    fn create_mesh(&mut self, primitive: &Primitive) -> Result<MeshHandle, RenderError> {
        let id = self.ids.mesh();
        let contents: &[u8] = bytemuck::cast_slice(primitive.vertices());
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-vertices", primitive.id())),
            contents,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let handle = MeshHandle::from_byte_len(id, contents.len() as u64, primitive.layout());
        self.meshes.insert(
            id,
            MeshBuffer {
                buffer,
                layout: primitive.layout(),
            },
        );
        Ok(handle)
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        match self.meshes.remove(&mesh.id) {
            Some(buffer) => buffer.buffer.destroy(),
            None => warn!("{} released twice", mesh.id),
        }
        self.frame.forget_mesh(mesh.id);
    }

    fn create_texture(
        &mut self,
        slot: TextureSlot,
        image: &TextureImage,
    ) -> Result<TextureHandle, RenderError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if image.width > max || image.height > max {
            return Err(RenderError::TextureLoad {
                path: slot.file_name().into(),
                reason: format!(
                    "{}x{} exceeds the device limit of {max}",
                    image.width, image.height
                ),
            });
        }
        let handle = self.ids.texture();
        let texture = GpuTexture::upload(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.sampler,
            image,
            slot.file_name(),
        );
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture) {
            Some(gpu) => gpu.texture.destroy(),
            None => warn!("{texture} released twice"),
        }
        self.frame.forget_texture(texture);
    }

    fn create_program(&mut self, program: LinkedProgram) -> Result<ProgramHandle, RenderError> {
        let pipeline = self.build_pipeline(&program)?;
        Ok(self.programs.insert(program, pipeline))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        match self.programs.remove(program) {
            Some(slot) => slot.backend.uniforms.buffer.destroy(),
            None => warn!("{program} released twice"),
        }
        self.frame.forget_program(program);
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue) {
        self.programs.set_uniform(program, name, value);
    }

    fn viewport_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.frame.clear(color);
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.frame.use_program(program);
    }

    fn bind_mesh(&mut self, mesh: MeshHandle) {
        self.frame.bind_mesh(mesh);
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.frame.bind_texture(texture);
    }

    fn draw_triangles(&mut self, vertex_count: u32) {
        let Some(slot) = self.frame.program().and_then(|program| self.programs.get(program)) else {
            warn!("draw issued without a live program; skipped");
            return;
        };
        self.frame.push(vertex_count, slot.uniforms.bytes());
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let (clear, draws) = self.frame.take();

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.window.inner_size();
                self.resize(size);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
                return Ok(());
            }
            Err(err) => return Err(RenderError::DeviceLost(err.to_string())),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let offsets = self.stage_uniforms(&draws);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        let [r, g, b, a] = clear.unwrap_or([0.0, 0.0, 0.0, 1.0]).map(f64::from);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for (draw, offset) in draws.iter().zip(offsets) {
            let (Some(offset), Some(slot), Some(mesh)) = (
                offset,
                self.programs.get(draw.program),
                self.meshes.get(&draw.mesh.id),
            ) else {
                continue;
            };
            let program = &slot.backend;
            if mesh.layout != program.layout {
                warn!(
                    "{} does not match the vertex layout of `{}`; draw skipped",
                    draw.mesh.id,
                    slot.program.label()
                );
                continue;
            }

            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &program.uniforms.bind_group, &[offset]);
            if program.samples_texture {
                let texture = draw
                    .texture
                    .and_then(|handle| self.textures.get(&handle))
                    .unwrap_or(&self.white);
                pass.set_bind_group(1, &texture.bind_group, &[]);
            }
            pass.set_vertex_buffer(0, mesh.buffer.slice(..));
            pass.draw(0..draw.vertex_count, 0..1);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// Texels are stored and lit as-is, without sRGB decoding.
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// First non-sRGB format offered, else the first format.
fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|format| !format.is_srgb())
        .or_else(|| formats.first())
        .copied()
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

fn vertex_layout_for(inputs: &[u32]) -> VertexLayout {
    if inputs.iter().any(|&location| location > 0) {
        VertexLayout::PositionNormalUv
    } else {
        VertexLayout::Position
    }
}

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const POSITION_NORMAL_UV_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

fn vertex_attributes(layout: VertexLayout, inputs: &[u32]) -> Vec<wgpu::VertexAttribute> {
    let all: &[wgpu::VertexAttribute] = match layout {
        VertexLayout::Position => &POSITION_ATTRIBUTES,
        VertexLayout::PositionNormalUv => &POSITION_NORMAL_UV_ATTRIBUTES,
    };
    all.iter()
        .filter(|attribute| inputs.contains(&attribute.shader_location))
        .copied()
        .collect()
}

struct MeshBuffer {
    buffer: wgpu::Buffer,
    layout: VertexLayout,
}

struct ProgramPipeline {
    pipeline: wgpu::RenderPipeline,
    layout: VertexLayout,
    samples_texture: bool,
    uniforms: UniformStaging,
}

/// Dynamic-offset uniform buffer holding one block per draw of a program.
struct UniformStaging {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    block_size: u64,
    stride: u64,
    capacity: u64,
}

impl UniformStaging {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        block_size: u64,
        stride: u64,
        capacity: u64,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}-uniforms")),
            size: stride * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-uniform-group")),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(block_size),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            block_size,
            stride,
            capacity,
        }
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl GpuTexture {
    fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        image: &TextureImage,
        label: &str,
    ) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: image.width,
                    height: image.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &image.pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-group")),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Self {
            texture,
            bind_group,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
