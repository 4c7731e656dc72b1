use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroU64;
use std::ops::Range;

use glam::Mat4;
use winit::dpi::PhysicalSize;

use crate::coords::PixelRect;
use crate::error::{RenderError, Result};
use crate::paint::Color;

use super::api::GraphicsDevice;
use super::frame::GpuFrame;
use super::gpu::Gpu;
use super::types::{
    AttributePointer, BufferId, BufferTarget, BufferUsage, Capability, FrameStatus, Primitive,
    RenderApi, ScalarType, ShaderDesc, ShaderId, TextureId, TextureKind, TextureOptions,
    TextureWrap, VertexArrayId,
};
use super::SurfaceErrorAction;

const TRANSFORM_SIZE: u64 = std::mem::size_of::<[f32; 16]>() as u64;

/// `GraphicsDevice` backed by wgpu.
///
/// Buffers live as CPU shadows. Each draw copies the bytes it reads into
/// per-frame vertex/index streams, so a draw always sees the buffer exactly
/// as it was when the draw was issued, even if the buffer is cleared and
/// refilled later in the same frame. `end_frame` uploads the streams and
/// replays every recorded draw in one render pass.
pub struct WgpuDevice {
    gpu: Gpu,
    next_id: u32,

    buffers: HashMap<BufferId, ShadowBuffer>,
    vertex_arrays: HashSet<VertexArrayId>,
    shaders: HashMap<ShaderId, ShaderProgram>,
    textures: HashMap<TextureId, GpuTexture>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    bound_vertex: Option<BufferId>,
    bound_index: Option<BufferId>,
    program: Option<ShaderId>,
    active_unit: u32,
    bound_textures: HashMap<(u32, TextureKind), TextureId>,
    attributes: BTreeMap<u32, AttributePointer>,
    transform: Mat4,
    viewport: Option<PixelRect>,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    uniform_stride: u64,

    frame: Option<PendingFrame>,
    staging: FrameStreams,
    vertex_stream: StreamBuffer,
    index_stream: StreamBuffer,
    uniform_stream: StreamBuffer,
    uniform_bind_group: Option<wgpu::BindGroup>,

    warned: HashSet<&'static str>,
}

struct ShadowBuffer {
    target: BufferTarget,
    data: Vec<u8>,
}

struct ShaderProgram {
    label: String,
    module: wgpu::ShaderModule,
    attributes: HashMap<String, u32>,
    textured: bool,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: ShaderId,
    stride: u32,
    attributes: Vec<(u32, wgpu::VertexFormat, u32)>,
    topology: wgpu::PrimitiveTopology,
}

struct PendingFrame {
    gpu_frame: GpuFrame,
    clear: Option<Color>,
    draws: Vec<RecordedDraw>,
}

struct RecordedDraw {
    pipeline: PipelineKey,
    viewport: PixelRect,
    uniform_offset: u32,
    texture: Option<TextureId>,
    vertices: Range<u64>,
    kind: DrawKind,
}

enum DrawKind {
    Arrays { count: u32 },
    Elements { indices: Range<u64>, count: u32 },
}

#[derive(Default)]
struct FrameStreams {
    vertices: Vec<u8>,
    indices: Vec<u8>,
    uniforms: Vec<u8>,
}

impl FrameStreams {
    fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.uniforms.clear();
    }
}

/// Appends `bytes` at a 4-byte aligned offset and returns the written range.
fn push_aligned(stream: &mut Vec<u8>, bytes: &[u8], align: usize) -> Range<u64> {
    let start = stream.len().next_multiple_of(align);
    stream.resize(start, 0);
    stream.extend_from_slice(bytes);
    start as u64..stream.len() as u64
}

/// GPU buffer that only ever grows.
struct StreamBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
}

impl StreamBuffer {
    fn new(label: &'static str, usage: wgpu::BufferUsages) -> Self {
        Self {
            label,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            buffer: None,
            capacity: 0,
        }
    }

    /// Uploads `bytes`, reallocating when they do not fit. Returns true if
    /// the underlying buffer was replaced.
    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &mut Vec<u8>) -> bool {
        let padded = bytes.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
        bytes.resize(padded, 0);

        let mut replaced = false;
        if self.buffer.is_none() || padded as u64 > self.capacity {
            let capacity = (padded as u64).next_power_of_two().max(64 * 1024);
            log::debug!("{}: growing stream {} -> {} bytes", self.label, self.capacity, capacity);
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: capacity,
                usage: self.usage,
                mapped_at_creation: false,
            }));
            self.capacity = capacity;
            replaced = true;
        }

        if let Some(buffer) = &self.buffer {
            if !bytes.is_empty() {
                queue.write_buffer(buffer, 0, bytes);
            }
        }
        replaced
    }
}

impl WgpuDevice {
    pub fn new(gpu: Gpu) -> Self {
        let device = gpu.device();

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("universe transform bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(TRANSFORM_SIZE),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("universe texture bgl"),
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

        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = TRANSFORM_SIZE.next_multiple_of(align.max(1));

        Self {
            gpu,
            next_id: 1,
            buffers: HashMap::new(),
            vertex_arrays: HashSet::new(),
            shaders: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            bound_vertex: None,
            bound_index: None,
            program: None,
            active_unit: 0,
            bound_textures: HashMap::new(),
            attributes: BTreeMap::new(),
            transform: Mat4::IDENTITY,
            viewport: None,
            uniform_layout,
            texture_layout,
            uniform_stride,
            frame: None,
            staging: FrameStreams::default(),
            vertex_stream: StreamBuffer::new("universe vertex stream", wgpu::BufferUsages::VERTEX),
            index_stream: StreamBuffer::new("universe index stream", wgpu::BufferUsages::INDEX),
            uniform_stream: StreamBuffer::new("universe transform ring", wgpu::BufferUsages::UNIFORM),
            uniform_bind_group: None,
            warned: HashSet::new(),
        }
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn warn_once(&mut self, key: &'static str, message: &str) {
        if self.warned.insert(key) {
            log::warn!("{message}");
        }
    }

    fn shadow_mut(&mut self, target: BufferTarget) -> Result<&mut ShadowBuffer> {
        let id = match target {
            BufferTarget::Vertex => self.bound_vertex,
            BufferTarget::Index => self.bound_index,
        }
        .ok_or_else(|| RenderError::usage(target.to_string(), "no buffer bound"))?;
        self.buffers
            .get_mut(&id)
            .ok_or_else(|| RenderError::resource(id.to_string(), "deleted while bound"))
    }

    /// Builds the pipeline key for the current program and enabled
    /// attributes. Every input the shader declares must be enabled.
    fn current_layout(&self, topology: wgpu::PrimitiveTopology) -> Result<(PipelineKey, bool)> {
        let shader_id = self
            .program
            .ok_or_else(|| RenderError::usage("draw", "no shader program in use"))?;
        let shader = self
            .shaders
            .get(&shader_id)
            .ok_or_else(|| RenderError::resource(shader_id.to_string(), "unknown shader"))?;

        let mut stride = None;
        let mut attributes = Vec::with_capacity(shader.attributes.len());
        for (name, &location) in &shader.attributes {
            let pointer = self.attributes.get(&location).ok_or_else(|| {
                RenderError::mismatch(
                    shader.label.clone(),
                    format!("input `{name}` at location {location} is not enabled"),
                )
            })?;
            let format = vertex_format(pointer).ok_or_else(|| {
                RenderError::mismatch(
                    shader.label.clone(),
                    format!(
                        "{}x{:?} has no vertex format",
                        pointer.components, pointer.scalar
                    ),
                )
            })?;
            match stride {
                None => stride = Some(pointer.stride),
                Some(s) if s != pointer.stride => {
                    return Err(RenderError::mismatch(
                        shader.label.clone(),
                        "enabled attributes disagree on stride",
                    ));
                }
                Some(_) => {}
            }
            attributes.push((location, format, pointer.offset));
        }
        attributes.sort_unstable_by_key(|a| a.0);

        let key = PipelineKey {
            shader: shader_id,
            stride: stride.unwrap_or(0),
            attributes,
            topology,
        };
        Ok((key, shader.textured))
    }

    fn bound_texture_for(&self, textured: bool) -> Result<Option<TextureId>> {
        if !textured {
            return Ok(None);
        }
        self.bound_textures
            .get(&(0, TextureKind::D2))
            .copied()
            .map(Some)
            .ok_or_else(|| RenderError::usage("draw", "textured shader with no 2D texture on unit 0"))
    }

    fn record(&mut self, mode: Primitive, first: u32, count: u32, indexed: bool) -> Result<()> {
        if self.frame.is_none() {
            return Err(RenderError::usage("draw", "issued outside begin_frame/end_frame"));
        }
        let topology = topology(mode);
        let (pipeline, textured) = self.current_layout(topology)?;
        let texture = self.bound_texture_for(textured)?;
        let stride = pipeline.stride as usize;

        let vertex_data = bound_data(&self.buffers, self.bound_vertex, BufferTarget::Vertex)?;

        // Indices to draw, relative to the copied vertex range.
        let (vertex_bytes, indices): (&[u8], Option<Vec<u16>>) = if indexed {
            let index_data = bound_data(&self.buffers, self.bound_index, BufferTarget::Index)?;
            let start = first as usize * 2;
            let end = start + count as usize * 2;
            if end > index_data.len() {
                return Err(RenderError::capacity("draw_elements", end, index_data.len()));
            }
            let raw: Vec<u16> = index_data[start..end]
                .chunks_exact(2)
                .map(|b| u16::from_ne_bytes([b[0], b[1]]))
                .collect();
            let max = raw.iter().copied().max().map_or(0, |m| m as usize + 1);
            let bytes = max * stride;
            if bytes > vertex_data.len() {
                return Err(RenderError::capacity("draw_elements vertices", bytes, vertex_data.len()));
            }
            let list = if mode == Primitive::TriangleFan { fan_to_list(&raw) } else { raw };
            (&vertex_data[..bytes], Some(list))
        } else {
            let start = first as usize * stride;
            let end = start + count as usize * stride;
            if end > vertex_data.len() {
                return Err(RenderError::capacity("draw_arrays", end, vertex_data.len()));
            }
            let list = if mode == Primitive::TriangleFan {
                let count = u16::try_from(count)
                    .map_err(|_| RenderError::capacity("triangle fan", count as usize, u16::MAX as usize))?;
                Some(fan_to_list(&(0..count).collect::<Vec<_>>()))
            } else {
                None
            };
            (&vertex_data[start..end], list)
        };

        let vertices = push_aligned(&mut self.staging.vertices, vertex_bytes, 4);
        let kind = match indices {
            Some(list) => DrawKind::Elements {
                count: list.len() as u32,
                indices: push_aligned(&mut self.staging.indices, bytemuck::cast_slice(&list), 4),
            },
            None => DrawKind::Arrays { count },
        };

        let transform = self.transform.to_cols_array();
        let uniform_offset =
            push_aligned(&mut self.staging.uniforms, bytemuck::cast_slice(&transform), self.uniform_stride as usize)
                .start as u32;

        let size = self.gpu.size();
        let viewport = self
            .viewport
            .unwrap_or(PixelRect::new(0, 0, size.width, size.height));

        if let Some(frame) = self.frame.as_mut() {
            frame.draws.push(RecordedDraw {
                pipeline,
                viewport,
                uniform_offset,
                texture,
                vertices,
                kind,
            });
        }
        Ok(())
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let shader = self
            .shaders
            .get(&key.shader)
            .ok_or_else(|| RenderError::resource(key.shader.to_string(), "deleted before frame end"))?;
        let device = self.gpu.device();

        let layouts: &[&wgpu::BindGroupLayout] = if shader.textured {
            &[&self.uniform_layout, &self.texture_layout]
        } else {
            &[&self.uniform_layout]
        };
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("universe pipeline layout"),
            bind_group_layouts: layouts,
            immediate_size: 0,
        });

        let attributes: Vec<wgpu::VertexAttribute> = key
            .attributes
            .iter()
            .map(|&(location, format, offset)| wgpu::VertexAttribute {
                format,
                offset: offset as u64,
                shader_location: location,
            })
            .collect();

        let strip = matches!(
            key.topology,
            wgpu::PrimitiveTopology::LineStrip | wgpu::PrimitiveTopology::TriangleStrip
        );

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&shader.label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader.module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: key.stride as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader.module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.surface_format(),
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format: strip.then_some(wgpu::IndexFormat::Uint16),
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!(
            "created pipeline for {} ({:?}, stride {})",
            shader.label,
            key.topology,
            key.stride
        );
        self.pipelines.insert(key.clone(), pipeline);
        Ok(())
    }

    fn upload_streams(&mut self) {
        let device = self.gpu.device();
        let queue = self.gpu.queue();
        self.vertex_stream.upload(device, queue, &mut self.staging.vertices);
        self.index_stream.upload(device, queue, &mut self.staging.indices);
        let replaced = self
            .uniform_stream
            .upload(device, queue, &mut self.staging.uniforms);

        if replaced || self.uniform_bind_group.is_none() {
            if let Some(buffer) = &self.uniform_stream.buffer {
                self.uniform_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("universe transform bind group"),
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: 0,
                            size: NonZeroU64::new(TRANSFORM_SIZE),
                        }),
                    }],
                }));
            }
        }
    }

    fn create_sampler(&self, options: TextureOptions) -> wgpu::Sampler {
        let mipmap_filter = if options.mipmap {
            wgpu::MipmapFilterMode::Linear
        } else {
            wgpu::MipmapFilterMode::Nearest
        };
        // wgpu requires every filter to be linear once the clamp exceeds 1.
        let (mipmap_filter, anisotropy_clamp) = if options.anisotropic {
            (wgpu::MipmapFilterMode::Linear, MAX_ANISOTROPY)
        } else {
            (mipmap_filter, 1)
        };
        self.gpu.device().create_sampler(&wgpu::SamplerDescriptor {
            label: Some("universe texture sampler"),
            address_mode_u: address_mode(options.wrap_s),
            address_mode_v: address_mode(options.wrap_t),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter,
            anisotropy_clamp,
            ..Default::default()
        })
    }
}

const MAX_ANISOTROPY: u16 = 16;

fn address_mode(wrap: TextureWrap) -> wgpu::AddressMode {
    match wrap {
        TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
        TextureWrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

/// One mip level: width, height and tightly packed RGBA8 texels.
type MipLevel = (u32, u32, Vec<u8>);

/// Levels below the base image, each a 2x2 box filter of the one above,
/// down to 1x1. A dimension already at 1 samples its single row or column twice.
fn mip_chain(width: u32, height: u32, rgba: &[u8]) -> Vec<MipLevel> {
    let mut levels: Vec<MipLevel> = Vec::new();
    let (mut w, mut h) = (width, height);
    let mut src = rgba.to_vec();
    while w > 1 || h > 1 {
        let (nw, nh) = ((w / 2).max(1), (h / 2).max(1));
        let mut dst = vec![0u8; nw as usize * nh as usize * 4];
        for y in 0..nh {
            for x in 0..nw {
                let xs = [(2 * x).min(w - 1), (2 * x + 1).min(w - 1)];
                let ys = [(2 * y).min(h - 1), (2 * y + 1).min(h - 1)];
                for c in 0..4 {
                    let mut sum = 0u32;
                    for sy in ys {
                        for sx in xs {
                            sum += src[((sy * w + sx) * 4 + c) as usize] as u32;
                        }
                    }
                    dst[((y * nw + x) * 4 + c) as usize] = ((sum + 2) / 4) as u8;
                }
            }
        }
        levels.push((nw, nh, dst.clone()));
        (w, h, src) = (nw, nh, dst);
    }
    levels
}

impl GraphicsDevice for WgpuDevice {
    fn api(&self) -> RenderApi {
        RenderApi::Wgpu
    }

    fn create_buffer(&mut self, target: BufferTarget, _usage: BufferUsage) -> Result<BufferId> {
        let id = BufferId::new(self.next());
        self.buffers.insert(id, ShadowBuffer { target, data: Vec::new() });
        Ok(id)
    }

    fn delete_buffer(&mut self, id: BufferId) -> Result<()> {
        self.buffers
            .remove(&id)
            .ok_or_else(|| RenderError::resource(id.to_string(), "unknown or already deleted"))?;
        if self.bound_vertex == Some(id) {
            self.bound_vertex = None;
        }
        if self.bound_index == Some(id) {
            self.bound_index = None;
        }
        Ok(())
    }

    fn bind_buffer(&mut self, target: BufferTarget, id: Option<BufferId>) -> Result<()> {
        if let Some(id) = id {
            let shadow = self
                .buffers
                .get(&id)
                .ok_or_else(|| RenderError::resource(id.to_string(), "unknown buffer"))?;
            if shadow.target != target {
                return Err(RenderError::mismatch(
                    id.to_string(),
                    format!("created as {} but bound as {target}", shadow.target),
                ));
            }
        }
        match target {
            BufferTarget::Vertex => self.bound_vertex = id,
            BufferTarget::Index => self.bound_index = id,
        }
        Ok(())
    }

    fn buffer_data(&mut self, target: BufferTarget, size: usize, data: &[u8]) -> Result<()> {
        if data.len() > size {
            return Err(RenderError::capacity(target.to_string(), data.len(), size));
        }
        let shadow = self.shadow_mut(target)?;
        shadow.data.clear();
        shadow.data.resize(size, 0);
        shadow.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) -> Result<()> {
        let shadow = self.shadow_mut(target)?;
        let end = offset + data.len();
        if end > shadow.data.len() {
            return Err(RenderError::capacity(target.to_string(), end, shadow.data.len()));
        }
        shadow.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayId> {
        let id = VertexArrayId::new(self.next());
        self.vertex_arrays.insert(id);
        Ok(id)
    }

    fn delete_vertex_array(&mut self, id: VertexArrayId) -> Result<()> {
        if !self.vertex_arrays.remove(&id) {
            return Err(RenderError::resource(id.to_string(), "unknown or already deleted"));
        }
        Ok(())
    }

    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) -> Result<()> {
        // Input layouts are baked into pipelines; the handle only has to exist.
        if let Some(id) = id {
            if !self.vertex_arrays.contains(&id) {
                return Err(RenderError::resource(id.to_string(), "unknown vertex array"));
            }
        }
        Ok(())
    }

    fn enable_attribute(&mut self, location: u32, pointer: AttributePointer) -> Result<()> {
        self.attributes.insert(location, pointer);
        Ok(())
    }

    fn disable_attribute(&mut self, location: u32) -> Result<()> {
        self.attributes.remove(&location);
        Ok(())
    }

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId> {
        let module = self
            .gpu
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.wgsl.into()),
            });
        let id = ShaderId::new(self.next());
        self.shaders.insert(
            id,
            ShaderProgram {
                label: desc.label.to_string(),
                module,
                attributes: desc
                    .attributes
                    .iter()
                    .map(|(name, loc)| (name.to_string(), *loc))
                    .collect(),
                textured: desc.textured,
            },
        );
        Ok(id)
    }

    fn delete_shader(&mut self, id: ShaderId) -> Result<()> {
        self.shaders
            .remove(&id)
            .ok_or_else(|| RenderError::resource(id.to_string(), "unknown or already deleted"))?;
        self.pipelines.retain(|key, _| key.shader != id);
        if self.program == Some(id) {
            self.program = None;
        }
        Ok(())
    }

    fn use_shader(&mut self, id: Option<ShaderId>) -> Result<()> {
        if let Some(id) = id {
            if !self.shaders.contains_key(&id) {
                return Err(RenderError::resource(id.to_string(), "unknown shader"));
            }
        }
        self.program = id;
        Ok(())
    }

    fn attribute_location(&self, shader: ShaderId, name: &str) -> Result<Option<u32>> {
        let program = self
            .shaders
            .get(&shader)
            .ok_or_else(|| RenderError::resource(shader.to_string(), "unknown shader"))?;
        Ok(program.attributes.get(name).copied())
    }

    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
        rgba: &[u8],
        options: TextureOptions,
    ) -> Result<TextureId> {
        if kind != TextureKind::D2 {
            return Err(RenderError::mismatch(
                "texture upload",
                format!("{kind:?} textures are not supported by the wgpu backend"),
            ));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected || width == 0 || height == 0 {
            return Err(RenderError::mismatch(
                "texture upload",
                format!("expected {expected} bytes of RGBA8, got {}", rgba.len()),
            ));
        }

        let mips = if options.mipmap {
            mip_chain(width, height, rgba)
        } else {
            Vec::new()
        };
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("universe texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1 + mips.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let base = std::iter::once((width, height, rgba));
        let levels = mips.iter().map(|(w, h, data)| (*w, *h, data.as_slice()));
        for (level, (w, h, data)) in base.chain(levels).enumerate() {
            self.gpu.queue().write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * w),
                    rows_per_image: Some(h),
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
        }

        let sampler = self.create_sampler(options);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self
            .gpu
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("universe texture bind group"),
                layout: &self.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            });

        let id = TextureId::new(self.next());
        self.textures.insert(
            id,
            GpuTexture {
                _texture: texture,
                bind_group,
            },
        );
        Ok(id)
    }

    fn delete_texture(&mut self, id: TextureId) -> Result<()> {
        self.textures
            .remove(&id)
            .ok_or_else(|| RenderError::resource(id.to_string(), "unknown or already deleted"))?;
        self.bound_textures.retain(|_, bound| *bound != id);
        Ok(())
    }

    fn active_texture_unit(&mut self, unit: u32) -> Result<()> {
        self.active_unit = unit;
        Ok(())
    }

    fn bind_texture(&mut self, kind: TextureKind, id: Option<TextureId>) -> Result<()> {
        let slot = (self.active_unit, kind);
        match id {
            Some(id) => {
                if !self.textures.contains_key(&id) {
                    return Err(RenderError::resource(id.to_string(), "unknown texture"));
                }
                self.bound_textures.insert(slot, id);
            }
            None => {
                self.bound_textures.remove(&slot);
            }
        }
        Ok(())
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) -> Result<()> {
        if enabled {
            match capability {
                Capability::DepthTest => {
                    self.warn_once("depth", "depth testing is not supported by the wgpu backend")
                }
                Capability::StencilTest => {
                    self.warn_once("stencil", "stencil testing is not supported by the wgpu backend")
                }
            }
        }
        Ok(())
    }

    fn set_transform(&mut self, matrix: Mat4) -> Result<()> {
        self.transform = matrix;
        Ok(())
    }

    fn set_viewport(&mut self, rect: PixelRect) -> Result<()> {
        self.viewport = Some(rect);
        Ok(())
    }

    fn clear(&mut self, color: Color) -> Result<()> {
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| RenderError::usage("clear", "issued outside begin_frame/end_frame"))?;
        if !frame.draws.is_empty() {
            log::debug!("clear after draws in the same frame; earlier draws are discarded");
            frame.draws.clear();
        }
        frame.clear = Some(color);
        Ok(())
    }

    fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.record(mode, first, count, false)
    }

    fn draw_elements(&mut self, mode: Primitive, first: u32, count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.record(mode, first, count, true)
    }

    fn begin_frame(&mut self) -> Result<FrameStatus> {
        if self.frame.is_some() {
            return Err(RenderError::usage("frame", "begin_frame called twice"));
        }
        let size = self.gpu.size();
        if size.width == 0 || size.height == 0 {
            return Ok(FrameStatus::Skipped);
        }

        match self.gpu.begin_frame() {
            Ok(gpu_frame) => {
                self.staging.clear();
                self.frame = Some(PendingFrame {
                    gpu_frame,
                    clear: None,
                    draws: Vec::new(),
                });
                Ok(FrameStatus::Ready)
            }
            Err(err) => {
                let message = err.to_string();
                match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Reconfigured => {
                        log::warn!("surface reconfigured after: {message}");
                        Ok(FrameStatus::Skipped)
                    }
                    SurfaceErrorAction::SkipFrame => Ok(FrameStatus::Skipped),
                    SurfaceErrorAction::Fatal => {
                        log::error!("fatal surface error: {message}");
                        Err(RenderError::Device(message))
                    }
                }
            }
        }
    }

    fn end_frame(&mut self) -> Result<()> {
        let Some(mut frame) = self.frame.take() else {
            return Err(RenderError::usage("frame", "end_frame without begin_frame"));
        };

        for draw in &frame.draws {
            self.ensure_pipeline(&draw.pipeline)?;
        }
        self.upload_streams();

        let surface = self.gpu.size();
        {
            let load = match frame.clear {
                Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: c.r as f64,
                    g: c.g as f64,
                    b: c.b as f64,
                    a: c.a as f64,
                }),
                None => wgpu::LoadOp::Load,
            };
            let mut rpass = frame
                .gpu_frame
                .encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("universe scene pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &frame.gpu_frame.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                });

            let (Some(vertex_buffer), Some(uniform_group)) =
                (self.vertex_stream.buffer.as_ref(), self.uniform_bind_group.as_ref())
            else {
                drop(rpass);
                self.gpu.submit(frame.gpu_frame);
                return Ok(());
            };

            for draw in &frame.draws {
                let Some(viewport) = clamp_viewport(draw.viewport, surface) else {
                    continue;
                };
                let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                    continue;
                };

                rpass.set_viewport(
                    viewport.x as f32,
                    viewport.y as f32,
                    viewport.width as f32,
                    viewport.height as f32,
                    0.0,
                    1.0,
                );
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, uniform_group, &[draw.uniform_offset]);
                if let Some(texture) = draw.texture.and_then(|t| self.textures.get(&t)) {
                    rpass.set_bind_group(1, &texture.bind_group, &[]);
                }
                rpass.set_vertex_buffer(0, vertex_buffer.slice(draw.vertices.clone()));

                match &draw.kind {
                    DrawKind::Arrays { count } => rpass.draw(0..*count, 0..1),
                    DrawKind::Elements { indices, count } => {
                        if let Some(index_buffer) = self.index_stream.buffer.as_ref() {
                            rpass.set_index_buffer(
                                index_buffer.slice(indices.clone()),
                                wgpu::IndexFormat::Uint16,
                            );
                            rpass.draw_indexed(0..*count, 0, 0..1);
                        }
                    }
                }
            }
        }

        self.gpu.submit(frame.gpu_frame);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(PhysicalSize::new(width, height));
    }
}

fn bound_data(
    buffers: &HashMap<BufferId, ShadowBuffer>,
    bound: Option<BufferId>,
    target: BufferTarget,
) -> Result<&[u8]> {
    let id = bound.ok_or_else(|| RenderError::usage(target.to_string(), "no buffer bound"))?;
    buffers
        .get(&id)
        .map(|b| b.data.as_slice())
        .ok_or_else(|| RenderError::resource(id.to_string(), "deleted while bound"))
}

fn topology(mode: Primitive) -> wgpu::PrimitiveTopology {
    match mode {
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
        Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Primitive::Triangles | Primitive::TriangleFan => wgpu::PrimitiveTopology::TriangleList,
        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn vertex_format(p: &AttributePointer) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    use ScalarType as S;

    Some(match (p.scalar, p.components) {
        (S::Float, 1) => F::Float32,
        (S::Float, 2) => F::Float32x2,
        (S::Float, 3) => F::Float32x3,
        (S::Float, 4) => F::Float32x4,
        (S::Int, 1) => F::Sint32,
        (S::Int, 2) => F::Sint32x2,
        (S::Int, 3) => F::Sint32x3,
        (S::Int, 4) => F::Sint32x4,
        (S::UnsignedInt, 1) => F::Uint32,
        (S::UnsignedInt, 2) => F::Uint32x2,
        (S::UnsignedInt, 3) => F::Uint32x3,
        (S::UnsignedInt, 4) => F::Uint32x4,
        (S::Short, 2) => F::Sint16x2,
        (S::Short, 4) => F::Sint16x4,
        (S::UnsignedShort, 2) => F::Uint16x2,
        (S::UnsignedShort, 4) => F::Uint16x4,
        (S::Byte, 2) => F::Sint8x2,
        (S::Byte, 4) => F::Sint8x4,
        (S::UnsignedByte, 2) => F::Uint8x2,
        (S::UnsignedByte, 4) => F::Uint8x4,
        (S::Double, 1) => F::Float64,
        (S::Double, 2) => F::Float64x2,
        (S::Double, 3) => F::Float64x3,
        (S::Double, 4) => F::Float64x4,
        _ => return None,
    })
}

/// Expands a triangle fan into a triangle list.
fn fan_to_list(fan: &[u16]) -> Vec<u16> {
    let Some((&hub, rim)) = fan.split_first() else {
        return Vec::new();
    };
    rim.windows(2)
        .flat_map(|pair| [hub, pair[0], pair[1]])
        .collect()
}

fn clamp_viewport(rect: PixelRect, surface: PhysicalSize<u32>) -> Option<PixelRect> {
    let x = rect.x.min(surface.width);
    let y = rect.y.min(surface.height);
    let clamped = PixelRect::new(
        x,
        y,
        rect.width.min(surface.width - x),
        rect.height.min(surface.height - y),
    );
    (!clamped.is_empty()).then_some(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_becomes_list_around_first_vertex() {
        assert_eq!(fan_to_list(&[0, 1, 2, 3, 4]), vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
        assert_eq!(fan_to_list(&[5, 6]), Vec::<u16>::new());
        assert_eq!(fan_to_list(&[]), Vec::<u16>::new());
    }

    #[test]
    fn mip_chain_halves_down_to_one_texel() {
        let sizes: Vec<_> = mip_chain(4, 2, &[0; 32]).into_iter().map(|(w, h, _)| (w, h)).collect();
        assert_eq!(sizes, vec![(2, 1), (1, 1)]);
        assert!(mip_chain(1, 1, &[0; 4]).is_empty());
    }

    #[test]
    fn mip_texels_average_their_block() {
        #[rustfmt::skip]
        let rgba = [
            0, 0, 0, 255,      100, 0, 0, 255,
            200, 0, 0, 255,    100, 40, 0, 255,
        ];
        let chain = mip_chain(2, 2, &rgba);
        assert_eq!(chain, vec![(1, 1, vec![100, 10, 0, 255])]);
    }

    #[test]
    fn odd_sizes_round_down() {
        // 3x1 halves to 1x1 from the first two texels.
        let rgba = [0, 0, 0, 0, 20, 0, 0, 0, 80, 0, 0, 0];
        let chain = mip_chain(3, 1, &rgba);
        assert_eq!(chain[0], (1, 1, vec![10, 0, 0, 0]));
    }

    #[test]
    fn wrap_modes_map_to_address_modes() {
        assert_eq!(address_mode(TextureWrap::ClampToEdge), wgpu::AddressMode::ClampToEdge);
        assert_eq!(address_mode(TextureWrap::Repeat), wgpu::AddressMode::Repeat);
        assert_eq!(address_mode(TextureWrap::MirroredRepeat), wgpu::AddressMode::MirrorRepeat);
    }

    #[test]
    fn streams_align_each_chunk() {
        let mut stream = Vec::new();
        let a = push_aligned(&mut stream, &[1, 2, 3], 4);
        let b = push_aligned(&mut stream, &[4, 5], 4);
        assert_eq!(a, 0..3);
        assert_eq!(b, 4..6);

        let c = push_aligned(&mut stream, &[0; 64], 256);
        assert_eq!(c.start, 256);
    }

    #[test]
    fn viewport_is_clamped_to_surface() {
        let surface = PhysicalSize::new(100, 50);
        assert_eq!(
            clamp_viewport(PixelRect::new(80, 0, 40, 80), surface),
            Some(PixelRect::new(80, 0, 20, 50))
        );
        assert_eq!(clamp_viewport(PixelRect::new(100, 0, 10, 10), surface), None);
    }

    #[test]
    fn vertex_formats() {
        let p = |scalar, components| AttributePointer {
            components,
            scalar,
            stride: 16,
            offset: 0,
        };
        assert_eq!(vertex_format(&p(ScalarType::Float, 3)), Some(wgpu::VertexFormat::Float32x3));
        assert_eq!(vertex_format(&p(ScalarType::UnsignedByte, 4)), Some(wgpu::VertexFormat::Uint8x4));
        assert_eq!(vertex_format(&p(ScalarType::Short, 3)), None);
    }
}
