//! [`RenderDevice`] implementation on top of wgpu.
//!
//! Programs become render pipelines with layouts derived from the WGSL itself.
//! Every draw is encoded and submitted on its own so that the calling code can
//! interleave draws, clears and texture uploads in program order, exactly as
//! the pipelines issue them.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::error::RttError;
use crate::gpu::GpuContext;
use crate::shader::{self, SAMPLER_SUFFIX, ScalarKind, ShaderInterface, ShaderStage, encode_uniform};

use super::{
    BlendMode, BufferId, DrawCall, FilterMode, Primitive, ProgramDesc, ProgramId, RenderDevice,
    Target, TargetFormat, TextureDesc, TextureId, TextureRegion, TextureType, WrapMode,
};

const TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_DST)
    .union(wgpu::TextureUsages::COPY_SRC);

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    desc: TextureDesc,
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    interface: ShaderInterface,
    uniform_buffers: Vec<wgpu::Buffer>,
    /// CPU copy of every uniform block; values persist between draws.
    staging: Vec<Vec<u8>>,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    /// Capacity in bytes.
    size: u64,
}

struct Frame {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Renders pipelines on a wgpu device.
pub struct WgpuDevice {
    gpu: GpuContext,
    next_id: u32,
    textures: HashMap<TextureId, GpuTexture>,
    programs: HashMap<ProgramId, GpuProgram>,
    buffers: HashMap<BufferId, GpuBuffer>,
    placeholder: wgpu::TextureView,
    default_sampler: wgpu::Sampler,
    frame: Option<Frame>,
    /// Stands in for the surface when the context is headless.
    offscreen: Option<wgpu::Texture>,
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn topology(primitive: Primitive) -> wgpu::PrimitiveTopology {
    match primitive {
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
        Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

/// `None` for plain writes: 32-bit float targets reject any blend state.
fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Replace => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState {
                color: add,
                alpha: add,
            })
        }
    }
}

fn vertex_format(components: u32) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

fn to_unorm8(data: &[f32]) -> Vec<u8> {
    data.iter().map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8).collect()
}

impl WgpuDevice {
    pub fn new(gpu: GpuContext) -> Self {
        let placeholder = gpu
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("texchain placeholder"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        let default_sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("texchain default sampler"),
            ..Default::default()
        });

        let mut device = Self {
            gpu,
            next_id: 1,
            textures: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            placeholder,
            default_sampler,
            frame: None,
            offscreen: None,
        };
        device.recreate_offscreen();
        device
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// The headless render target, if this device has no window.
    pub fn offscreen(&self) -> Option<&wgpu::Texture> {
        self.offscreen.as_ref()
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn recreate_offscreen(&mut self) {
        if self.gpu.surface.is_some() {
            return;
        }
        self.offscreen = Some(self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texchain offscreen surface"),
            size: wgpu::Extent3d {
                width: self.gpu.width(),
                height: self.gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.gpu.config.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        }));
    }

    fn allocate(&self, desc: &TextureDesc) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texchain target"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.options.texture_type.wgpu_format(),
            usage: TEXTURE_USAGE,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    /// Runs `f` inside a validation error scope and turns a captured error
    /// into `wrap(message)`.
    fn scoped<T>(&self, wrap: fn(String) -> RttError, f: impl FnOnce() -> T) -> Result<T, RttError> {
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match pollster::block_on(self.gpu.device.pop_error_scope()) {
            Some(error) => Err(wrap(error.to_string())),
            None => Ok(value),
        }
    }

    /// View of the current surface frame, acquiring one if needed.
    ///
    /// `Ok(None)` means the frame should be skipped.
    fn surface_view(&mut self) -> Result<Option<wgpu::TextureView>, RttError> {
        if let Some(offscreen) = &self.offscreen {
            return Ok(Some(offscreen.create_view(&wgpu::TextureViewDescriptor::default())));
        }
        if let Some(frame) = &self.frame {
            return Ok(Some(frame.view.clone()));
        }
        let Some(surface) = &self.gpu.surface else {
            return Ok(None);
        };
        match surface.get_current_texture() {
            Ok(texture) => {
                let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some(Frame {
                    surface: texture,
                    view: view.clone(),
                });
                Ok(Some(view))
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface lost or outdated, reconfiguring");
                self.gpu.reconfigure();
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("timed out acquiring the next frame");
                Ok(None)
            }
            Err(e) => Err(RttError::Device(format!("failed to acquire frame: {e}"))),
        }
    }

    fn target_format(&self, target: TargetFormat) -> wgpu::TextureFormat {
        match target {
            TargetFormat::Texture(texture_type) => texture_type.wgpu_format(),
            TargetFormat::Surface => self.gpu.config.format,
        }
    }
}

impl RenderDevice for WgpuDevice {
    fn surface_size(&self) -> (u32, u32) {
        (self.gpu.width(), self.gpu.height())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.frame = None;
        self.gpu.resize(width, height);
        self.recreate_offscreen();
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, RttError> {
        if desc.options.texture_type == TextureType::Float
            && (desc.options.min_filter == FilterMode::Linear || desc.options.mag_filter == FilterMode::Linear)
            && !self.gpu.float32_filterable()
        {
            log::warn!("linear filtering of a 32-bit float texture is not supported by this device");
        }

        let ((texture, view), sampler) = self.scoped(RttError::Device, || {
            let allocated = self.allocate(desc);
            let sampler = self.gpu.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("texchain target sampler"),
                address_mode_u: address_mode(desc.options.wrap_s),
                address_mode_v: address_mode(desc.options.wrap_t),
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter_mode(desc.options.mag_filter),
                min_filter: filter_mode(desc.options.min_filter),
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            });
            (allocated, sampler)
        })?;

        let id = TextureId(self.next_id());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                sampler,
                desc: *desc,
            },
        );
        Ok(id)
    }

    fn resize_texture(&mut self, id: TextureId, width: u32, height: u32) -> Result<(), RttError> {
        let mut desc = self.textures.get(&id).ok_or(RttError::UnknownTexture(id))?.desc;
        desc.width = width;
        desc.height = height;
        let (texture, view) = self.scoped(RttError::Device, || self.allocate(&desc))?;
        if let Some(entry) = self.textures.get_mut(&id) {
            entry.texture.destroy();
            entry.texture = texture;
            entry.view = view;
            entry.desc = desc;
        }
        Ok(())
    }

    fn write_texture(&mut self, id: TextureId, region: TextureRegion, data: &[f32]) -> Result<(), RttError> {
        let entry = self.textures.get(&id).ok_or(RttError::UnknownTexture(id))?;
        let expected = (region.width * region.height * 4) as usize;
        if data.len() != expected {
            return Err(RttError::Device(format!(
                "write of {region:?} needs {expected} floats, got {}",
                data.len()
            )));
        }

        let texture_type = entry.desc.options.texture_type;
        let bytes: Vec<u8> = match texture_type {
            TextureType::Float => bytemuck::cast_slice(data).to_vec(),
            TextureType::UnsignedByte => to_unorm8(data),
            TextureType::HalfFloat => {
                return Err(RttError::Device("writing half-float textures is not supported".into()));
            }
        };

        self.scoped(RttError::Device, || {
            self.gpu.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &entry.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: region.x,
                        y: region.y,
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(region.width * texture_type.texel_size()),
                    rows_per_image: Some(region.height),
                },
                wgpu::Extent3d {
                    width: region.width,
                    height: region.height,
                    depth_or_array_layers: 1,
                },
            );
        })
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(entry) = self.textures.remove(&id) {
            entry.texture.destroy();
        }
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, RttError> {
        let vertex = shader::compile(ShaderStage::Vertex, desc.vertex)?;
        let fragment = shader::compile(ShaderStage::Fragment, desc.fragment)?;
        let interface = shader::link(&vertex, &fragment)?;

        let mut attributes = Vec::with_capacity(interface.attributes().len());
        for input in interface.attributes() {
            let format = vertex_format(input.components)
                .filter(|_| input.kind == ScalarKind::Float)
                .ok_or_else(|| {
                    RttError::ProgramLink(format!(
                        "vertex input `{}` must be a f32 scalar or vector",
                        input.name
                    ))
                })?;
            attributes.push([wgpu::VertexAttribute {
                format,
                offset: 0,
                shader_location: input.location,
            }]);
        }
        let buffers: Vec<wgpu::VertexBufferLayout> = attributes
            .iter()
            .map(|attribute| wgpu::VertexBufferLayout {
                array_stride: attribute[0].format.size(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();

        let format = self.target_format(desc.target);
        let device = &self.gpu.device;
        let pipeline = self.scoped(RttError::ProgramLink, || {
            let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("texchain vertex"),
                source: wgpu::ShaderSource::Wgsl(desc.vertex.into()),
            });
            let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("texchain fragment"),
                source: wgpu::ShaderSource::Wgsl(desc.fragment.into()),
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("texchain pass"),
                layout: None,
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(interface.vertex_entry()),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some(interface.fragment_entry()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: blend_state(desc.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: topology(desc.primitive),
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        let uniform_buffers = interface
            .blocks()
            .iter()
            .map(|block| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("texchain uniforms"),
                    size: u64::from(block.size.max(16).next_multiple_of(16)),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        let staging = interface
            .blocks()
            .iter()
            .map(|block| vec![0u8; block.size.max(16).next_multiple_of(16) as usize])
            .collect();

        let id = ProgramId(self.next_id());
        log::debug!(
            "created program {id:?} ({} -> {})",
            interface.vertex_entry(),
            interface.fragment_entry()
        );
        self.programs.insert(
            id,
            GpuProgram {
                pipeline,
                interface,
                uniform_buffers,
                staging,
            },
        );
        Ok(id)
    }

    fn program_interface(&self, id: ProgramId) -> Option<&ShaderInterface> {
        self.programs.get(&id).map(|p| &p.interface)
    }

    fn destroy_program(&mut self, id: ProgramId) {
        if let Some(program) = self.programs.remove(&id) {
            for buffer in program.uniform_buffers {
                buffer.destroy();
            }
        }
    }

    fn create_buffer(&mut self, data: &[f32]) -> Result<BufferId, RttError> {
        let contents: &[u8] = if data.is_empty() {
            &[0; 4]
        } else {
            bytemuck::cast_slice(data)
        };
        let buffer = self.scoped(RttError::Device, || {
            self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("texchain vertices"),
                contents,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            })
        })?;
        let id = BufferId(self.next_id());
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                size: contents.len() as u64,
            },
        );
        Ok(id)
    }

    fn write_buffer(&mut self, id: BufferId, data: &[f32]) -> Result<(), RttError> {
        let entry = self.buffers.get_mut(&id).ok_or(RttError::UnknownBuffer(id))?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 > entry.size {
            entry.buffer.destroy();
            entry.buffer = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("texchain vertices"),
                contents: bytes,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
            entry.size = bytes.len() as u64;
        } else if !bytes.is_empty() {
            self.gpu.queue.write_buffer(&entry.buffer, 0, bytes);
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(entry) = self.buffers.remove(&id) {
            entry.buffer.destroy();
        }
    }

    fn clear(&mut self, target: TextureId) -> Result<(), RttError> {
        let entry = self.textures.get(&target).ok_or(RttError::UnknownTexture(target))?;
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texchain clear"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("texchain clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &entry.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), RttError> {
        let (target_view, target_size) = match call.target {
            Target::Texture(id) => {
                let entry = self.textures.get(&id).ok_or(RttError::UnknownTexture(id))?;
                (entry.view.clone(), (entry.desc.width, entry.desc.height))
            }
            Target::Surface => match self.surface_view()? {
                Some(view) => (view, (self.gpu.width(), self.gpu.height())),
                None => return Ok(()),
            },
        };

        self.upload_uniforms(call)?;
        let program = self
            .programs
            .get(&call.program)
            .ok_or(RttError::UnknownProgram(call.program))?;

        let mut vertex_buffers = Vec::with_capacity(program.interface.attributes().len());
        for input in program.interface.attributes() {
            let buffer = call
                .attributes
                .iter()
                .find(|a| a.name == input.name)
                .and_then(|a| self.buffers.get(&a.buffer));
            match buffer {
                Some(buffer) => vertex_buffers.push(&buffer.buffer),
                None => {
                    log::warn!("no buffer for vertex input `{}`, skipping draw", input.name);
                    return Ok(());
                }
            }
        }

        let bound = bound_textures(call);
        let bind_groups = self.scoped(RttError::Device, || self.bind_groups(program, &bound))?;

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texchain draw"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("texchain pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let width = call.viewport.0.min(target_size.0);
            let height = call.viewport.1.min(target_size.1);
            pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            pass.set_pipeline(&program.pipeline);
            for (index, group) in bind_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, group, &[]);
            }
            for (slot, buffer) in vertex_buffers.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            pass.draw(call.first..call.first + call.count, 0..1);
        }

        self.scoped(RttError::Device, || {
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
        })
    }

    fn present(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.surface.present();
        }
    }
}

/// Texture bound to every sampler name of a draw, history elements included.
fn bound_textures(call: &DrawCall) -> HashMap<String, Option<TextureId>> {
    let mut bound = HashMap::new();
    for binding in &call.textures {
        bound.insert(binding.name.clone(), binding.texture);
    }
    for array in &call.texture_arrays {
        for (i, texture) in array.textures.iter().enumerate() {
            bound.insert(ShaderInterface::array_element(&array.name, i), Some(*texture));
        }
    }
    bound
}

impl WgpuDevice {
    /// Encodes the draw's uniform values into the program's staging blocks and
    /// uploads them.
    fn upload_uniforms(&mut self, call: &DrawCall) -> Result<(), RttError> {
        let program = self
            .programs
            .get_mut(&call.program)
            .ok_or(RttError::UnknownProgram(call.program))?;

        for (name, value) in &call.uniforms {
            let Some(slot) = program.interface.uniform(name) else {
                log::trace!("program {:?} does not use uniform `{name}`", call.program);
                continue;
            };
            match encode_uniform(value, slot.ty) {
                Some(bytes) => {
                    let start = slot.offset as usize;
                    program.staging[slot.block][start..start + bytes.len()].copy_from_slice(&bytes);
                }
                None => log::warn!("uniform `{name}` value {value:?} does not match {:?}", slot.ty),
            }
        }
        for (buffer, bytes) in program.uniform_buffers.iter().zip(&program.staging) {
            self.gpu.queue.write_buffer(buffer, 0, bytes);
        }
        Ok(())
    }

    fn resolve<'a>(&'a self, bound: &HashMap<String, Option<TextureId>>, name: &str) -> Option<&'a GpuTexture> {
        let id = bound.get(name).copied().flatten()?;
        let texture = self.textures.get(&id);
        if texture.is_none() {
            log::warn!("texture `{name}` is bound to released {id:?}");
        }
        texture
    }

    /// One bind group per group index up to the highest one the program uses.
    ///
    /// Unbound textures get the transparent placeholder; a `<name>_sampler`
    /// gets the sampler of texture `<name>`, any other sampler the default one.
    fn bind_groups(&self, program: &GpuProgram, bound: &HashMap<String, Option<TextureId>>) -> Vec<wgpu::BindGroup> {
        let interface = &program.interface;
        let group_count = interface.groups().last().map_or(0, |g| g + 1);

        (0..group_count)
            .map(|group| {
                let mut entries = Vec::new();
                for (block, buffer) in interface.blocks().iter().zip(&program.uniform_buffers) {
                    if block.slot.group == group {
                        entries.push(wgpu::BindGroupEntry {
                            binding: block.slot.binding,
                            resource: buffer.as_entire_binding(),
                        });
                    }
                }
                for (name, slot) in interface.textures() {
                    if slot.group == group {
                        let view = self.resolve(bound, name).map_or(&self.placeholder, |t| &t.view);
                        entries.push(wgpu::BindGroupEntry {
                            binding: slot.binding,
                            resource: wgpu::BindingResource::TextureView(view),
                        });
                    }
                }
                for (name, slot) in interface.samplers() {
                    if slot.group == group {
                        let sampler = name
                            .strip_suffix(SAMPLER_SUFFIX)
                            .and_then(|texture| self.resolve(bound, texture))
                            .map_or(&self.default_sampler, |t| &t.sampler);
                        entries.push(wgpu::BindGroupEntry {
                            binding: slot.binding,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        });
                    }
                }

                self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("texchain bindings"),
                    layout: &program.pipeline.get_bind_group_layout(group),
                    entries: &entries,
                })
            })
            .collect()
    }
}
