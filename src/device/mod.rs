//! The graphics device seam.
//!
//! Pipelines never talk to wgpu directly. They drive a [`RenderDevice`], which
//! hands out typed ids for textures, programs and buffers and executes fully
//! resolved [`DrawCall`]s. [`WgpuDevice`] runs them on the GPU;
//! [`RecordingDevice`] keeps a command log and is what the tests render with.

mod recording;
mod wgpu_device;

pub use recording::{Command, RecordingDevice};
pub use wgpu_device::WgpuDevice;

use crate::error::RttError;
use crate::rtt::{TextureOptions, UniformValue};
use crate::shader::ShaderInterface;

/// Handle to a texture owned by a device.
///
/// Resizing a texture keeps its id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Handle to a compiled and linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

/// Handle to a vertex buffer of `f32` data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

/// Pixel storage of a render target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureType {
    /// 8 bits per channel, normalized.
    #[default]
    UnsignedByte,
    /// 16-bit float per channel. Blendable everywhere.
    HalfFloat,
    /// 32-bit float per channel.
    Float,
}

impl TextureType {
    pub fn wgpu_format(self) -> wgpu::TextureFormat {
        match self {
            TextureType::UnsignedByte => wgpu::TextureFormat::Rgba8Unorm,
            TextureType::HalfFloat => wgpu::TextureFormat::Rgba16Float,
            TextureType::Float => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Bytes per RGBA texel.
    pub fn texel_size(self) -> u32 {
        match self {
            TextureType::UnsignedByte => 4,
            TextureType::HalfFloat => 8,
            TextureType::Float => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// Primitive topology of a draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    Triangles,
    #[default]
    TriangleStrip,
}

/// Color blending applied when a program writes its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Overwrite the target.
    #[default]
    Replace,
    /// `src + dst`.
    Additive,
    /// `src * src_alpha + dst * (1 - src_alpha)`.
    Alpha,
}

/// Storage and sampling of a texture to create.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub options: TextureOptions,
}

/// Rectangle of texels, in texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// What a program renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Texture(TextureType),
    /// The presentable surface.
    Surface,
}

/// A program to compile and link.
#[derive(Clone, Copy, Debug)]
pub struct ProgramDesc<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub target: TargetFormat,
    pub primitive: Primitive,
    pub blend: BlendMode,
}

/// Where a draw lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Texture(TextureId),
    Surface,
}

/// A texture bound to a named sampler at a texture unit.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureBinding {
    pub name: String,
    pub unit: u32,
    /// `None` binds a transparent placeholder.
    pub texture: Option<TextureId>,
}

/// Textures bound to consecutive units of an array sampler.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureArrayBinding {
    pub name: String,
    pub first_unit: u32,
    pub textures: Vec<TextureId>,
}

impl TextureArrayBinding {
    pub fn units(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.textures.len() as u32).map(|i| self.first_unit + i)
    }
}

/// A vertex buffer feeding a named attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeBinding {
    pub name: String,
    pub components: u32,
    pub buffer: BufferId,
}

/// One fully resolved draw.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub target: Target,
    /// Width and height of the viewport, anchored at the origin.
    pub viewport: (u32, u32),
    /// Scalar, vector and matrix uniforms declared by the program.
    pub uniforms: Vec<(String, UniformValue)>,
    pub textures: Vec<TextureBinding>,
    pub texture_arrays: Vec<TextureArrayBinding>,
    pub attributes: Vec<AttributeBinding>,
    pub primitive: Primitive,
    pub first: u32,
    pub count: u32,
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn texture(&self, name: &str) -> Option<&TextureBinding> {
        self.textures.iter().find(|t| t.name == name)
    }
}

/// A graphics context able to run render-to-texture pipelines.
///
/// All calls are synchronous and happen on one thread, in program order.
pub trait RenderDevice {
    /// Size of the presentable surface, in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Resizes the presentable surface.
    fn resize_surface(&mut self, width: u32, height: u32);

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, RttError>;

    /// Reallocates the storage of `id`; contents are lost.
    fn resize_texture(&mut self, id: TextureId, width: u32, height: u32) -> Result<(), RttError>;

    /// Uploads RGBA `f32` texels into `region` of a float texture.
    fn write_texture(&mut self, id: TextureId, region: TextureRegion, data: &[f32]) -> Result<(), RttError>;

    fn destroy_texture(&mut self, id: TextureId);

    /// Compiles and links a program. Nothing is registered on failure.
    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, RttError>;

    /// Reflected interface of a live program.
    fn program_interface(&self, id: ProgramId) -> Option<&ShaderInterface>;

    fn destroy_program(&mut self, id: ProgramId);

    fn create_buffer(&mut self, data: &[f32]) -> Result<BufferId, RttError>;

    /// Replaces the contents of a buffer, growing it when needed.
    fn write_buffer(&mut self, id: BufferId, data: &[f32]) -> Result<(), RttError>;

    fn destroy_buffer(&mut self, id: BufferId);

    /// Clears a texture to transparent black.
    fn clear(&mut self, target: TextureId) -> Result<(), RttError>;

    fn draw(&mut self, call: &DrawCall) -> Result<(), RttError>;

    /// Presents whatever was drawn to the surface since the last call.
    fn present(&mut self);
}
