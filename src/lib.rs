//! # texchain
//!
//! **Chained render-to-texture passes on wgpu, and a GPU fluid field built from them.**
//!
//! A [`Pipeline`] runs an ordered list of shader passes. Each pass samples the
//! previous output and writes one of two ping-pong targets; an optional history
//! ring keeps the last frames around for temporal effects. Pipelines feed each
//! other through texture uniforms, and the [`Stage`] chains four of them into
//! an interactive fluid and particle field.
//!
//! ## Quick Start
//!
//! ```no_run
//! use texchain::*;
//!
//! fn main() -> Result<(), RttError> {
//!     init_logging(LoggingConfig::default());
//!     run(AppConfig::new().title("Fluid").size(1280, 720))
//! }
//! ```
//!
//! ## Building pipelines
//!
//! ```no_run
//! use texchain::*;
//!
//! const FADE: &str = "
//!     @group(0) @binding(0) var t_sampler: texture_2d<f32>;
//!     @group(0) @binding(1) var t_sampler_sampler: sampler;
//!
//!     @fragment
//!     fn fs_main(@location(0) uv: vec2f) -> @location(0) vec4f {
//!         return textureSample(t_sampler, t_sampler_sampler, uv) * 0.98;
//!     }
//! ";
//!
//! # fn main() -> Result<(), RttError> {
//! let mut device = WgpuDevice::new(GpuContext::headless(512, 512)?);
//!
//! let mut trails = Pipeline::new(&mut device, PipelineOptions::new().size(256, 256).history(2))?;
//! trails
//!     .add_fragment_pass(&mut device, FADE, &Uniforms::new())?
//!     .iterate_pass(2)
//!     .render(&mut device)?
//!     .paint(&mut device)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`device`]: the [`RenderDevice`] seam, with a wgpu implementation and a
//!   recording one for tests.
//! - [`shader`]: WGSL compilation and name-based interface reflection (naga).
//! - [`rtt`]: pipelines, binding tables and render targets.
//! - [`stage`]: the motion, fluid, particles and visualizer effects.

mod app;
pub mod device;
mod error;
mod gpu;
mod input;
mod logging;
pub mod rtt;
pub mod shader;
pub mod stage;

pub use app::{AppConfig, run};
pub use device::{
    BlendMode, FilterMode, Primitive, RecordingDevice, RenderDevice, TextureId, TextureType,
    WgpuDevice, WrapMode,
};
pub use error::RttError;
pub use gpu::GpuContext;
pub use input::{Input, InputAction, PointerEvent};
pub use logging::{LoggingConfig, init_logging};
pub use rtt::{
    Attributes, Geometry, OutputRef, Pipeline, PipelineOptions, ResizeOptions, TextureOptions,
    UniformShape, UniformValue, Uniforms,
};
pub use shader::ShaderStage;
pub use stage::{Effect, EffectHooks, ShaderSources, Stage, StageConfig, StageContext};

// Re-export glam math types for convenience
pub use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
