//! Render-to-texture pipelines.
//!
//! A [`Pipeline`] is an ordered chain of shader passes. Each pass samples the
//! previous pass's output as `t_sampler` and writes one of two ping-pong
//! targets, so no pass ever reads the texture it writes. With a history depth
//! `H > 0` the last pass of every [`render`](Pipeline::render) writes the head
//! of a ring of `H + 1` textures instead, and the `H` frames behind the head are
//! sampled as `t_history_0 .. t_history_{H-1}`.
//!
//! ```ignore
//! let uniforms = Uniforms::new()
//!     .with("d", [1.0_f32 / 256.0, 1.0 / 256.0])
//!     .with_texture("motion", motion.output());
//!
//! let mut solver = Pipeline::new(device, PipelineOptions::new().size(256, 256))?;
//! solver
//!     .add_fragment_pass(device, SOLVER, &uniforms)?
//!     .iterate_pass(3)
//!     .render(device)?;
//! ```

mod bindings;
mod options;
mod pipeline;
mod targets;

pub use bindings::{
    AttributeEntry, Attributes, OutputRef, OutputSlot, UniformEntry, UniformKind, UniformShape,
    UniformValue, Uniforms,
};
pub use options::{Geometry, PipelineOptions, ResizeOptions, TextureOptions};
pub use pipeline::Pipeline;
pub use targets::{HistoryRing, RenderTargets};

/// Vertex stage used by fragment-only passes and by `paint`.
///
/// Maps the unit square `position` to clip space and emits `uv` with the
/// origin at the top-left texel.
pub const DEFAULT_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) clip: vec4f,
    @location(0) uv: vec2f,
}

@vertex
fn vs_main(@location(0) position: vec2f) -> VertexOutput {
    var out: VertexOutput;
    out.uv = vec2f(position.x, 1.0 - position.y);
    out.clip = vec4f(position * 2.0 - 1.0, 0.0, 1.0);
    return out;
}
"#;

/// Pass-through fragment stage drawing a pipeline's output to the surface.
pub const PAINT_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var t_sampler: texture_2d<f32>;
@group(0) @binding(1) var t_sampler_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2f) -> @location(0) vec4f {
    return textureSample(t_sampler, t_sampler_sampler, uv);
}
"#;
