//! Error type shared by the device, shader and pipeline layers.

use crate::device::{BufferId, ProgramId, TextureId};
use crate::shader::ShaderStage;

/// Errors raised while building or driving render-to-texture pipelines.
#[derive(Debug, thiserror::Error)]
pub enum RttError {
    /// No usable graphics context: adapter, device or surface creation failed,
    /// or a pipeline would have zero-sized textures.
    #[error("invalid graphics context: {0}")]
    InvalidContext(String),

    /// A shader stage failed to compile.
    ///
    /// `annotated` is the full source with 1-based line numbers.
    #[error("{stage} shader compilation failed:\n{diagnostic}\n{annotated}")]
    ShaderCompile {
        stage: ShaderStage,
        diagnostic: String,
        annotated: String,
    },

    /// The two stages compiled but could not be combined into a program.
    #[error("program link failed: {0}")]
    ProgramLink(String),

    /// `clear` or `paint` was requested before the first `render`.
    ///
    /// The pipeline logs this and carries on; it is never returned by it.
    #[error("no output yet, call render() at least once")]
    NoOutputYet,

    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("unknown program {0:?}")]
    UnknownProgram(ProgramId),

    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),

    /// Any other failure reported by the graphics device.
    #[error("graphics device error: {0}")]
    Device(String),

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}
