use thiserror::Error;

/// Failures reported by [`Engine`](super::Engine) operations.
///
/// Graphics diagnostics are carried verbatim; error codes are the raw values
/// returned by [`Graphics::get_error`](crate::gfx::Graphics::get_error).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("graphics context unavailable")]
    ContextUnavailable,

    #[error("failed to allocate a program object")]
    ProgramAllocationFailed,

    #[error("shader compilation failed: {0}")]
    ShaderCompileFailed(String),

    #[error("program linking failed: {0}")]
    ProgramLinkFailed(String),

    #[error("failed to fetch remote shader: {0}")]
    RemoteShaderFetchFailed(String),

    #[error("invalid frame rate {0}; expected a finite value above zero")]
    InvalidFrameRate(f64),

    #[error("uniform {0} not found")]
    UniformNotFound(String),

    #[error("uniform {0} has no components")]
    EmptyUniformValue(String),

    #[error("uniform values take 1 to 4 components")]
    UniformArity,

    #[error("no vertex shader has been set")]
    MissingVertexShader,

    #[error("no linked program to draw with")]
    NoActiveProgram,

    #[error("ping-pong framebuffers are not allocated")]
    FramebufferUnavailable,

    #[error("graphics error 0x{0:04x}")]
    GraphicsApi(u32),

    #[error("cleanup failed with graphics error 0x{0:04x}")]
    CleanupFailed(u32),

    #[error("frame hook failed: {0}")]
    Hook(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
