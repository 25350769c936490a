//! Multi-pass full-screen shader engine.

mod config;
mod error;
mod fetch;
mod framebuffers;
mod passes;
mod render;
mod shaders;
mod uniforms;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use fetch::{HttpFetcher, ShaderFetcher, StaticFetcher};
pub use render::{Engine, FrameCallback, FrameState};
pub use shaders::ProgramState;
pub use uniforms::UniformValue;
