//! Graphics abstraction.
//!
//! The engine speaks a small GL-style vocabulary (shader objects, programs,
//! uniform locations, offscreen targets) so the multi-pass logic stays
//! independent of the backend that executes it.
//!
//! Backends:
//! - [`WgpuGraphics`]: WGSL shaders on a wgpu surface
//! - [`RecordingGraphics`]: in-memory journal, used by tests and headless runs

pub mod gpu;
pub mod recording;

use std::fmt::Debug;
use std::hash::Hash;

pub use gpu::{GpuInit, WgpuGraphics, WgpuSurface};
pub use recording::{GfxCall, Journal, RecordingGraphics, RecordingSurface};

/// Pipeline stage a shader object belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Error flag values reported by [`Graphics::get_error`].
///
/// Numbering follows the GL error enumeration so codes read the same on every
/// backend.
pub mod error_code {
    pub const INVALID_ENUM: u32 = 0x0500;
    pub const INVALID_VALUE: u32 = 0x0501;
    pub const INVALID_OPERATION: u32 = 0x0502;
    pub const OUT_OF_MEMORY: u32 = 0x0505;
}

/// Full-screen quad as a 4-vertex triangle fan (x, y, z).
pub const QUAD_FAN: [[f32; 3]; 4] = [
    [-1.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
];

/// Name of the vertex attribute the quad is bound to.
pub const QUAD_ATTRIBUTE: &str = "v_position";

/// GL-style graphics context owned by one engine.
///
/// All calls happen on the thread that owns the engine. Object creation may be
/// refused by the backend (`None`); compile and link report the backend's info
/// log on failure. Errors raised by other calls are latched and surface through
/// [`Graphics::get_error`].
pub trait Graphics: Sized + 'static {
    /// Exclusive render-target handle the context is created from.
    type Surface: Send + 'static;
    type Shader: Copy + Eq + Hash + Debug;
    type Program: Copy + Eq + Hash + Debug;
    type UniformLocation: Clone + Debug;
    /// Offscreen colour target together with its backing texture.
    type Target: Copy + Eq + Debug;

    /// Obtains a rendering context for `surface`.
    fn from_surface(surface: Self::Surface) -> Option<Self>;

    /// Current drawable size in physical pixels.
    fn surface_size(&self) -> (u32, u32);
    fn resize_surface(&mut self, width: u32, height: u32);

    fn create_program(&mut self) -> Option<Self::Program>;
    fn delete_program(&mut self, program: Self::Program);

    fn create_shader(&mut self, stage: ShaderStage) -> Option<Self::Shader>;
    fn shader_source(&mut self, shader: Self::Shader, source: &str);
    /// Compiles `shader`, returning the compiler diagnostic on failure.
    fn compile_shader(&mut self, shader: Self::Shader) -> Result<(), String>;
    fn delete_shader(&mut self, shader: Self::Shader);

    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    /// Links `program`, returning the link log on failure.
    fn link_program(&mut self, program: Self::Program) -> Result<(), String>;
    fn use_program(&mut self, program: Option<Self::Program>);

    /// Binds the full-screen quad to [`QUAD_ATTRIBUTE`] of `program`.
    fn setup_quad(&mut self, program: Self::Program);

    fn uniform_location(
        &mut self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    fn uniform_1f(&mut self, location: &Self::UniformLocation, x: f32);
    fn uniform_2f(&mut self, location: &Self::UniformLocation, x: f32, y: f32);
    fn uniform_3f(&mut self, location: &Self::UniformLocation, x: f32, y: f32, z: f32);
    fn uniform_4f(&mut self, location: &Self::UniformLocation, x: f32, y: f32, z: f32, w: f32);

    fn create_target(&mut self, width: u32, height: u32) -> Option<Self::Target>;
    fn delete_target(&mut self, target: Self::Target);
    /// Selects the draw target; `None` is the surface.
    fn bind_target(&mut self, target: Option<Self::Target>);
    /// Selects the texture sampled by the next draw.
    fn bind_texture(&mut self, target: Option<Self::Target>);

    fn viewport(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    /// Draws the 4-vertex triangle fan with the active program.
    fn draw_quad(&mut self);
    /// Flushes recorded work and presents the surface if it was drawn to.
    fn present(&mut self);

    /// Returns and clears the latched error code, if any.
    fn get_error(&mut self) -> Option<u32>;
}
