//! wgpu backend.
//!
//! This module is responsible for:
//! - creating the wgpu Adapter/Device/Queue from a transferred surface
//! - compiling WGSL shader objects and linking them into render pipelines
//! - recording full-screen passes into offscreen targets or the surface

mod backend;
mod init;
mod reflect;
mod surface;

pub use backend::{ProgramId, ShaderId, TargetId, UniformSlot, WgpuGraphics};
pub use init::GpuInit;
pub use surface::WgpuSurface;
