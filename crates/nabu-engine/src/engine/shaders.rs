//! Shader object batches and program linking.

use super::error::{EngineError, Result};
use crate::gfx::{Graphics, ShaderStage};

/// Lifecycle of a program object. Only moves forward; a failed link deletes
/// the program instead of going back.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ProgramState {
    Unlinked,
    Linked,
    /// Linked and bound for drawing at least once.
    Attached,
}

pub(crate) fn compile_one<G: Graphics>(
    gl: &mut G,
    stage: ShaderStage,
    source: &str,
) -> Result<G::Shader> {
    let shader = gl.create_shader(stage).ok_or_else(|| {
        EngineError::ShaderCompileFailed(format!("{stage:?} shader object could not be created"))
    })?;

    gl.shader_source(shader, source);
    if let Err(log) = gl.compile_shader(shader) {
        gl.delete_shader(shader);
        return Err(EngineError::ShaderCompileFailed(log));
    }
    Ok(shader)
}

/// Compiles `sources` in order.
///
/// All or nothing: on the first failure every shader created by this call is
/// deleted and that shader's diagnostic is returned.
pub(crate) fn compile_batch<G, S>(
    gl: &mut G,
    stage: ShaderStage,
    sources: &[S],
) -> Result<Vec<G::Shader>>
where
    G: Graphics,
    S: AsRef<str>,
{
    let mut created = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        match compile_one(gl, stage, source.as_ref()) {
            Ok(shader) => created.push(shader),
            Err(err) => {
                log::warn!(
                    "{stage:?} shader {index} failed to compile; rolling back {} shader(s)",
                    created.len()
                );
                delete_shaders(gl, created);
                return Err(err);
            }
        }
    }
    Ok(created)
}

pub(crate) fn delete_shaders<G: Graphics>(
    gl: &mut G,
    shaders: impl IntoIterator<Item = G::Shader>,
) {
    for shader in shaders {
        gl.delete_shader(shader);
    }
}

/// Attaches `shaders` to `program` and links it, returning the link log on
/// failure. Shaders stay attached either way.
pub(crate) fn attach_and_link<G: Graphics>(
    gl: &mut G,
    program: G::Program,
    shaders: &[G::Shader],
) -> Result<(), String> {
    for &shader in shaders {
        gl.attach_shader(program, shader);
    }
    gl.link_program(program)
}

pub(crate) fn detach_all<G: Graphics>(gl: &mut G, program: G::Program, shaders: &[G::Shader]) {
    for &shader in shaders {
        gl.detach_shader(program, shader);
    }
}
