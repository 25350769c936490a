//! Shader groups and the multi-pass renderer.
//!
//! Every fragment shader of a group setup becomes its own program linked
//! against the shared vertex shader. Painting runs the programs in order,
//! each one reading the previous pass's output through the ping-pong pair.
//! Only the final program of the final group draws to the surface.

use super::error::{EngineError, Result};
use super::framebuffers::PingPong;
use super::shaders::{self, ProgramState};
use super::uniforms::{ProgramUniforms, UniformStore};
use crate::gfx::{Graphics, ShaderStage};

pub(crate) struct GroupProgram<G: Graphics> {
    pub handle: G::Program,
    pub fragment: G::Shader,
    pub attached: Vec<G::Shader>,
    pub state: ProgramState,
    pub uniforms: ProgramUniforms<G::UniformLocation>,
}

/// Linked programs partitioned into ordered groups.
pub(crate) struct ShaderGroups<G: Graphics> {
    groups: Vec<Vec<GroupProgram<G>>>,
}

impl<G: Graphics> Default for ShaderGroups<G> {
    fn default() -> Self {
        Self { groups: Vec::new() }
    }
}

fn link_one<G: Graphics>(gl: &mut G, vertex: G::Shader, fragment: G::Shader) -> Result<G::Program> {
    let program = gl.create_program().ok_or(EngineError::ProgramAllocationFailed)?;
    if let Err(log) = shaders::attach_and_link(gl, program, &[vertex, fragment]) {
        shaders::detach_all(gl, program, &[vertex, fragment]);
        gl.delete_program(program);
        return Err(EngineError::ProgramLinkFailed(log));
    }
    gl.setup_quad(program);
    Ok(program)
}

impl<G: Graphics> ShaderGroups<G> {
    /// Compiles and links every group.
    ///
    /// On failure nothing created by this call survives.
    pub fn build<S: AsRef<str>>(gl: &mut G, vertex: G::Shader, groups: &[Vec<S>]) -> Result<Self> {
        let sources: Vec<&str> = groups.iter().flatten().map(AsRef::as_ref).collect();
        let fragments = shaders::compile_batch(gl, ShaderStage::Fragment, &sources)?;

        let mut linked: Vec<GroupProgram<G>> = Vec::with_capacity(fragments.len());
        for (index, &fragment) in fragments.iter().enumerate() {
            match link_one(gl, vertex, fragment) {
                Ok(handle) => linked.push(GroupProgram {
                    handle,
                    fragment,
                    attached: vec![vertex, fragment],
                    state: ProgramState::Linked,
                    uniforms: ProgramUniforms::default(),
                }),
                Err(err) => {
                    log::warn!(
                        "group program {index} failed; discarding {} program(s)",
                        linked.len()
                    );
                    for program in linked {
                        shaders::detach_all(gl, program.handle, &[vertex, program.fragment]);
                        gl.delete_program(program.handle);
                    }
                    shaders::delete_shaders(gl, fragments);
                    return Err(err);
                }
            }
        }

        let mut programs = linked.into_iter();
        let groups = groups
            .iter()
            .map(|group| programs.by_ref().take(group.len()).collect())
            .collect();
        Ok(Self { groups })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(Vec::is_empty)
    }

    pub fn program_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.groups.iter().map(Vec::len).collect()
    }

    pub fn programs(&self) -> impl Iterator<Item = &GroupProgram<G>> {
        self.groups.iter().flatten()
    }

    /// Rebinds the quad for every program.
    pub fn setup_quad(&self, gl: &mut G) {
        for program in self.programs() {
            gl.setup_quad(program.handle);
        }
    }

    /// Detaches `shader` from every program that still has it attached.
    pub fn detach_shader(&mut self, gl: &mut G, shader: G::Shader) {
        for program in self.groups.iter_mut().flatten() {
            if program.attached.contains(&shader) {
                gl.detach_shader(program.handle, shader);
                program.attached.retain(|s| *s != shader);
            }
        }
    }

    /// Deletes every program and its fragment shader. The shared vertex
    /// shader is detached but left alive.
    pub fn release(self, gl: &mut G) {
        for program in self.groups.into_iter().flatten() {
            shaders::detach_all(gl, program.handle, &program.attached);
            gl.delete_program(program.handle);
            gl.delete_shader(program.fragment);
        }
    }

    /// Runs every pass and presents. Returns the number of passes drawn.
    pub fn render(
        &mut self,
        gl: &mut G,
        pair: &PingPong<G::Target>,
        store: &UniformStore,
        (width, height): (u32, u32),
    ) -> Result<usize> {
        let total = self.program_count();
        if total == 0 {
            return Err(EngineError::NoActiveProgram);
        }

        let (mut ping, mut pong) = (pair.ping, pair.pong);
        let mut pass = 0;
        for program in self.groups.iter_mut().flatten() {
            pass += 1;
            let target = (pass < total).then_some(pong);

            gl.bind_target(target);
            gl.viewport(width, height);
            gl.clear();

            gl.use_program(Some(program.handle));
            program.state = ProgramState::Attached;
            program.uniforms.apply_changes(gl, program.handle, store)?;

            gl.bind_texture(Some(ping));
            gl.draw_quad();
            std::mem::swap(&mut ping, &mut pong);
        }

        gl.bind_texture(None);
        gl.present();
        Ok(pass)
    }
}
