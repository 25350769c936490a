use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::EngineConfig;
use super::error::{EngineError, Result};
use super::fetch::{HttpFetcher, ShaderFetcher};
use super::framebuffers::PingPong;
use super::passes::ShaderGroups;
use super::shaders::{self, ProgramState};
use super::uniforms::{self, ProgramUniforms, UniformStore, UniformValue};
use crate::gfx::{Graphics, ShaderStage};
use crate::time::{FrameClock, FrameLoop, FrameTick};

/// Callback run against an engine, receiving the frame counter and elapsed
/// milliseconds.
pub type FrameCallback<G> = Box<dyn FnMut(&mut Engine<G>, u64, f64) -> Result<Value>>;

/// Snapshot of the frame loop.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameState {
    pub frame: u64,
    pub elapsed_ms: f64,
    /// Configured rate while the loop runs.
    pub fps: Option<f64>,
}

struct SingleProgram<G: Graphics> {
    handle: G::Program,
    attached: Vec<G::Shader>,
    state: ProgramState,
    uniforms: ProgramUniforms<G::UniformLocation>,
}

impl<G: Graphics> SingleProgram<G> {
    fn new(handle: G::Program) -> Self {
        Self {
            handle,
            attached: Vec::new(),
            state: ProgramState::Unlinked,
            uniforms: ProgramUniforms::default(),
        }
    }

    fn detach(&mut self, gl: &mut G, shader: G::Shader) {
        if self.attached.contains(&shader) {
            gl.detach_shader(self.handle, shader);
            self.attached.retain(|s| *s != shader);
        }
    }

    fn release(mut self, gl: &mut G) {
        shaders::detach_all(gl, self.handle, &std::mem::take(&mut self.attached));
        gl.delete_program(self.handle);
    }

    /// Replaces a linked program in `slot` with a fresh unlinked one.
    ///
    /// An empty or unlinked slot is left alone. The slot ends up empty when
    /// allocation fails; `use_program` allocates again.
    fn renew(slot: &mut Option<Self>, gl: &mut G) {
        if !slot.as_ref().is_some_and(|p| p.state != ProgramState::Unlinked) {
            return;
        }
        if let Some(old) = slot.take() {
            old.release(gl);
        }
        *slot = gl.create_program().map(Self::new);
    }
}

fn context<G>(gl: &mut Option<G>) -> Result<&mut G> {
    gl.as_mut().ok_or(EngineError::ContextUnavailable)
}

/// Full-screen shader renderer bound to one surface.
///
/// Two modes share the same vertex shader:
/// - single program: the fragment shaders of
///   [`set_fragment_shaders`](Self::set_fragment_shaders) are linked into one
///   program by [`use_program`](Self::use_program) and drawn to the surface
/// - groups: [`set_fragment_shader_groups`](Self::set_fragment_shader_groups)
///   links one program per fragment shader and [`paint`](Self::paint) chains
///   them through the ping-pong framebuffers
///
/// Setting groups leaves single mode and vice versa.
pub struct Engine<G: Graphics> {
    /// `None` once destroyed.
    gl: Option<G>,
    config: EngineConfig,
    fetcher: Box<dyn ShaderFetcher>,

    vertex: Option<G::Shader>,
    fragments: Vec<G::Shader>,
    program: Option<SingleProgram<G>>,
    groups: ShaderGroups<G>,

    framebuffers: Option<PingPong<G::Target>>,
    uniforms: UniformStore,
    size: (u32, u32),

    frames: FrameLoop<FrameCallback<G>>,
    fps: Option<f64>,
}

impl<G: Graphics> Engine<G> {
    pub fn new(surface: G::Surface) -> Result<Self> {
        Self::with_config(surface, EngineConfig::default())
    }

    /// Obtains a context for `surface` and allocates the program container.
    ///
    /// The ping-pong pair is allocated right away when the surface has a
    /// non-zero size.
    pub fn with_config(surface: G::Surface, config: EngineConfig) -> Result<Self> {
        let mut gl = G::from_surface(surface).ok_or(EngineError::ContextUnavailable)?;
        let handle = gl.create_program().ok_or(EngineError::ProgramAllocationFailed)?;

        let (width, height) = gl.surface_size();
        let framebuffers = PingPong::allocate(&mut gl, width, height);
        if framebuffers.is_some() {
            gl.viewport(width, height);
        }

        let clock = FrameClock::with_clamps(
            Instant::now(),
            config.min_frame_delta,
            config.max_frame_delta,
        );
        let frame_rate = config.frame_rate;

        let mut engine = Self {
            gl: Some(gl),
            config,
            fetcher: Box::new(HttpFetcher::default()),
            vertex: None,
            fragments: Vec::new(),
            program: Some(SingleProgram::new(handle)),
            groups: ShaderGroups::default(),
            framebuffers,
            uniforms: UniformStore::default(),
            size: (width, height),
            frames: FrameLoop::new(clock),
            fps: None,
        };

        if let Some(fps) = frame_rate {
            engine.set_frame_rate(fps)?;
        }

        log::debug!("engine created ({width}x{height})");
        Ok(engine)
    }

    /// Replaces the fetcher used by the `set_remote_*` operations.
    pub fn with_fetcher(mut self, fetcher: impl ShaderFetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn is_destroyed(&self) -> bool {
        self.gl.is_none()
    }

    /// Backend access for host-specific calls.
    pub fn graphics(&self) -> Option<&G> {
        self.gl.as_ref()
    }

    /// State of the single-mode program, `None` after a failed link.
    pub fn program_state(&self) -> Option<ProgramState> {
        self.program.as_ref().map(|p| p.state)
    }

    /// Program count of each group; empty in single mode.
    pub fn group_shape(&self) -> Vec<usize> {
        self.groups.shape()
    }

    pub fn group_program_states(&self) -> Vec<ProgramState> {
        self.groups.programs().map(|p| p.state).collect()
    }

    /// Last desired value recorded for `name`.
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    pub fn uniform_count(&self) -> usize {
        self.uniforms.len()
    }

    /// Whether [`paint`](Self::paint) has something to draw.
    pub fn is_paintable(&self) -> bool {
        if !self.groups.is_empty() {
            return self.framebuffers.is_some();
        }
        self.program
            .as_ref()
            .is_some_and(|p| p.state == ProgramState::Attached)
    }

    // ---- shader setup ----

    pub fn set_vertex_shader(&mut self, source: &str) -> Result<()> {
        let gl = context(&mut self.gl)?;
        let shader = shaders::compile_one(gl, ShaderStage::Vertex, source)?;
        self.install_vertex(shader);
        Ok(())
    }

    pub fn set_remote_vertex_shader(&mut self, url: &str) -> Result<()> {
        context(&mut self.gl)?;
        let source = self.fetcher.fetch(url)?;
        self.set_vertex_shader(&source)
    }

    /// Compiles the fragment shaders of single-program mode.
    ///
    /// All or nothing: a failing shader leaves the previous set in place.
    /// New shaders take effect at the next [`use_program`](Self::use_program).
    pub fn set_fragment_shaders<S: AsRef<str>>(&mut self, sources: &[S]) -> Result<()> {
        let gl = context(&mut self.gl)?;
        let compiled = shaders::compile_batch(gl, ShaderStage::Fragment, sources)?;
        self.install_fragments(compiled);
        Ok(())
    }

    pub fn set_remote_fragment_shaders(&mut self, urls: &[String]) -> Result<()> {
        context(&mut self.gl)?;
        let sources = self.fetcher.fetch_all(urls)?;
        self.set_fragment_shaders(&sources)
    }

    /// Compiles and links one program per fragment shader, partitioned into
    /// `groups`. Requires a vertex shader.
    pub fn set_fragment_shader_groups<S: AsRef<str>>(&mut self, groups: &[Vec<S>]) -> Result<()> {
        let gl = context(&mut self.gl)?;
        let vertex = self.vertex.ok_or(EngineError::MissingVertexShader)?;
        let built = ShaderGroups::build(gl, vertex, groups)?;

        std::mem::replace(&mut self.groups, built).release(gl);
        for shader in std::mem::take(&mut self.fragments) {
            if let Some(program) = self.program.as_mut() {
                program.detach(gl, shader);
            }
            gl.delete_shader(shader);
        }
        SingleProgram::renew(&mut self.program, gl);

        log::debug!("installed shader groups {:?}", self.groups.shape());
        Ok(())
    }

    pub fn set_remote_fragment_shader_groups(&mut self, urls: &[Vec<String>]) -> Result<()> {
        context(&mut self.gl)?;
        let groups = urls
            .iter()
            .map(|group| self.fetcher.fetch_all(group))
            .collect::<Result<Vec<_>>>()?;
        self.set_fragment_shader_groups(&groups)
    }

    /// Compiles a vertex shader and the single-mode fragment shaders together.
    ///
    /// Nothing is replaced unless every shader compiles.
    pub fn compile_program<S: AsRef<str>>(&mut self, vertex: &str, fragments: &[S]) -> Result<()> {
        let gl = context(&mut self.gl)?;
        let vertex = shaders::compile_one(gl, ShaderStage::Vertex, vertex)?;
        let fragments = match shaders::compile_batch(gl, ShaderStage::Fragment, fragments) {
            Ok(fragments) => fragments,
            Err(err) => {
                gl.delete_shader(vertex);
                return Err(err);
            }
        };
        self.install_vertex(vertex);
        self.install_fragments(fragments);
        Ok(())
    }

    fn install_vertex(&mut self, shader: G::Shader) {
        let Some(gl) = self.gl.as_mut() else {
            return;
        };
        if let Some(old) = self.vertex.replace(shader) {
            if let Some(program) = self.program.as_mut() {
                program.detach(gl, old);
            }
            self.groups.detach_shader(gl, old);
            gl.delete_shader(old);
        }
    }

    fn install_fragments(&mut self, compiled: Vec<G::Shader>) {
        let Some(gl) = self.gl.as_mut() else {
            return;
        };
        for old in std::mem::replace(&mut self.fragments, compiled) {
            if let Some(program) = self.program.as_mut() {
                program.detach(gl, old);
            }
            gl.delete_shader(old);
        }
        if !self.groups.is_empty() {
            std::mem::take(&mut self.groups).release(gl);
            log::debug!("left group mode");
        }
        SingleProgram::renew(&mut self.program, gl);
    }

    // ---- drawing ----

    /// Links the single-mode program and makes it current.
    ///
    /// On link failure the program object is deleted; the next call starts
    /// from a fresh one. Desired uniforms are uploaded after a successful
    /// link. In group mode programs are linked at setup and this does nothing.
    pub fn use_program(&mut self) -> Result<()> {
        let gl = context(&mut self.gl)?;
        if !self.groups.is_empty() {
            return Ok(());
        }
        let vertex = self.vertex.ok_or(EngineError::MissingVertexShader)?;

        if self.program.is_none() {
            let handle = gl.create_program().ok_or(EngineError::ProgramAllocationFailed)?;
            self.program = Some(SingleProgram::new(handle));
        }
        let Some(program) = self.program.as_mut() else {
            return Err(EngineError::ProgramAllocationFailed);
        };

        shaders::detach_all(gl, program.handle, &std::mem::take(&mut program.attached));
        let mut wanted = Vec::with_capacity(self.fragments.len() + 1);
        wanted.push(vertex);
        wanted.extend_from_slice(&self.fragments);
        let linked = shaders::attach_and_link(gl, program.handle, &wanted);
        program.attached = wanted;

        if let Err(log) = linked {
            if let Some(failed) = self.program.take() {
                failed.release(gl);
            }
            log::error!("program link failed: {log}");
            return Err(EngineError::ProgramLinkFailed(log));
        }

        program.uniforms.reset();
        program.state = ProgramState::Linked;
        gl.use_program(Some(program.handle));
        program.state = ProgramState::Attached;
        program.uniforms.apply_changes(gl, program.handle, &self.uniforms)?;
        Ok(())
    }

    /// Binds the full-screen quad for the current program(s).
    pub fn setup_whole_screen_quad(&mut self) -> Result<()> {
        let gl = context(&mut self.gl)?;
        if !self.groups.is_empty() {
            self.groups.setup_quad(gl);
            return Ok(());
        }
        let program = self.program.as_ref().ok_or(EngineError::NoActiveProgram)?;
        gl.setup_quad(program.handle);
        Ok(())
    }

    /// Draws one frame.
    ///
    /// Group mode runs every pass and presents the last one; single mode
    /// draws the active program straight to the surface.
    pub fn paint(&mut self) -> Result<()> {
        let gl = context(&mut self.gl)?;
        if !self.groups.is_empty() {
            let pair = self.framebuffers.as_ref().ok_or(EngineError::FramebufferUnavailable)?;
            self.groups.render(gl, pair, &self.uniforms, self.size)?;
            return Ok(());
        }

        let program = self
            .program
            .as_ref()
            .filter(|p| p.state == ProgramState::Attached)
            .ok_or(EngineError::NoActiveProgram)?;
        gl.use_program(Some(program.handle));
        gl.bind_target(None);
        gl.draw_quad();
        gl.present();
        Ok(())
    }

    /// Records `value` as the desired state of `name`.
    ///
    /// Single mode uploads it to the linked program right away (deferred to
    /// link otherwise). Group mode uploads at paint time, per program, only
    /// when it changed.
    pub fn update_uniform(&mut self, name: &str, value: UniformValue) -> Result<()> {
        value.validate(name)?;
        let gl = context(&mut self.gl)?;
        self.uniforms.set(name, value.clone());

        if !self.groups.is_empty() {
            return Ok(());
        }
        let Some(program) = self
            .program
            .as_mut()
            .filter(|p| p.state >= ProgramState::Linked)
        else {
            return Ok(());
        };
        if program.uniforms.is_current(name, &value) {
            return Ok(());
        }

        let location = program
            .uniforms
            .location(gl, program.handle, name)
            .ok_or_else(|| EngineError::UniformNotFound(name.to_string()))?;
        uniforms::upload(gl, &location, name, &value)?;
        program.uniforms.mark_applied(name, &value);
        Ok(())
    }

    /// Resizes the surface and the ping-pong pair, then repaints.
    ///
    /// Calling again with the current size does nothing.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let gl = context(&mut self.gl)?;
        let pair_fits = match &self.framebuffers {
            Some(pair) => pair.matches(width, height),
            None => width == 0 || height == 0,
        };
        if self.size == (width, height) && pair_fits {
            return Ok(());
        }

        self.size = (width, height);
        gl.resize_surface(width, height);
        gl.viewport(width, height);

        if let Some(old) = self.framebuffers.take() {
            old.release(gl);
        }
        if width > 0 && height > 0 {
            let pair = PingPong::allocate(gl, width, height)
                .ok_or(EngineError::FramebufferUnavailable)?;
            self.framebuffers = Some(pair);
        }
        log::debug!("resized to {width}x{height}");

        if self.config.repaint_on_resize && self.is_paintable() {
            self.paint()?;
        }
        Ok(())
    }

    /// Fails with the pending graphics error, if any.
    pub fn check_vitals(&mut self) -> Result<()> {
        let gl = context(&mut self.gl)?;
        match gl.get_error() {
            None => Ok(()),
            Some(code) => Err(EngineError::GraphicsApi(code)),
        }
    }

    /// Releases every graphics object and the context.
    ///
    /// Best effort: the engine ends up destroyed even when the error flag
    /// reports a failure, which is returned as [`EngineError::CleanupFailed`].
    /// Destroying twice is a no-op.
    pub fn destroy(&mut self) -> Result<()> {
        let Some(mut gl) = self.gl.take() else {
            return Ok(());
        };

        self.frames.clear();
        self.fps = None;

        gl.use_program(None);
        if let Some(program) = self.program.take() {
            program.release(&mut gl);
        }
        std::mem::take(&mut self.groups).release(&mut gl);
        if let Some(vertex) = self.vertex.take() {
            gl.delete_shader(vertex);
        }
        shaders::delete_shaders(&mut gl, std::mem::take(&mut self.fragments));
        if let Some(pair) = self.framebuffers.take() {
            pair.release(&mut gl);
        }
        self.uniforms.clear();

        let flagged = gl.get_error();
        drop(gl);
        log::debug!("engine destroyed");

        match flagged {
            None => Ok(()),
            Some(code) => Err(EngineError::CleanupFailed(code)),
        }
    }

    // ---- frame loop ----

    /// (Re)starts the frame loop at `fps` frames per second.
    pub fn set_frame_rate(&mut self, fps: f64) -> Result<()> {
        self.set_frame_rate_at(fps, Instant::now())
    }

    /// [`set_frame_rate`](Self::set_frame_rate) with an explicit start time.
    ///
    /// An invalid rate leaves the running loop untouched.
    pub fn set_frame_rate_at(&mut self, fps: f64, now: Instant) -> Result<()> {
        context(&mut self.gl)?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(EngineError::InvalidFrameRate(fps));
        }
        let period = Duration::try_from_secs_f64(1.0 / fps)
            .map_err(|_| EngineError::InvalidFrameRate(fps))?;

        self.frames.start(period, now);
        self.fps = Some(fps);
        log::debug!("frame loop at {fps} fps ({period:?})");
        Ok(())
    }

    pub fn stop_frame_loop(&mut self) {
        self.frames.stop();
        self.fps = None;
    }

    pub fn frame_state(&self) -> FrameState {
        FrameState {
            frame: self.frames.frame(),
            elapsed_ms: self.frames.elapsed_ms(),
            fps: self.fps,
        }
    }

    /// When the next frame is due, if the loop runs.
    pub fn next_frame_deadline(&self) -> Option<Instant> {
        self.frames.next_deadline()
    }

    /// Runs a frame if one is due at `now`.
    ///
    /// Callbacks run in registration order; a failing callback is logged and
    /// the rest still run.
    pub fn tick(&mut self, now: Instant) -> Option<FrameTick> {
        if self.gl.is_none() {
            return None;
        }
        let tick = self.frames.advance(now)?;

        let mut callbacks = self.frames.take_callbacks();
        for (key, callback) in callbacks.iter_mut() {
            if let Err(err) = callback(self, tick.frame, tick.elapsed_ms) {
                log::error!("frame callback {key} failed at frame {}: {err}", tick.frame);
            }
            if self.gl.is_none() {
                break;
            }
        }
        if self.gl.is_some() {
            self.frames.restore_callbacks(callbacks);
        }
        Some(tick)
    }

    /// Runs `callback` against this engine.
    ///
    /// With `repeat` it is registered under `key` (replacing a previous one)
    /// and runs on every frame; otherwise it runs once now and its result is
    /// returned.
    pub fn run_on_context<F>(
        &mut self,
        key: impl Into<String>,
        callback: F,
        repeat: bool,
    ) -> Result<Option<Value>>
    where
        F: FnMut(&mut Engine<G>, u64, f64) -> Result<Value> + 'static,
    {
        context(&mut self.gl)?;
        if repeat {
            self.frames.insert(key, Box::new(callback));
            return Ok(None);
        }

        let (frame, elapsed_ms) = (self.frames.frame(), self.frames.elapsed_ms());
        let mut callback = callback;
        callback(self, frame, elapsed_ms).map(Some)
    }

    pub fn frame_callback_keys(&self) -> Vec<String> {
        self.frames.keys().map(str::to_string).collect()
    }
}

impl<G: Graphics> Drop for Engine<G> {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            log::warn!("engine teardown: {err}");
        }
    }
}

impl<G: Graphics> fmt::Debug for Engine<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("size", &self.size)
            .field("destroyed", &self.gl.is_none())
            .field("program", &self.program_state())
            .field("groups", &self.groups.shape())
            .field("uniforms", &self.uniforms.len())
            .field("frame", &self.frame_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StaticFetcher;
    use crate::gfx::{error_code, GfxCall, Journal, RecordingGraphics, RecordingSurface};

    const VERTEX: &str = "attribute vec3 v_position;";
    const WAVES: &str = "uniform float u_time; uniform vec2 u_resolution; // waves";
    const BLUR: &str = "uniform vec2 u_resolution; uniform sampler2D u_prev; // blur";
    const GRADE: &str = "uniform float u_time; uniform sampler2D u_prev; // grade";

    fn engine(width: u32, height: u32) -> (Engine<RecordingGraphics>, Journal) {
        let surface = RecordingSurface::new(width, height);
        let journal = surface.journal();
        (Engine::new(surface).expect("engine"), journal)
    }

    fn linked_single(journal: &Journal, engine: &mut Engine<RecordingGraphics>) {
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shaders(&[WAVES]).unwrap();
        engine.use_program().unwrap();
        journal.clear_calls();
    }

    fn program_of(call: &GfxCall) -> Option<u32> {
        match call {
            GfxCall::Draw { program, .. } => *program,
            _ => None,
        }
    }

    #[test]
    fn construction_failures() {
        let mut refused = RecordingSurface::new(4, 4);
        refused.refuse_context = true;
        assert_eq!(
            Engine::<RecordingGraphics>::new(refused).unwrap_err(),
            EngineError::ContextUnavailable
        );

        let mut no_programs = RecordingSurface::new(4, 4);
        no_programs.refuse_programs = true;
        assert_eq!(
            Engine::<RecordingGraphics>::new(no_programs).unwrap_err(),
            EngineError::ProgramAllocationFailed
        );
    }

    #[test]
    fn construction_allocates_pair_at_surface_size() {
        let (engine, journal) = engine(320, 200);
        assert_eq!(journal.target_sizes(), vec![(320, 200), (320, 200)]);
        assert_eq!(journal.live_programs(), 1);
        assert_eq!(engine.program_state(), Some(ProgramState::Unlinked));

        let (_empty, journal) = self::engine(0, 0);
        assert_eq!(journal.live_targets(), 0);
    }

    #[test]
    fn failing_batch_rolls_back_and_keeps_previous_shaders() {
        let (mut engine, journal) = engine(8, 8);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shaders(&[WAVES]).unwrap();
        let before = journal.live_shaders();

        let err = engine
            .set_fragment_shaders(&[BLUR, "#error 'u_prev' undeclared at 1:12", GRADE])
            .unwrap_err();
        assert_eq!(err, EngineError::ShaderCompileFailed("'u_prev' undeclared at 1:12".into()));
        assert_eq!(journal.live_shaders(), before);

        engine.use_program().unwrap();
        assert_eq!(engine.program_state(), Some(ProgramState::Attached));
    }

    #[test]
    fn link_failure_deletes_program() {
        let (mut engine, journal) = engine(8, 8);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine
            .set_fragment_shaders(&["#link_error varying v_uv not written"])
            .unwrap();

        assert_eq!(
            engine.use_program().unwrap_err(),
            EngineError::ProgramLinkFailed("varying v_uv not written".into())
        );
        assert_eq!(engine.program_state(), None);
        assert_eq!(journal.live_programs(), 0);
        assert_eq!(engine.paint().unwrap_err(), EngineError::NoActiveProgram);

        engine.set_fragment_shaders(&[WAVES]).unwrap();
        engine.use_program().unwrap();
        assert_eq!(journal.live_programs(), 1);
        engine.paint().unwrap();
    }

    #[test]
    fn single_mode_uniforms_apply_on_link_then_immediately() {
        let (mut engine, journal) = engine(8, 8);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shaders(&[WAVES]).unwrap();

        engine.update_uniform("u_time", UniformValue::Scalar(0.5)).unwrap();
        assert!(journal.draws().is_empty());
        assert!(!journal.calls().iter().any(|c| matches!(c, GfxCall::Uniform { .. })));

        engine.use_program().unwrap();
        let program = journal
            .calls()
            .iter()
            .find_map(|c| match c {
                GfxCall::UseProgram(Some(p)) => Some(*p),
                _ => None,
            })
            .unwrap();
        assert_eq!(journal.uploads(program, "u_time"), 1);

        engine.update_uniform("u_resolution", [8.0, 8.0].into()).unwrap();
        engine.update_uniform("u_resolution", [8.0, 8.0].into()).unwrap();
        assert_eq!(journal.uploads(program, "u_resolution"), 1);

        assert_eq!(
            engine.update_uniform("u_mouse", [1.0, 1.0].into()),
            Err(EngineError::UniformNotFound("u_mouse".into()))
        );
        assert_eq!(
            engine.update_uniform("u_time", UniformValue::Vector(vec![])),
            Err(EngineError::EmptyUniformValue("u_time".into()))
        );
        assert_eq!(engine.uniform("u_time"), Some(&UniformValue::Scalar(0.5)));
    }

    #[test]
    fn single_mode_paint_draws_to_surface() {
        let (mut engine, journal) = engine(8, 8);
        linked_single(&journal, &mut engine);

        engine.paint().unwrap();
        let calls = journal.calls();
        assert!(matches!(calls.as_slice(), [
            GfxCall::UseProgram(Some(_)),
            GfxCall::BindTarget(None),
            GfxCall::Draw { target: None, .. },
            GfxCall::Present,
        ]));
    }

    #[test]
    fn groups_chain_through_ping_pong() {
        let (mut engine, journal) = engine(16, 16);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine
            .set_fragment_shader_groups(&[vec![WAVES, BLUR], vec![GRADE]])
            .unwrap();
        assert_eq!(engine.group_shape(), vec![2, 1]);
        journal.clear_calls();

        engine.paint().unwrap();
        let draws = journal.draws();
        assert_eq!(draws.len(), 3);

        let (a, b, c) = (&draws[0], &draws[1], &draws[2]);
        let GfxCall::Draw { target: Some(a_out), texture: Some(a_in), .. } = *a else {
            panic!("first pass must draw offscreen: {a:?}");
        };
        let GfxCall::Draw { target: Some(b_out), texture: Some(b_in), .. } = *b else {
            panic!("second pass must draw offscreen: {b:?}");
        };
        let GfxCall::Draw { target: None, texture: Some(c_in), .. } = *c else {
            panic!("last pass must draw to the surface: {c:?}");
        };

        assert_ne!(a_out, a_in);
        assert_eq!(b_in, a_out);
        assert_ne!(b_out, b_in);
        assert_eq!(c_in, b_out);

        let order: Vec<_> = draws.iter().filter_map(program_of).collect();
        assert!(order[0] < order[1] && order[1] < order[2]);
        assert_eq!(journal.calls().iter().filter(|c| **c == GfxCall::Present).count(), 1);
        assert_eq!(engine.check_vitals(), Ok(()));
        assert!(engine.group_program_states().iter().all(|s| *s == ProgramState::Attached));
    }

    #[test]
    fn group_uniforms_upload_only_changes() {
        let (mut engine, journal) = engine(16, 16);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shader_groups(&[vec![WAVES, BLUR]]).unwrap();
        engine.update_uniform("u_time", UniformValue::Scalar(1.0)).unwrap();
        engine.update_uniform("u_resolution", [16.0, 16.0].into()).unwrap();

        engine.paint().unwrap();
        let programs: Vec<_> = journal.draws().iter().filter_map(program_of).collect();
        let (waves, blur) = (programs[0], programs[1]);
        assert_eq!(journal.uploads(waves, "u_time"), 1);
        assert_eq!(journal.uploads(waves, "u_resolution"), 1);
        assert_eq!(journal.uploads(blur, "u_resolution"), 1);
        assert_eq!(journal.uploads(blur, "u_time"), 0);

        engine.paint().unwrap();
        assert_eq!(journal.uploads(waves, "u_time"), 1);
        assert_eq!(journal.uploads(blur, "u_resolution"), 1);

        engine.update_uniform("u_time", UniformValue::Scalar(2.0)).unwrap();
        engine.paint().unwrap();
        assert_eq!(journal.uploads(waves, "u_time"), 2);
        assert_eq!(journal.uploads(waves, "u_resolution"), 1);
        assert_eq!(journal.uploads(blur, "u_resolution"), 1);
    }

    #[test]
    fn groups_require_vertex_shader() {
        let (mut engine, journal) = engine(8, 8);
        assert_eq!(
            engine.set_fragment_shader_groups(&[vec![WAVES]]).unwrap_err(),
            EngineError::MissingVertexShader
        );
        assert_eq!(journal.live_shaders(), 0);
    }

    #[test]
    fn group_link_failure_discards_the_whole_call() {
        let (mut engine, journal) = engine(8, 8);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shader_groups(&[vec![WAVES]]).unwrap();
        let (programs, shaders) = (journal.live_programs(), journal.live_shaders());

        let err = engine
            .set_fragment_shader_groups(&[vec![BLUR], vec!["#link_error too many varyings"]])
            .unwrap_err();
        assert_eq!(err, EngineError::ProgramLinkFailed("too many varyings".into()));
        assert_eq!(journal.live_programs(), programs);
        assert_eq!(journal.live_shaders(), shaders);
        assert_eq!(engine.group_shape(), vec![1]);
    }

    #[test]
    fn switching_modes_releases_the_other() {
        let (mut engine, journal) = engine(8, 8);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shaders(&[WAVES, GRADE]).unwrap();
        engine.set_fragment_shader_groups(&[vec![BLUR], vec![GRADE]]).unwrap();
        // vertex + two group fragments; single container + two group programs
        assert_eq!(journal.live_shaders(), 3);
        assert_eq!(journal.live_programs(), 3);

        engine.set_fragment_shaders(&[WAVES]).unwrap();
        assert!(engine.group_shape().is_empty());
        assert_eq!(journal.live_shaders(), 2);
        assert_eq!(journal.live_programs(), 1);
    }

    #[test]
    fn leaving_group_mode_requires_a_new_link() {
        let (mut engine, journal) = engine(8, 8);
        linked_single(&journal, &mut engine);
        engine.set_fragment_shader_groups(&[vec![BLUR], vec![GRADE]]).unwrap();
        assert_eq!(engine.program_state(), Some(ProgramState::Unlinked));
        engine.paint().unwrap();
        assert_eq!(engine.check_vitals(), Ok(()));

        engine.set_fragment_shaders(&[WAVES]).unwrap();
        assert_eq!(engine.program_state(), Some(ProgramState::Unlinked));
        assert_eq!(engine.paint(), Err(EngineError::NoActiveProgram));
        // deferred until the next link
        engine.update_uniform("u_time", UniformValue::Scalar(2.0)).unwrap();
        assert_eq!(journal.live_programs(), 1);

        engine.use_program().unwrap();
        journal.clear_calls();
        engine.paint().unwrap();
        assert_eq!(engine.check_vitals(), Ok(()));

        let draws = journal.draws();
        assert_eq!(draws.len(), 1);
        assert!(program_of(&draws[0]).is_some());
        engine.update_uniform("u_time", UniformValue::Scalar(3.0)).unwrap();
    }

    #[test]
    fn replacing_linked_fragments_requires_a_new_link() {
        let (mut engine, journal) = engine(8, 8);
        linked_single(&journal, &mut engine);

        engine.set_fragment_shaders(&[GRADE]).unwrap();
        assert_eq!(engine.program_state(), Some(ProgramState::Unlinked));
        assert_eq!(engine.paint(), Err(EngineError::NoActiveProgram));

        engine.use_program().unwrap();
        engine.paint().unwrap();
        assert_eq!(engine.check_vitals(), Ok(()));
        assert_eq!(journal.live_programs(), 1);
    }

    #[test]
    fn replacing_the_vertex_shader_detaches_the_old_one() {
        let (mut engine, journal) = engine(8, 8);
        linked_single(&journal, &mut engine);

        engine.set_vertex_shader("attribute vec3 v_position; // v2").unwrap();
        assert_eq!(journal.live_shaders(), 2);
        assert!(journal.calls().iter().any(|c| matches!(c, GfxCall::DetachShader { .. })));

        engine.use_program().unwrap();
        assert_eq!(engine.check_vitals(), Ok(()));
    }

    #[test]
    fn resize_is_idempotent_and_repaints() {
        let (mut engine, journal) = engine(8, 8);
        linked_single(&journal, &mut engine);

        engine.resize(8, 8).unwrap();
        assert!(journal.calls().is_empty());

        engine.resize(64, 32).unwrap();
        assert_eq!(journal.target_sizes(), vec![(64, 32), (64, 32)]);
        assert_eq!(journal.draws().len(), 1);
        assert!(journal.calls().contains(&GfxCall::ResizeSurface(64, 32)));

        journal.clear_calls();
        engine.resize(64, 32).unwrap();
        assert!(journal.calls().is_empty());
        assert_eq!(engine.size(), (64, 32));
    }

    #[test]
    fn zero_size_drops_the_pair() {
        let (mut engine, journal) = engine(8, 8);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shader_groups(&[vec![WAVES]]).unwrap();

        engine.resize(0, 0).unwrap();
        assert_eq!(journal.live_targets(), 0);
        assert!(!engine.is_paintable());
        assert_eq!(engine.paint().unwrap_err(), EngineError::FramebufferUnavailable);
    }

    #[test]
    fn vitals_report_latched_error_once() {
        let (mut engine, journal) = engine(8, 8);
        assert_eq!(engine.check_vitals(), Ok(()));
        journal.inject_error(error_code::INVALID_VALUE);
        assert_eq!(
            engine.check_vitals(),
            Err(EngineError::GraphicsApi(error_code::INVALID_VALUE))
        );
        assert_eq!(engine.check_vitals(), Ok(()));
    }

    #[test]
    fn frame_rate_sets_period_and_rejects_invalid_values() {
        let (mut engine, _) = engine(8, 8);
        let t0 = Instant::now();

        engine.set_frame_rate_at(50.0, t0).unwrap();
        assert_eq!(engine.next_frame_deadline(), Some(t0 + Duration::from_millis(20)));

        for bad in [0.0, -30.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                engine.set_frame_rate_at(bad, t0 + Duration::from_secs(1)),
                Err(EngineError::InvalidFrameRate(_))
            ));
        }
        assert_eq!(engine.next_frame_deadline(), Some(t0 + Duration::from_millis(20)));
        assert_eq!(engine.frame_state().fps, Some(50.0));

        engine.set_frame_rate_at(25.0, t0).unwrap();
        assert_eq!(engine.next_frame_deadline(), Some(t0 + Duration::from_millis(40)));

        engine.stop_frame_loop();
        assert_eq!(engine.next_frame_deadline(), None);
        assert_eq!(engine.frame_state().fps, None);
    }

    #[test]
    fn slow_frame_rates_accumulate_full_periods() {
        let (mut engine, _) = engine(8, 8);
        let t0 = Instant::now();
        engine.set_frame_rate_at(1.0, t0).unwrap();

        let tick = engine.tick(t0 + Duration::from_secs(1)).expect("due");
        assert_eq!(tick.frame, 1);
        assert!((engine.frame_state().elapsed_ms - 1000.0).abs() < 1e-6);

        engine.tick(t0 + Duration::from_secs(2)).expect("due");
        assert!((engine.frame_state().elapsed_ms - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn frame_callbacks_run_in_order_and_survive_failures() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let (mut engine, _) = engine(8, 8);
        let seen = Rc::new(RefCell::new(Vec::new()));

        for key in ["first", "broken", "last"] {
            let seen = Rc::clone(&seen);
            engine
                .run_on_context(
                    key,
                    move |_, frame, _| {
                        seen.borrow_mut().push((key, frame));
                        if key == "broken" {
                            return Err(EngineError::Hook("boom".into()));
                        }
                        Ok(Value::Null)
                    },
                    true,
                )
                .unwrap();
        }
        let seen_replaced = Rc::clone(&seen);
        engine
            .run_on_context(
                "first",
                move |_, frame, _| {
                    seen_replaced.borrow_mut().push(("first-v2", frame));
                    Ok(Value::Null)
                },
                true,
            )
            .unwrap();
        assert_eq!(engine.frame_callback_keys(), ["first", "broken", "last"]);

        let t0 = Instant::now();
        engine.set_frame_rate_at(100.0, t0).unwrap();
        assert!(engine.tick(t0 + Duration::from_millis(5)).is_none());

        let tick = engine.tick(t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(tick.frame, 1);
        assert!((tick.elapsed_ms - 10.0).abs() < 1e-6);
        assert_eq!(
            *seen.borrow(),
            vec![("first-v2", 1), ("broken", 1), ("last", 1)]
        );

        engine.tick(t0 + Duration::from_millis(20)).unwrap();
        assert_eq!(seen.borrow().len(), 6);
        assert_eq!(engine.frame_state().frame, 2);
    }

    #[test]
    fn run_once_returns_the_result() {
        let (mut engine, _) = engine(8, 8);
        let out = engine
            .run_on_context("size", |e, frame, _| Ok(serde_json::json!([e.size().0, frame])), false)
            .unwrap();
        assert_eq!(out, Some(serde_json::json!([8, 0])));
        assert!(engine.frame_callback_keys().is_empty());
    }

    #[test]
    fn callbacks_may_paint_and_update_uniforms() {
        let (mut engine, journal) = engine(8, 8);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shader_groups(&[vec![WAVES]]).unwrap();
        engine
            .run_on_context(
                "animate",
                |e, _, elapsed| {
                    e.update_uniform("u_time", UniformValue::Scalar(elapsed as f32 / 1000.0))?;
                    e.paint()?;
                    Ok(Value::Null)
                },
                true,
            )
            .unwrap();

        let t0 = Instant::now();
        engine.set_frame_rate_at(60.0, t0).unwrap();
        engine.tick(t0 + Duration::from_millis(17)).unwrap();
        engine.tick(t0 + Duration::from_millis(34)).unwrap();

        assert_eq!(journal.draws().len(), 2);
        let program = program_of(&journal.draws()[0]).unwrap();
        assert_eq!(journal.uploads(program, "u_time"), 2);
    }

    #[test]
    fn remote_sources_go_through_the_fetcher() {
        let fetcher = StaticFetcher::new()
            .with("https://shaders.test/quad.vert", VERTEX)
            .with("https://shaders.test/waves.frag", WAVES);
        let (engine, journal) = engine(8, 8);
        let mut engine = engine.with_fetcher(fetcher);

        engine.set_remote_vertex_shader("https://shaders.test/quad.vert").unwrap();
        let err = engine
            .set_remote_fragment_shaders(&["https://shaders.test/missing.frag".to_string()])
            .unwrap_err();
        assert!(matches!(err, EngineError::RemoteShaderFetchFailed(_)));
        assert_eq!(journal.live_shaders(), 1);

        engine
            .set_remote_fragment_shader_groups(&[vec![
                "https://shaders.test/waves.frag".to_string(),
            ]])
            .unwrap();
        assert_eq!(engine.group_shape(), vec![1]);
    }

    #[test]
    fn compile_program_is_all_or_nothing() {
        let (mut engine, journal) = engine(8, 8);
        let err = engine
            .compile_program(VERTEX, &[WAVES, "#error expected ';'"])
            .unwrap_err();
        assert_eq!(err, EngineError::ShaderCompileFailed("expected ';'".into()));
        assert_eq!(journal.live_shaders(), 0);

        engine.compile_program(VERTEX, &[WAVES]).unwrap();
        engine.use_program().unwrap();
        engine.setup_whole_screen_quad().unwrap();
        assert!(journal.calls().iter().any(|c| matches!(c, GfxCall::SetupQuad(_))));
    }

    #[test]
    fn destroy_releases_everything() {
        let (mut engine, journal) = engine(8, 8);
        engine.set_vertex_shader(VERTEX).unwrap();
        engine.set_fragment_shader_groups(&[vec![WAVES, BLUR], vec![GRADE]]).unwrap();
        engine.update_uniform("u_time", UniformValue::Scalar(1.0)).unwrap();
        engine.set_frame_rate(30.0).unwrap();

        engine.destroy().unwrap();
        assert_eq!(
            (journal.live_shaders(), journal.live_programs(), journal.live_targets()),
            (0, 0, 0)
        );
        assert!(engine.is_destroyed());
        assert_eq!(engine.next_frame_deadline(), None);
        assert_eq!(engine.uniform_count(), 0);
        assert_eq!(engine.check_vitals(), Err(EngineError::ContextUnavailable));
        assert_eq!(engine.paint(), Err(EngineError::ContextUnavailable));
        assert_eq!(engine.destroy(), Ok(()));
    }

    #[test]
    fn destroy_reports_cleanup_error_but_still_tears_down() {
        let (mut engine, journal) = engine(8, 8);
        linked_single(&journal, &mut engine);
        journal.inject_error(error_code::OUT_OF_MEMORY);

        assert_eq!(engine.destroy(), Err(EngineError::CleanupFailed(error_code::OUT_OF_MEMORY)));
        assert!(engine.is_destroyed());
        assert_eq!(journal.live_programs(), 0);
    }

    #[test]
    fn drop_destroys() {
        let (mut engine, journal) = engine(8, 8);
        linked_single(&journal, &mut engine);
        drop(engine);
        assert_eq!(
            (journal.live_shaders(), journal.live_programs(), journal.live_targets()),
            (0, 0, 0)
        );
    }

    #[test]
    fn callback_destroying_the_engine_ends_the_tick() {
        let (mut engine, _) = engine(8, 8);
        engine
            .run_on_context("teardown", |e, _, _| e.destroy().map(|_| Value::Null), true)
            .unwrap();
        let t0 = Instant::now();
        engine.set_frame_rate_at(10.0, t0).unwrap();

        assert!(engine.tick(t0 + Duration::from_millis(100)).is_some());
        assert!(engine.is_destroyed());
        assert!(engine.frame_callback_keys().is_empty());
        assert!(engine.tick(t0 + Duration::from_millis(200)).is_none());
    }
}
