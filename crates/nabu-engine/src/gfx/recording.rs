//! In-memory graphics backend.
//!
//! Every call is appended to a shared [`Journal`] so tests can assert on the
//! exact command stream after the context has moved to another thread.
//!
//! Shader sources drive failures:
//! - a line `#error <msg>` fails compilation with `<msg>` as the diagnostic
//! - a line `#link_error <msg>` in any attached shader fails linking
//!
//! A uniform location exists when the name appears in a shader attached to a
//! linked program.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Graphics, ShaderStage};

/// One recorded graphics call.
#[derive(Debug, Clone, PartialEq)]
pub enum GfxCall {
    CreateProgram(u32),
    DeleteProgram(u32),
    CreateShader(u32, ShaderStage),
    CompileShader(u32),
    DeleteShader(u32),
    AttachShader { program: u32, shader: u32 },
    DetachShader { program: u32, shader: u32 },
    LinkProgram(u32),
    UseProgram(Option<u32>),
    SetupQuad(u32),
    Uniform { program: u32, name: String, values: Vec<f32> },
    CreateTarget { id: u32, width: u32, height: u32 },
    DeleteTarget(u32),
    BindTarget(Option<u32>),
    BindTexture(Option<u32>),
    Viewport(u32, u32),
    Clear,
    Draw { program: Option<u32>, target: Option<u32>, texture: Option<u32> },
    Present,
    ResizeSurface(u32, u32),
}

#[derive(Debug, Default)]
struct JournalState {
    calls: Vec<GfxCall>,
    live_shaders: HashSet<u32>,
    live_programs: HashSet<u32>,
    live_targets: HashSet<u32>,
    target_sizes: HashMap<u32, (u32, u32)>,
    pending_error: Option<u32>,
}

/// Shared view of a recording context.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<JournalState>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<GfxCall> {
        self.0.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.0.lock().calls.clear();
    }

    pub fn live_shaders(&self) -> usize {
        self.0.lock().live_shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.0.lock().live_programs.len()
    }

    pub fn live_targets(&self) -> usize {
        self.0.lock().live_targets.len()
    }

    /// Sizes of the offscreen targets currently alive.
    pub fn target_sizes(&self) -> Vec<(u32, u32)> {
        let state = self.0.lock();
        let mut sizes: Vec<_> = state
            .live_targets
            .iter()
            .filter_map(|id| state.target_sizes.get(id).copied())
            .collect();
        sizes.sort_unstable();
        sizes
    }

    /// Recorded draws in submission order.
    pub fn draws(&self) -> Vec<GfxCall> {
        self.0
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, GfxCall::Draw { .. }))
            .cloned()
            .collect()
    }

    /// Number of uploads of uniform `name` to `program`.
    pub fn uploads(&self, program: u32, name: &str) -> usize {
        self.0
            .lock()
            .calls
            .iter()
            .filter(|c| match c {
                GfxCall::Uniform { program: p, name: n, .. } => *p == program && n == name,
                _ => false,
            })
            .count()
    }

    /// Latches `code` so the next error query reports it.
    pub fn inject_error(&self, code: u32) {
        self.0.lock().pending_error = Some(code);
    }

    fn record(&self, call: GfxCall) {
        self.0.lock().calls.push(call);
    }
}

/// Surface handle for [`RecordingGraphics`].
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    pub width: u32,
    pub height: u32,
    /// Refuse to hand out a context.
    pub refuse_context: bool,
    /// Refuse to create program objects.
    pub refuse_programs: bool,
    pub journal: Journal,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            refuse_context: false,
            refuse_programs: false,
            journal: Journal::new(),
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

#[derive(Debug)]
struct ShaderObject {
    source: String,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<u32>,
    linked: bool,
}

/// Graphics context that records instead of rendering.
#[derive(Debug)]
pub struct RecordingGraphics {
    journal: Journal,
    size: (u32, u32),
    refuse_programs: bool,
    next_id: u32,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    current_program: Option<u32>,
    bound_target: Option<u32>,
    bound_texture: Option<u32>,
}

impl RecordingGraphics {
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn latch(&self, code: u32) {
        self.journal.0.lock().pending_error.get_or_insert(code);
    }

    fn directive<'a>(source: &'a str, name: &str) -> Option<&'a str> {
        source.lines().find_map(|line| {
            line.trim_start()
                .strip_prefix(name)
                .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
                .map(str::trim)
        })
    }

    fn upload(&mut self, location: &RecordedLocation, values: Vec<f32>) {
        if self.current_program != Some(location.program) {
            self.latch(super::error_code::INVALID_OPERATION);
            return;
        }
        self.journal.record(GfxCall::Uniform {
            program: location.program,
            name: location.name.clone(),
            values,
        });
    }
}

/// Uniform location handed out by [`RecordingGraphics`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLocation {
    pub program: u32,
    pub name: String,
}

impl Graphics for RecordingGraphics {
    type Surface = RecordingSurface;
    type Shader = u32;
    type Program = u32;
    type UniformLocation = RecordedLocation;
    type Target = u32;

    fn from_surface(surface: RecordingSurface) -> Option<Self> {
        if surface.refuse_context {
            return None;
        }
        Some(Self {
            journal: surface.journal,
            size: (surface.width, surface.height),
            refuse_programs: surface.refuse_programs,
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            bound_target: None,
            bound_texture: None,
        })
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.journal.record(GfxCall::ResizeSurface(width, height));
    }

    fn create_program(&mut self) -> Option<u32> {
        if self.refuse_programs {
            return None;
        }
        let id = self.alloc_id();
        self.programs.insert(id, ProgramObject::default());
        self.journal.0.lock().live_programs.insert(id);
        self.journal.record(GfxCall::CreateProgram(id));
        Some(id)
    }

    fn delete_program(&mut self, program: u32) {
        if self.programs.remove(&program).is_none() {
            self.latch(super::error_code::INVALID_VALUE);
            return;
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.journal.0.lock().live_programs.remove(&program);
        self.journal.record(GfxCall::DeleteProgram(program));
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Option<u32> {
        let id = self.alloc_id();
        self.shaders.insert(id, ShaderObject { source: String::new() });
        self.journal.0.lock().live_shaders.insert(id);
        self.journal.record(GfxCall::CreateShader(id, stage));
        Some(id)
    }

    fn shader_source(&mut self, shader: u32, source: &str) {
        match self.shaders.get_mut(&shader) {
            Some(obj) => obj.source = source.to_string(),
            None => self.latch(super::error_code::INVALID_VALUE),
        }
    }

    fn compile_shader(&mut self, shader: u32) -> Result<(), String> {
        self.journal.record(GfxCall::CompileShader(shader));
        let Some(obj) = self.shaders.get(&shader) else {
            return Err(format!("shader {shader} does not exist"));
        };
        match Self::directive(&obj.source, "#error") {
            Some(msg) => Err(msg.to_string()),
            None => Ok(()),
        }
    }

    fn delete_shader(&mut self, shader: u32) {
        if self.shaders.remove(&shader).is_none() {
            self.latch(super::error_code::INVALID_VALUE);
            return;
        }
        self.journal.0.lock().live_shaders.remove(&shader);
        self.journal.record(GfxCall::DeleteShader(shader));
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        match self.programs.get_mut(&program) {
            Some(p) if self.shaders.contains_key(&shader) => {
                p.attached.push(shader);
                self.journal.record(GfxCall::AttachShader { program, shader });
            }
            _ => self.latch(super::error_code::INVALID_VALUE),
        }
    }

    fn detach_shader(&mut self, program: u32, shader: u32) {
        match self.programs.get_mut(&program) {
            Some(p) => {
                p.attached.retain(|s| *s != shader);
                self.journal.record(GfxCall::DetachShader { program, shader });
            }
            None => self.latch(super::error_code::INVALID_VALUE),
        }
    }

    fn link_program(&mut self, program: u32) -> Result<(), String> {
        self.journal.record(GfxCall::LinkProgram(program));
        let Some(p) = self.programs.get(&program) else {
            return Err(format!("program {program} does not exist"));
        };
        let failure = p
            .attached
            .iter()
            .filter_map(|s| self.shaders.get(s))
            .find_map(|s| Self::directive(&s.source, "#link_error"));
        if let Some(msg) = failure {
            return Err(msg.to_string());
        }
        if let Some(p) = self.programs.get_mut(&program) {
            p.linked = true;
        }
        Ok(())
    }

    fn use_program(&mut self, program: Option<u32>) {
        if let Some(id) = program {
            if !self.programs.get(&id).is_some_and(|p| p.linked) {
                self.latch(super::error_code::INVALID_OPERATION);
                return;
            }
        }
        self.current_program = program;
        self.journal.record(GfxCall::UseProgram(program));
    }

    fn setup_quad(&mut self, program: u32) {
        self.journal.record(GfxCall::SetupQuad(program));
    }

    fn uniform_location(&mut self, program: u32, name: &str) -> Option<RecordedLocation> {
        let p = self.programs.get(&program).filter(|p| p.linked)?;
        let declared = p
            .attached
            .iter()
            .filter_map(|s| self.shaders.get(s))
            .any(|s| s.source.contains(name));
        declared.then(|| RecordedLocation {
            program,
            name: name.to_string(),
        })
    }

    fn uniform_1f(&mut self, location: &RecordedLocation, x: f32) {
        self.upload(location, vec![x]);
    }

    fn uniform_2f(&mut self, location: &RecordedLocation, x: f32, y: f32) {
        self.upload(location, vec![x, y]);
    }

    fn uniform_3f(&mut self, location: &RecordedLocation, x: f32, y: f32, z: f32) {
        self.upload(location, vec![x, y, z]);
    }

    fn uniform_4f(&mut self, location: &RecordedLocation, x: f32, y: f32, z: f32, w: f32) {
        self.upload(location, vec![x, y, z, w]);
    }

    fn create_target(&mut self, width: u32, height: u32) -> Option<u32> {
        if width == 0 || height == 0 {
            return None;
        }
        let id = self.alloc_id();
        {
            let mut state = self.journal.0.lock();
            state.live_targets.insert(id);
            state.target_sizes.insert(id, (width, height));
        }
        self.journal.record(GfxCall::CreateTarget { id, width, height });
        Some(id)
    }

    fn delete_target(&mut self, target: u32) {
        if !self.journal.0.lock().live_targets.remove(&target) {
            self.latch(super::error_code::INVALID_VALUE);
            return;
        }
        if self.bound_target == Some(target) {
            self.bound_target = None;
        }
        if self.bound_texture == Some(target) {
            self.bound_texture = None;
        }
        self.journal.record(GfxCall::DeleteTarget(target));
    }

    fn bind_target(&mut self, target: Option<u32>) {
        self.bound_target = target;
        self.journal.record(GfxCall::BindTarget(target));
    }

    fn bind_texture(&mut self, target: Option<u32>) {
        self.bound_texture = target;
        self.journal.record(GfxCall::BindTexture(target));
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.journal.record(GfxCall::Viewport(width, height));
    }

    fn clear(&mut self) {
        self.journal.record(GfxCall::Clear);
    }

    fn draw_quad(&mut self) {
        if self.current_program.is_none() {
            self.latch(super::error_code::INVALID_OPERATION);
        }
        if self.bound_target.is_some() && self.bound_target == self.bound_texture {
            // Feedback loop: sampling the texture being rendered to.
            self.latch(super::error_code::INVALID_OPERATION);
        }
        self.journal.record(GfxCall::Draw {
            program: self.current_program,
            target: self.bound_target,
            texture: self.bound_texture,
        });
    }

    fn present(&mut self) {
        self.journal.record(GfxCall::Present);
    }

    fn get_error(&mut self) -> Option<u32> {
        self.journal.0.lock().pending_error.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> (RecordingGraphics, Journal) {
        let surface = RecordingSurface::new(64, 32);
        let journal = surface.journal();
        (RecordingGraphics::from_surface(surface).expect("context"), journal)
    }

    #[test]
    fn refused_context() {
        let mut surface = RecordingSurface::new(1, 1);
        surface.refuse_context = true;
        assert!(RecordingGraphics::from_surface(surface).is_none());
    }

    #[test]
    fn compile_error_directive_is_the_diagnostic() {
        let (mut gl, _) = ctx();
        let s = gl.create_shader(ShaderStage::Fragment).unwrap();
        gl.shader_source(s, "void main() {}\n#error missing semicolon at 3:4\n");
        assert_eq!(gl.compile_shader(s), Err("missing semicolon at 3:4".into()));
    }

    #[test]
    fn uniform_location_requires_link_and_declaration() {
        let (mut gl, _) = ctx();
        let p = gl.create_program().unwrap();
        let s = gl.create_shader(ShaderStage::Fragment).unwrap();
        gl.shader_source(s, "uniform vec2 u_resolution;");
        gl.attach_shader(p, s);
        assert!(gl.uniform_location(p, "u_resolution").is_none());
        gl.link_program(p).unwrap();
        assert!(gl.uniform_location(p, "u_resolution").is_some());
        assert!(gl.uniform_location(p, "u_time").is_none());
    }

    #[test]
    fn feedback_draw_latches_error() {
        let (mut gl, journal) = ctx();
        let p = gl.create_program().unwrap();
        gl.link_program(p).unwrap();
        gl.use_program(Some(p));
        let t = gl.create_target(4, 4).unwrap();
        gl.bind_target(Some(t));
        gl.bind_texture(Some(t));
        gl.draw_quad();
        assert_eq!(gl.get_error(), Some(super::super::error_code::INVALID_OPERATION));
        assert_eq!(gl.get_error(), None);
        assert_eq!(journal.draws().len(), 1);
    }

    #[test]
    fn live_object_tracking() {
        let (mut gl, journal) = ctx();
        let s = gl.create_shader(ShaderStage::Vertex).unwrap();
        let t = gl.create_target(8, 8).unwrap();
        assert_eq!((journal.live_shaders(), journal.live_targets()), (1, 1));
        gl.delete_shader(s);
        gl.delete_target(t);
        assert_eq!((journal.live_shaders(), journal.live_targets()), (0, 0));
    }
}
