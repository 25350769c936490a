use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::reflect::{self, UniformBlock, UniformField};
use super::surface::{self, WgpuSurface};
use crate::gfx::{error_code, Graphics, ShaderStage, QUAD_FAN};

/// Fan triangulation of [`QUAD_FAN`]; wgpu has no fan topology.
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ShaderId(u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TargetId(u32);

/// Uniform location: byte range inside a program's uniform buffer.
#[derive(Debug, Clone)]
pub struct UniformSlot {
    program: ProgramId,
    field: UniformField,
}

struct ShaderObject {
    stage: ShaderStage,
    source: String,
    module: Option<naga::Module>,
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    block: UniformBlock,
    ubo: wgpu::Buffer,
    staging: Vec<u8>,
    dirty: bool,
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<ShaderId>,
    linked: Option<LinkedProgram>,
}

struct OffscreenTarget {
    // Kept alive for the view.
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

#[derive(Debug, Clone)]
struct LatchedError {
    code: u32,
    message: String,
}

/// wgpu implementation of [`Graphics`].
///
/// Draw calls are recorded into one command encoder and submitted on
/// [`Graphics::present`]. Uniform values live in a CPU staging copy per program
/// and are written to the GPU right before the program's next draw.
pub struct WgpuGraphics {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    clear_color: wgpu::Color,

    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    blank_view: wgpu::TextureView,
    quad_vbo: wgpu::Buffer,
    quad_ibo: wgpu::Buffer,

    next_id: u32,
    shaders: HashMap<ShaderId, ShaderObject>,
    programs: HashMap<ProgramId, ProgramObject>,
    targets: HashMap<TargetId, OffscreenTarget>,

    current_program: Option<ProgramId>,
    bound_target: Option<TargetId>,
    bound_texture: Option<TargetId>,
    viewport: (u32, u32),
    pending_clear: bool,

    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,

    error: Arc<Mutex<Option<LatchedError>>>,
}

impl WgpuGraphics {
    fn create(surface: WgpuSurface) -> anyhow::Result<Self> {
        let WgpuSurface {
            instance,
            surface,
            width,
            height,
            init,
        } = surface;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: init.power_preference,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("nabu-engine device"),
            required_features: wgpu::Features::empty(),
            required_limits: init.required_limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))?;

        // Errors are latched instead of panicking; the engine polls them.
        let error: Arc<Mutex<Option<LatchedError>>> = Arc::default();
        let slot = Arc::clone(&error);
        device.on_uncaptured_error(Arc::new(move |e: wgpu::Error| {
            let code = match &e {
                wgpu::Error::OutOfMemory { .. } => error_code::OUT_OF_MEMORY,
                wgpu::Error::Validation { .. } => error_code::INVALID_OPERATION,
                _ => error_code::INVALID_ENUM,
            };
            log::debug!("wgpu error latched ({code:#06x}): {e}");
            slot.lock().get_or_insert(LatchedError {
                code,
                message: e.to_string(),
            });
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps, init.prefer_srgb)
            .ok_or_else(|| anyhow::anyhow!("no supported surface formats"))?;
        let alpha_mode = surface::choose_alpha_mode(&caps, init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        if width > 0 && height > 0 {
            surface.configure(&device, &config);
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("nabu pass bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nabu pass pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nabu pass sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let blank = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("nabu blank texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let blank_view = blank.create_view(&wgpu::TextureViewDescriptor::default());

        let quad_vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("nabu quad vbo"),
            contents: bytemuck::cast_slice(&QUAD_FAN),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_ibo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("nabu quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            clear_color: init.clear_color,
            bind_group_layout,
            pipeline_layout,
            sampler,
            blank_view,
            quad_vbo,
            quad_ibo,
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            targets: HashMap::new(),
            current_program: None,
            bound_target: None,
            bound_texture: None,
            viewport: (width, height),
            pending_clear: false,
            encoder: None,
            frame: None,
            error,
        })
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn latch(&self, code: u32, message: impl Into<String>) {
        self.error.lock().get_or_insert(LatchedError {
            code,
            message: message.into(),
        });
    }

    fn take_latched(&self) -> Option<LatchedError> {
        self.error.lock().take()
    }

    fn submit_pending(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn acquire_frame(&mut self) -> bool {
        if self.frame.is_some() {
            return true;
        }
        let texture = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(err) => {
                if !surface::recover_surface(&self.surface, &self.device, &self.config, &err) {
                    log::warn!("surface frame unavailable: {err}");
                    return false;
                }
                match self.surface.get_current_texture() {
                    Ok(t) => t,
                    Err(err) => {
                        log::warn!("surface frame unavailable after reconfigure: {err}");
                        return false;
                    }
                }
            }
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some((texture, view));
        true
    }

    fn build_pipeline(
        &self,
        vertex: &naga::Module,
        vertex_src: &str,
        fragment: &naga::Module,
        fragment_src: &str,
    ) -> Result<wgpu::RenderPipeline, String> {
        let vs_entry = reflect::entry_point(vertex, naga::ShaderStage::Vertex)
            .ok_or("vertex shader has no @vertex entry point")?;
        let fs_entry = reflect::entry_point(fragment, naga::ShaderStage::Fragment)
            .ok_or("fragment shader has no @fragment entry point")?;

        let vs = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("nabu vertex"),
            source: wgpu::ShaderSource::Wgsl(vertex_src.into()),
        });
        let fs = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("nabu fragment"),
            source: wgpu::ShaderSource::Wgsl(fragment_src.into()),
        });

        let attrs = wgpu::vertex_attr_array![0 => Float32x3];
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("nabu pass pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vs,
                    entry_point: Some(vs_entry.as_str()),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attrs,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fs,
                    entry_point: Some(fs_entry.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        // Pipeline validation errors are reported synchronously through the
        // uncaptured-error handler on native backends.
        match self.take_latched() {
            Some(e) => Err(e.message),
            None => Ok(pipeline),
        }
    }

    fn write_uniform(&mut self, slot: &UniformSlot, values: &[f32]) {
        if self.current_program != Some(slot.program) {
            self.latch(error_code::INVALID_OPERATION, "uniform set on inactive program");
            return;
        }
        if usize::from(slot.field.components) != values.len() {
            self.latch(error_code::INVALID_OPERATION, "uniform size mismatch");
            return;
        }
        let Some(linked) = self
            .programs
            .get_mut(&slot.program)
            .and_then(|p| p.linked.as_mut())
        else {
            self.latch(error_code::INVALID_OPERATION, "program is not linked");
            return;
        };
        let start = slot.field.offset as usize;
        let bytes: &[u8] = bytemuck::cast_slice(values);
        linked.staging[start..start + bytes.len()].copy_from_slice(bytes);
        linked.dirty = true;
    }
}

impl Graphics for WgpuGraphics {
    type Surface = WgpuSurface;
    type Shader = ShaderId;
    type Program = ProgramId;
    type UniformLocation = UniformSlot;
    type Target = TargetId;

    fn from_surface(surface: WgpuSurface) -> Option<Self> {
        match Self::create(surface) {
            Ok(gfx) => Some(gfx),
            Err(e) => {
                log::error!("failed to obtain wgpu context: {e:#}");
                None
            }
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        // An acquired frame belongs to the old configuration.
        self.submit_pending();
        if let Some((texture, _)) = self.frame.take() {
            texture.present();
        }
        surface::apply_resize(&self.surface, &self.device, &mut self.config, width, height);
    }

    fn create_program(&mut self) -> Option<ProgramId> {
        let id = ProgramId(self.alloc_id());
        self.programs.insert(id, ProgramObject::default());
        Some(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            self.latch(error_code::INVALID_VALUE, "delete of unknown program");
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId> {
        let id = ShaderId(self.alloc_id());
        self.shaders.insert(
            id,
            ShaderObject {
                stage,
                source: String::new(),
                module: None,
            },
        );
        Some(id)
    }

    fn shader_source(&mut self, shader: ShaderId, source: &str) {
        match self.shaders.get_mut(&shader) {
            Some(obj) => {
                obj.source = source.to_string();
                obj.module = None;
            }
            None => self.latch(error_code::INVALID_VALUE, "source for unknown shader"),
        }
    }

    fn compile_shader(&mut self, shader: ShaderId) -> Result<(), String> {
        let obj = self
            .shaders
            .get_mut(&shader)
            .ok_or_else(|| format!("shader {shader:?} does not exist"))?;
        let module = reflect::compile(&obj.source)?;
        let wanted = match obj.stage {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        };
        if reflect::entry_point(&module, wanted).is_none() {
            return Err(format!("no {wanted:?} entry point"));
        }
        obj.module = Some(module);
        Ok(())
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(&shader).is_none() {
            self.latch(error_code::INVALID_VALUE, "delete of unknown shader");
        }
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        match self.programs.get_mut(&program) {
            Some(p) if self.shaders.contains_key(&shader) => p.attached.push(shader),
            _ => self.latch(error_code::INVALID_VALUE, "attach of unknown object"),
        }
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        match self.programs.get_mut(&program) {
            Some(p) => p.attached.retain(|s| *s != shader),
            None => self.latch(error_code::INVALID_VALUE, "detach from unknown program"),
        }
    }

    fn link_program(&mut self, program: ProgramId) -> Result<(), String> {
        let attached = self
            .programs
            .get(&program)
            .map(|p| p.attached.clone())
            .ok_or_else(|| format!("program {program:?} does not exist"))?;

        let mut vertex = None;
        let mut fragment_src = String::new();
        for id in &attached {
            let obj = self
                .shaders
                .get(id)
                .ok_or_else(|| format!("attached shader {id:?} was deleted"))?;
            if obj.module.is_none() {
                return Err(format!("attached shader {id:?} is not compiled"));
            }
            match obj.stage {
                ShaderStage::Vertex if vertex.is_none() => vertex = Some(*id),
                ShaderStage::Vertex => return Err("more than one vertex shader attached".into()),
                ShaderStage::Fragment => {
                    fragment_src.push_str(&obj.source);
                    fragment_src.push('\n');
                }
            }
        }
        let vertex = vertex.ok_or("no vertex shader attached")?;
        if fragment_src.is_empty() {
            return Err("no fragment shader attached".into());
        }

        // Fragment units link as one module, in attachment order.
        let fragment = reflect::compile(&fragment_src)?;
        let (vertex_module, vertex_src) = match self.shaders.get(&vertex) {
            Some(ShaderObject {
                module: Some(m),
                source,
                ..
            }) => (m, source.as_str()),
            _ => return Err("vertex shader is not compiled".into()),
        };

        let pipeline = self.build_pipeline(vertex_module, vertex_src, &fragment, &fragment_src)?;

        let mut block = reflect::uniform_block(&fragment);
        if block.fields.is_empty() {
            block = reflect::uniform_block(vertex_module);
        }
        let ubo = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nabu program ubo"),
            size: u64::from(block.size),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = vec![0u8; block.size as usize];

        if let Some(p) = self.programs.get_mut(&program) {
            p.linked = Some(LinkedProgram {
                pipeline,
                block,
                ubo,
                staging,
                dirty: true,
            });
        }
        Ok(())
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        if let Some(id) = program {
            if !self.programs.get(&id).is_some_and(|p| p.linked.is_some()) {
                self.latch(error_code::INVALID_OPERATION, "use of unlinked program");
                return;
            }
        }
        self.current_program = program;
    }

    fn setup_quad(&mut self, program: ProgramId) {
        // The quad buffers are shared by every pipeline; only validate the handle.
        if !self.programs.contains_key(&program) {
            self.latch(error_code::INVALID_VALUE, "quad setup for unknown program");
        }
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformSlot> {
        let linked = self.programs.get(&program)?.linked.as_ref()?;
        linked.block.fields.get(name).map(|field| UniformSlot {
            program,
            field: *field,
        })
    }

    fn uniform_1f(&mut self, location: &UniformSlot, x: f32) {
        self.write_uniform(location, &[x]);
    }

    fn uniform_2f(&mut self, location: &UniformSlot, x: f32, y: f32) {
        self.write_uniform(location, &[x, y]);
    }

    fn uniform_3f(&mut self, location: &UniformSlot, x: f32, y: f32, z: f32) {
        self.write_uniform(location, &[x, y, z]);
    }

    fn uniform_4f(&mut self, location: &UniformSlot, x: f32, y: f32, z: f32, w: f32) {
        self.write_uniform(location, &[x, y, z, w]);
    }

    fn create_target(&mut self, width: u32, height: u32) -> Option<TargetId> {
        if width == 0 || height == 0 {
            return None;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("nabu ping-pong target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.config.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TargetId(self.alloc_id());
        self.targets.insert(
            id,
            OffscreenTarget {
                _texture: texture,
                view,
                size: (width, height),
            },
        );
        Some(id)
    }

    fn delete_target(&mut self, target: TargetId) {
        // Recorded passes may still reference the texture.
        self.submit_pending();
        if self.targets.remove(&target).is_none() {
            self.latch(error_code::INVALID_VALUE, "delete of unknown target");
        }
        if self.bound_target == Some(target) {
            self.bound_target = None;
        }
        if self.bound_texture == Some(target) {
            self.bound_texture = None;
        }
    }

    fn bind_target(&mut self, target: Option<TargetId>) {
        self.bound_target = target;
    }

    fn bind_texture(&mut self, target: Option<TargetId>) {
        self.bound_texture = target;
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn clear(&mut self) {
        self.pending_clear = true;
    }

    fn draw_quad(&mut self) {
        let Some(program) = self.current_program else {
            self.latch(error_code::INVALID_OPERATION, "draw without program");
            return;
        };
        if self.bound_target.is_some() && self.bound_target == self.bound_texture {
            self.latch(error_code::INVALID_OPERATION, "target sampled while bound for drawing");
            return;
        }

        // queue.write_buffer lands before the next submission, so work already
        // recorded against the old values is submitted first.
        let dirty = self
            .programs
            .get(&program)
            .and_then(|p| p.linked.as_ref())
            .is_some_and(|l| l.dirty);
        if dirty {
            self.submit_pending();
            if let Some(linked) = self.programs.get_mut(&program).and_then(|p| p.linked.as_mut()) {
                self.queue.write_buffer(&linked.ubo, 0, &linked.staging);
                linked.dirty = false;
            }
        }

        if self.bound_target.is_none() && !self.acquire_frame() {
            return;
        }

        let Some(linked) = self.programs.get(&program).and_then(|p| p.linked.as_ref()) else {
            return;
        };
        let (color_view, target_size) = match self.bound_target {
            Some(id) => match self.targets.get(&id) {
                Some(t) => (&t.view, t.size),
                None => {
                    self.latch(error_code::INVALID_OPERATION, "draw to deleted target");
                    return;
                }
            },
            None => match self.frame.as_ref() {
                Some((_, view)) => (view, (self.config.width, self.config.height)),
                None => return,
            },
        };
        let source_view = self
            .bound_texture
            .and_then(|id| self.targets.get(&id))
            .map_or(&self.blank_view, |t| &t.view);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nabu pass bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: linked.ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let load = if self.pending_clear {
            wgpu::LoadOp::Clear(self.clear_color)
        } else {
            wgpu::LoadOp::Load
        };
        let vw = self.viewport.0.min(target_size.0).max(1);
        let vh = self.viewport.1.min(target_size.1).max(1);

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("nabu frame encoder"),
                })
        });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("nabu pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_viewport(0.0, 0.0, vw as f32, vh as f32, 0.0, 1.0);
            rpass.set_pipeline(&linked.pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.set_vertex_buffer(0, self.quad_vbo.slice(..));
            rpass.set_index_buffer(self.quad_ibo.slice(..), wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }

        self.pending_clear = false;
    }

    fn present(&mut self) {
        self.submit_pending();
        if let Some((texture, _)) = self.frame.take() {
            texture.present();
        }
    }

    fn get_error(&mut self) -> Option<u32> {
        self.take_latched().map(|e| {
            log::debug!("error flag read: {:#06x} ({})", e.code, e.message);
            e.code
        })
    }
}
