use std::sync::Arc;

use anyhow::{Context, Result};
use nabu_engine::gfx::{GpuInit, WgpuGraphics, WgpuSurface};
use nabu_engine::UniformValue;
use nabu_remote::{FrameHook, Proxy, Worker, WorkerConfig};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

const VERTEX: &str = include_str!("../shaders/quad.vert.wgsl");
const PLASMA: &str = include_str!("../shaders/plasma.frag.wgsl");
const VIGNETTE: &str = include_str!("../shaders/vignette.frag.wgsl");

/// Window and scene settings.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub fps: f64,
    pub single: bool,
    pub remote_fragments: Vec<String>,
    pub gpu: GpuInit,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            title: "nabu studio".to_string(),
            initial_size: LogicalSize::new(960.0, 540.0),
            fps: nabu_engine::DEFAULT_FRAME_RATE,
            single: false,
            remote_fragments: Vec::new(),
            gpu: GpuInit::default(),
        }
    }
}

struct Scene {
    proxy: Proxy<WgpuGraphics>,
    window: Arc<Window>,
}

/// Window host. The engine lives on the worker; this side only forwards
/// setup, resizes and health checks.
pub struct Studio {
    config: StudioConfig,
    worker: Worker<WgpuGraphics>,
    scene: Option<Scene>,
    failure: Option<anyhow::Error>,
}

impl Studio {
    pub fn new(config: StudioConfig) -> Result<Self> {
        let worker = Worker::spawn(WorkerConfig {
            name: "nabu-studio-worker".to_string(),
            ..WorkerConfig::default()
        })
        .context("failed to spawn render worker")?;

        Ok(Self {
            config,
            worker,
            scene: None,
            failure: None,
        })
    }

    /// Error that stopped the event loop, if any.
    pub fn finish(self) -> Result<()> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure = Some(err);
        self.scene = None;
        event_loop.exit();
    }

    fn open(&self, event_loop: &ActiveEventLoop) -> Result<Scene> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = Arc::new(event_loop.create_window(attrs).context("failed to create window")?);

        let size = window.inner_size();
        let surface = WgpuSurface::new(
            Arc::clone(&window),
            size.width,
            size.height,
            self.config.gpu.clone(),
        )?;
        let proxy = self.worker.proxy(surface)?;
        pollster::block_on(proxy.ready()).context("engine initialization failed")?;

        self.load_shaders(&proxy)?;

        let post = proxy.post();
        post.update_uniform("u_resolution".into(), resolution(size.width, size.height))?;
        proxy.run_arbitrary("animate", FrameHook::animate("u_time"), true)?;
        post.set_frame_rate(self.config.fps)?;

        log::info!("scene running at {} fps", self.config.fps);
        Ok(Scene { proxy, window })
    }

    fn load_shaders(&self, proxy: &Proxy<WgpuGraphics>) -> Result<()> {
        let ops = proxy.awaited();

        if !self.config.remote_fragments.is_empty() {
            pollster::block_on(ops.set_vertex_shader(VERTEX.into()))?;
            let groups = self.config.remote_fragments.iter().map(|url| vec![url.clone()]).collect();
            pollster::block_on(ops.set_remote_fragment_shader_groups(groups))?;
            return Ok(());
        }

        if self.config.single {
            pollster::block_on(ops.compile_program(VERTEX.into(), vec![PLASMA.into()]))?;
            pollster::block_on(ops.use_program())?;
            pollster::block_on(ops.setup_whole_screen_quad())?;
            return Ok(());
        }

        pollster::block_on(ops.set_vertex_shader(VERTEX.into()))?;
        let groups = vec![vec![PLASMA.into()], vec![VIGNETTE.into()]];
        pollster::block_on(ops.set_fragment_shader_groups(groups))?;
        Ok(())
    }

    fn resized(scene: &Scene, width: u32, height: u32) -> Result<()> {
        let post = scene.proxy.post();
        post.update_uniform("u_resolution".into(), resolution(width, height))?;
        post.resize(width, height)?;
        Ok(())
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(scene) = self.scene.take() {
            match pollster::block_on(scene.proxy.awaited().check_vitals()) {
                Ok(()) => log::info!("engine healthy at shutdown"),
                Err(err) => log::warn!("engine reported {err} at shutdown"),
            }
        }
        event_loop.exit();
    }
}

fn resolution(width: u32, height: u32) -> UniformValue {
    UniformValue::from([width as f32, height as f32])
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.scene.is_some() {
            return;
        }
        match self.open(event_loop) {
            Ok(scene) => self.scene = Some(scene),
            Err(err) => self.fail(event_loop, err.context("failed to start scene")),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(scene) = self.scene.as_ref() else {
            return;
        };
        if scene.window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => self.close(event_loop),
            WindowEvent::Resized(size) => {
                if let Err(err) = Self::resized(scene, size.width, size.height) {
                    self.fail(event_loop, err.context("worker stopped accepting resizes"));
                }
            }
            _ => {}
        }
    }
}
