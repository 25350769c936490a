use anyhow::{Context, Result};

use super::GpuInit;

/// Surface handed to the worker that owns the context.
///
/// Moving this value is the ownership transfer: once a proxy consumes it the
/// caller has no way to draw to the underlying window again.
pub struct WgpuSurface {
    pub(super) instance: wgpu::Instance,
    pub(super) surface: wgpu::Surface<'static>,
    pub(super) width: u32,
    pub(super) height: u32,
    pub(super) init: GpuInit,
}

impl WgpuSurface {
    /// Creates a surface for `target` (typically an `Arc<Window>`).
    ///
    /// `width`/`height` are the initial drawable size in physical pixels.
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        init: GpuInit,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(target)
            .context("failed to create wgpu surface")?;

        Ok(Self {
            instance,
            surface,
            width,
            height,
            init,
        })
    }
}

impl std::fmt::Debug for WgpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

pub(super) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    let preferred: &[wgpu::TextureFormat] = if prefer_srgb {
        &[
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ]
    } else {
        &[wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8Unorm]
    };

    preferred
        .iter()
        .copied()
        .find(|f| caps.formats.contains(f))
        .or_else(|| caps.formats.first().copied())
}

pub(super) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Reconfigures the surface for `width`x`height`.
///
/// wgpu does not support configuring a surface with a 0x0 size; in that case
/// only the stored configuration is updated and configuration is deferred.
pub(super) fn apply_resize(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &mut wgpu::SurfaceConfiguration,
    width: u32,
    height: u32,
) {
    config.width = width;
    config.height = height;

    if width == 0 || height == 0 {
        return;
    }

    surface.configure(device, config);
}

/// Reacts to a failed frame acquisition. Returns `true` when the surface was
/// reconfigured and the frame may be retried.
pub(super) fn recover_surface(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    err: &wgpu::SurfaceError,
) -> bool {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
            if config.width > 0 && config.height > 0 {
                surface.configure(device, config);
            }
            true
        }
        wgpu::SurfaceError::OutOfMemory
        | wgpu::SurfaceError::Timeout
        | wgpu::SurfaceError::Other => false,
    }
}
