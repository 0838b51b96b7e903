use anyhow::{Context, Result};

use super::surface::{
    apply_resize, choose_alpha_mode, choose_surface_format, map_surface_error, present_mode_for,
};
use super::{GpuInit, SurfaceErrorAction, SurfaceSize};

/// Owns wgpu core objects and the surface configuration.
///
/// Created on the render thread from an instance and surface handed over by
/// the platform layer. The surface is `'static` because the platform layer
/// creates it from a shared window handle.
pub struct Gpu {
    /// Kept alive for the surface.
    _instance: wgpu::Instance,

    surface: wgpu::Surface<'static>,

    _adapter: wgpu::Adapter,

    device: wgpu::Device,

    queue: wgpu::Queue,

    /// Active surface configuration.
    config: wgpu::SurfaceConfiguration,

    /// Current drawable size in physical pixels.
    size: SurfaceSize,

    present_modes: Vec<wgpu::PresentMode>,
}

/// Outcome of acquiring the next surface image.
pub enum Acquired {
    Frame(wgpu::SurfaceTexture),
    /// No image this frame; try again at the next swap.
    Skip,
    Fatal,
}

impl Gpu {
    /// Requests an adapter and device able to present to `surface`.
    pub async fn new(
        instance: wgpu::Instance,
        surface: wgpu::Surface<'static>,
        size: SurfaceSize,
        vsync: bool,
        init: &GpuInit,
    ) -> Result<Self> {
        anyhow::ensure!(!size.is_empty(), "surface has zero size");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("kiln device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps, init.prefer_srgb)
            .context("no supported surface formats")?;
        let alpha_mode = choose_alpha_mode(&caps, init.alpha_mode);

        // Screenshots copy straight out of the surface texture.
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if caps.usages.contains(wgpu::TextureUsages::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width: size.width,
            height: size.height,
            present_mode: present_mode_for(&caps.present_modes, vsync),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };

        surface.configure(&device, &config);

        log::info!(
            "wgpu: {} ({:?}), surface {:?} {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format,
            size.width,
            size.height,
            config.present_mode,
        );

        Ok(Gpu {
            _instance: instance,
            surface,
            _adapter: adapter,
            device,
            queue,
            config,
            size,
            present_modes: caps.present_modes,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Whether the surface texture can be used as a copy source.
    pub fn can_read_back(&self) -> bool {
        self.config.usage.contains(wgpu::TextureUsages::COPY_SRC)
    }

    /// Reconfigures the surface after a resize. Zero sizes are recorded but
    /// not applied.
    pub fn resize(&mut self, new_size: SurfaceSize) {
        apply_resize(
            &self.surface,
            &self.device,
            &mut self.config,
            &mut self.size,
            new_size,
        );
    }

    /// Reconfigures the surface with the present mode for `vsync`.
    pub fn set_vsync(&mut self, vsync: bool) {
        let mode = present_mode_for(&self.present_modes, vsync);
        if mode == self.config.present_mode {
            return;
        }
        log::debug!("surface present mode {:?} -> {mode:?}", self.config.present_mode);
        self.config.present_mode = mode;
        if !self.size.is_empty() {
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Acquires the next surface image, reconfiguring and retrying once on a
    /// lost or outdated surface.
    pub fn acquire(&mut self) -> Acquired {
        if self.size.is_empty() {
            return Acquired::Skip;
        }
        for attempt in 0..2 {
            let err = match self.surface.get_current_texture() {
                Ok(frame) => return Acquired::Frame(frame),
                Err(err) => err,
            };
            let action =
                map_surface_error(&self.surface, &self.device, &self.config, self.size, err);
            log::debug!("surface acquire failed ({action:?})");
            match action {
                SurfaceErrorAction::Reconfigured if attempt == 0 => continue,
                SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => {
                    return Acquired::Skip;
                }
                SurfaceErrorAction::Fatal => return Acquired::Fatal,
            }
        }
        Acquired::Skip
    }
}
