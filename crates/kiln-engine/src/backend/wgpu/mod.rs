//! Explicit-descriptor backend on wgpu.
//!
//! One command encoder and one render pass are kept open while commands
//! arrive. The pass is begun lazily with `LoadOp::Load`; a clear restarts it.
//! Work is submitted at the end of every buffer so the vertex stream can be
//! rewritten for the next one.

mod mipmap;
mod pipelines;
mod readback;
mod stream;
mod textures;

use anyhow::{Context, Result};

use crate::backend::{GpuBackend, capture_region};
use crate::backend::pipeline::{self, BoundTexture, Sampling};
use crate::command::{
    BackendInit, Image, MAX_TEXTURES, PrimType, RenderCommand, TextureCreateCommand,
    TextureDestroyCommand, TextureFlags, TextureUpdateCommand, Vertex, codes,
};
use crate::coords::{ClipRect, ColorRgba};
use crate::device::{Acquired, Gpu, GpuInit, SurfaceSize};
use crate::screen::Mat4;
use crate::texture::{
    MemoryCounter, SlotEntry, TextureInfo, TextureLimits, TextureSlots, prepare_create,
    prepare_update,
};

use mipmap::MipBlitter;
use pipelines::Pipelines;
use stream::{MAX_QUADS_PER_DRAW, StreamBuffers};
use textures::{Samplers, WgpuTexture};

/// Everything the render thread needs to bring up wgpu.
///
/// The instance and surface are created by the platform layer; the surface
/// must not borrow the window.
pub struct WgpuInitCommand {
    pub instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub size: SurfaceSize,
    pub vsync: bool,
    pub gpu: GpuInit,
}

struct FrameTarget {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Device state that exists once init has succeeded.
struct Renderer {
    gpu: Gpu,
    pipelines: Pipelines,
    samplers: Samplers,
    blitter: MipBlitter,
    stream: StreamBuffers,
    textures: TextureSlots<WgpuTexture>,
    limits: TextureLimits,

    frame: Option<FrameTarget>,
    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<wgpu::RenderPass<'static>>,
}

pub struct WgpuBackend {
    memory: MemoryCounter,
    renderer: Option<Renderer>,
    ready: bool,
}

impl WgpuBackend {
    pub fn new(memory: MemoryCounter) -> Self {
        Self {
            memory,
            renderer: None,
            ready: false,
        }
    }
}

impl Renderer {
    fn new(init: WgpuInitCommand, memory: MemoryCounter) -> Result<Self> {
        let gpu = pollster::block_on(Gpu::new(
            init.instance,
            init.surface,
            init.size,
            init.vsync,
            &init.gpu,
        ))
        .context("failed to initialize wgpu")?;

        let device = gpu.device();
        let format = gpu.surface_format();
        let pipelines = Pipelines::new(device, format).context("failed to build pipelines")?;
        let samplers = Samplers::new(device);
        let blitter = MipBlitter::new(device, wgpu::TextureFormat::Rgba8Unorm);
        let stream = StreamBuffers::new(device, &pipelines.transform_layout);

        let device_limits = device.limits();
        let limits = TextureLimits {
            max_2d: device_limits.max_texture_dimension_2d,
            max_layer: device_limits.max_texture_dimension_2d,
        };

        Ok(Self {
            gpu,
            pipelines,
            samplers,
            blitter,
            stream,
            textures: TextureSlots::new(MAX_TEXTURES, memory),
            limits,
            frame: None,
            encoder: None,
            pass: None,
        })
    }

    // ── recording ─────────────────────────────────────────────────────────

    fn ensure_encoder(&mut self) {
        if self.encoder.is_none() {
            self.encoder = Some(self.gpu.device().create_command_encoder(
                &wgpu::CommandEncoderDescriptor {
                    label: Some("kiln frame encoder"),
                },
            ));
        }
    }

    /// Opens the frame pass if needed. Returns false when there is no
    /// surface image to draw into.
    fn ensure_pass(&mut self, load: wgpu::LoadOp<wgpu::Color>) -> bool {
        if self.pass.is_some() {
            return true;
        }
        if self.frame.is_none() {
            return false;
        }
        self.ensure_encoder();
        let (Some(frame), Some(encoder)) = (self.frame.as_ref(), self.encoder.as_mut()) else {
            return false;
        };

        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
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
            })
            .forget_lifetime();
        self.pass = Some(pass);
        true
    }

    fn end_pass(&mut self) {
        self.pass = None;
    }

    /// Ends the pass and submits everything recorded so far.
    fn flush(&mut self) {
        self.end_pass();
        if let Some(encoder) = self.encoder.take() {
            self.gpu.queue().submit(std::iter::once(encoder.finish()));
        }
    }

    // ── frame ─────────────────────────────────────────────────────────────

    /// Returns false when the surface is unusable.
    fn acquire(&mut self) -> bool {
        if self.frame.is_some() {
            return true;
        }
        match self.gpu.acquire() {
            Acquired::Frame(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some(FrameTarget { texture, view });
                true
            }
            Acquired::Skip => true,
            Acquired::Fatal => false,
        }
    }

    fn present(&mut self, finish: bool) {
        self.flush();
        if let Some(frame) = self.frame.take() {
            drop(frame.view);
            frame.texture.present();
        }
        if finish
            && let Err(err) = self.gpu.device().poll(wgpu::PollType::wait_indefinitely())
        {
            log::warn!("device poll failed: {err}");
        }
    }

    // ── draws ─────────────────────────────────────────────────────────────

    fn clear(&mut self, color: ColorRgba) {
        self.end_pass();
        let [r, g, b, a] = color.to_array();
        let clear = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        };
        self.ensure_pass(wgpu::LoadOp::Clear(clear));
    }

    fn render(&mut self, cmd: &RenderCommand, transform: u32) {
        let state = &cmd.state;
        let first = cmd.vertex_offset / Vertex::STRIDE;
        let count = cmd.vertex_count() as usize;
        if count == 0 {
            return;
        }
        if cmd.vertex_offset % Vertex::STRIDE != 0 || first + count > self.stream.vertex_count() {
            log::warn!(
                "render references vertices {first}..{} of {}; skipped",
                first + count,
                self.stream.vertex_count()
            );
            return;
        }

        let size = self.gpu.size();
        let scissor = match state.clip {
            None => Some((0, 0, size.width, size.height)),
            Some(clip) => {
                let c = clip.clamp_to(size.width, size.height);
                (!c.is_empty()).then_some((c.x, c.y, c.w, c.h))
            }
        };
        let Some((sx, sy, sw, sh)) = scissor else {
            return;
        };

        let bound = state.texture.map(|id| match self.textures.get(id) {
            Some(entry) => BoundTexture {
                has_variant: entry.variant(state.dimension).is_some(),
                premultiplied: entry.info.premultiplied,
            },
            None => BoundTexture {
                has_variant: false,
                premultiplied: false,
            },
        });
        let key = pipeline::select(cmd.prim_type, state, bound);

        if !self.ensure_pass(wgpu::LoadOp::Load) {
            return;
        }

        let Renderer {
            gpu,
            pipelines,
            samplers,
            stream,
            textures,
            pass,
            ..
        } = self;
        let Some(pass) = pass.as_mut() else {
            return;
        };

        pass.set_pipeline(pipelines.get(key));
        pass.set_bind_group(
            0,
            stream.transform_bind_group(),
            &[stream.transform_offset(transform)],
        );

        if key.sampling != Sampling::None {
            let (Some(id), Some(layout)) = (state.texture, pipelines.texture_layout(key.sampling))
            else {
                return;
            };
            let Some(entry) = textures.get_mut(id) else {
                return;
            };
            let linear = entry.info.linear_mipmaps;
            let Some(tex) = entry.variant_mut(state.dimension) else {
                return;
            };
            let sampler = samplers.get(linear, state.wrap_u, state.wrap_v);
            let bind_group = tex.bind_group(gpu.device(), layout, sampler, state.wrap_u, state.wrap_v);
            pass.set_bind_group(1, bind_group, &[]);
        }

        pass.set_scissor_rect(sx, sy, sw, sh);
        pass.set_vertex_buffer(0, stream.vertices().slice(..));

        match cmd.prim_type {
            PrimType::Quads => {
                pass.set_index_buffer(stream.quad_indices().slice(..), wgpu::IndexFormat::Uint32);
                let mut quad = 0;
                while quad < cmd.prim_count {
                    let n = (cmd.prim_count - quad).min(MAX_QUADS_PER_DRAW);
                    let base = (first + quad as usize * 4) as i32;
                    pass.draw_indexed(0..n * 6, base, 0..1);
                    quad += n;
                }
            }
            PrimType::Lines => {
                let start = first as u32;
                pass.draw(start..start + count as u32, 0..1);
            }
        }
    }

    // ── textures ──────────────────────────────────────────────────────────

    fn texture_create(&mut self, cmd: &TextureCreateCommand) {
        let Some(prepared) = prepare_create(cmd, self.limits) else {
            return;
        };
        let device = self.gpu.device();
        let queue = self.gpu.queue();

        let tex2d = prepared
            .base
            .as_deref()
            .map(|base| textures::create_2d(device, queue, &self.blitter, &prepared, base));
        let array = prepared
            .array
            .as_ref()
            .map(|array| textures::create_array(device, queue, array));

        let entry = SlotEntry {
            info: TextureInfo {
                width: prepared.width,
                height: prepared.height,
                mip_levels: prepared.mip_levels,
                premultiplied: prepared.premultiplied,
                linear_mipmaps: cmd.flags.contains(TextureFlags::LINEAR_MIPMAPS),
                rescale_shift: prepared.rescale_shift,
                footprint: prepared.footprint(),
            },
            tex2d,
            array,
        };
        log::debug!(
            "texture {} created: {}x{} {:?}, {} bytes",
            cmd.slot.0,
            prepared.width,
            prepared.height,
            entry.state(),
            entry.info.footprint
        );
        let _ = self.textures.insert(cmd.slot, entry);
    }

    fn texture_update(&mut self, cmd: &TextureUpdateCommand) {
        let Some(entry) = self.textures.get(cmd.slot) else {
            return;
        };
        if entry.tex2d.is_none() {
            return;
        }
        let info = entry.info;
        let Some(update) = prepare_update(cmd, &info) else {
            return;
        };
        if update.x + update.width > info.width || update.y + update.height > info.height {
            log::warn!(
                "texture {} update {}x{}+{}+{} exceeds {}x{}",
                cmd.slot.0,
                update.width,
                update.height,
                update.x,
                update.y,
                info.width,
                info.height
            );
            return;
        }
        // Queue writes land before the next submit; draws already recorded
        // must see the old contents.
        self.flush();
        let Some(tex) = self.textures.get(cmd.slot).and_then(|e| e.tex2d.as_ref()) else {
            return;
        };
        textures::update_2d(
            self.gpu.device(),
            self.gpu.queue(),
            &self.blitter,
            tex,
            &update,
            info.mip_levels,
        );
    }

    fn texture_destroy(&mut self, cmd: &TextureDestroyCommand) {
        if self.textures.remove(cmd.slot).is_some() {
            log::debug!("texture {} destroyed", cmd.slot.0);
        }
    }

    fn screenshot(&mut self, region: Option<ClipRect>) -> Option<Image> {
        if !self.gpu.can_read_back() {
            log::warn!("surface does not support read-back; screenshot skipped");
            return None;
        }
        self.flush();
        let frame = self.frame.as_ref()?;
        let texture = &frame.texture.texture;
        let region = capture_region(region, texture.width(), texture.height())?;
        match readback::read_texture(
            self.gpu.device(),
            self.gpu.queue(),
            texture,
            self.gpu.surface_format(),
            region,
        ) {
            Ok(image) => Some(image),
            Err(err) => {
                log::error!("screenshot failed: {err:#}");
                None
            }
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        // The acquired image belongs to the old configuration.
        self.flush();
        self.frame = None;
        self.gpu.resize(SurfaceSize::new(width, height));
    }
}

impl GpuBackend for WgpuBackend {
    type Init = WgpuInitCommand;

    const INIT_CODE: u32 = codes::WGPU_INIT;

    #[allow(unreachable_patterns)]
    fn unpack_init(init: BackendInit) -> Option<WgpuInitCommand> {
        match init {
            BackendInit::Wgpu(init) => Some(init),
            _ => None,
        }
    }

    fn init(&mut self, init: WgpuInitCommand) {
        if self.renderer.is_some() {
            log::warn!("wgpu backend initialized twice; ignoring");
            return;
        }
        match Renderer::new(init, self.memory.clone()) {
            Ok(mut renderer) => {
                self.ready = renderer.acquire();
                self.renderer = Some(renderer);
            }
            Err(err) => {
                log::error!("wgpu backend init failed: {err:#}");
                self.ready = false;
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready && self.renderer.is_some()
    }

    fn begin_buffer(&mut self, vertices: &[Vertex], transforms: &[Mat4]) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.stream.upload(r.gpu.device(), r.gpu.queue(), vertices, transforms);
    }

    fn end_buffer(&mut self) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.flush();
    }

    fn texture_create(&mut self, cmd: &TextureCreateCommand) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.texture_create(cmd);
    }

    fn texture_update(&mut self, cmd: &TextureUpdateCommand) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.texture_update(cmd);
    }

    fn texture_destroy(&mut self, cmd: &TextureDestroyCommand) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.texture_destroy(cmd);
    }

    fn clear(&mut self, color: ColorRgba) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.clear(color);
    }

    fn render(&mut self, cmd: &RenderCommand, transform: u32) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.render(cmd, transform);
    }

    fn present(&mut self, finish: bool) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.present(finish);
    }

    fn set_vsync(&mut self, vsync: bool) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.flush();
        r.frame = None;
        r.gpu.set_vsync(vsync);
    }

    fn begin_frame(&mut self) {
        let Some(r) = self.renderer.as_mut() else { return };
        if !r.acquire() {
            log::error!("surface lost beyond recovery; rendering stops");
            self.ready = false;
        }
    }

    fn screenshot(&mut self, region: Option<ClipRect>) -> Option<Image> {
        self.renderer.as_mut()?.screenshot(region)
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.resize(width, height);
        if !r.acquire() {
            self.ready = false;
        }
    }

    fn shutdown(&mut self) {
        self.ready = false;
        let Some(mut r) = self.renderer.take() else { return };
        r.pass = None;
        r.encoder = None;
        r.frame = None;
        let released = r.textures.drain().len();
        log::debug!("wgpu backend released {released} textures");
    }
}
