//! OpenGL 3.3 core backend on glow.
//!
//! The platform layer owns the context and hands it over through
//! [`GlSurface`]; everything after init runs on the render thread with the
//! context current. Vertex data and the buffer's screen transforms are
//! uploaded once per buffer; each draw binds its transform as a range of the
//! uniform buffer.

mod program;
mod textures;

use anyhow::{Context, Result};
use glow::HasContext;

use crate::backend::{GpuBackend, capture_region};
use crate::backend::pipeline::{self, Blend, BoundTexture, Sampling};
use crate::command::{
    BackendInit, Image, MAX_SCREENS, MAX_TEXTURES, PrimType, RenderCommand, TextureCreateCommand,
    TextureDestroyCommand, TextureFlags, TextureUpdateCommand, Vertex, codes,
};
use crate::coords::{ClipRect, ColorRgba};
use crate::device::SurfaceSize;
use crate::screen::Mat4;
use crate::texture::{
    MemoryCounter, SlotEntry, TextureInfo, TextureLimits, TextureSlots, flip_rows,
    prepare_create, prepare_update,
};

use program::{Programs, TRANSFORM_BINDING};
use textures::{GlTexture, Samplers};

const MAX_QUADS_PER_DRAW: u32 = 16384;

const MAT4_BYTES: usize = std::mem::size_of::<Mat4>();

/// Platform side of a GL context.
///
/// Moved to the render thread with the init command; all calls happen there.
pub trait GlSurface: Send {
    /// Makes the context current on the calling thread.
    fn make_current(&mut self) -> Result<()>;

    fn get_proc_address(&self, symbol: &str) -> *const std::ffi::c_void;

    fn swap_buffers(&mut self) -> Result<()>;

    fn set_swap_interval(&mut self, vsync: bool) -> Result<()>;

    /// Drawable size in physical pixels.
    fn size(&self) -> SurfaceSize;
}

pub struct GlInitCommand {
    pub surface: Box<dyn GlSurface>,
    pub vsync: bool,
}

struct GlRenderer {
    surface: Box<dyn GlSurface>,
    gl: glow::Context,
    programs: Programs,
    samplers: Samplers,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    ebo: glow::Buffer,
    ubo: glow::Buffer,
    transform_stride: usize,
    vertex_count: usize,
    transform_count: usize,
    textures: TextureSlots<GlTexture>,
    limits: TextureLimits,
    size: SurfaceSize,
}

pub struct GlBackend {
    memory: MemoryCounter,
    renderer: Option<GlRenderer>,
    ready: bool,
}

impl GlBackend {
    pub fn new(memory: MemoryCounter) -> Self {
        Self {
            memory,
            renderer: None,
            ready: false,
        }
    }
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align.max(1)) * align.max(1)
}

/// Lays the matrices out at `stride` bytes so each can be bound as a range.
fn pack_transforms(transforms: &[Mat4], stride: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; stride * transforms.len()];
    for (i, m) in transforms.iter().enumerate() {
        let raw: &[u8] = bytemuck::cast_slice(m.as_slice());
        bytes[i * stride..i * stride + raw.len()].copy_from_slice(raw);
    }
    bytes
}

fn quad_indices() -> Vec<u32> {
    (0..MAX_QUADS_PER_DRAW)
        .flat_map(|q| {
            let b = q * 4;
            [b, b + 1, b + 2, b, b + 2, b + 3]
        })
        .collect()
}

impl GlRenderer {
    fn new(init: GlInitCommand, memory: MemoryCounter) -> Result<Self> {
        let GlInitCommand { mut surface, vsync } = init;
        surface.make_current().context("failed to make GL context current")?;
        let gl = unsafe { glow::Context::from_loader_function(|s| surface.get_proc_address(s)) };
        if let Err(err) = surface.set_swap_interval(vsync) {
            log::warn!("failed to set swap interval: {err:#}");
        }

        let version = gl.version();
        log::info!(
            "GL {}.{} {}",
            version.major,
            version.minor,
            version.vendor_info
        );
        anyhow::ensure!(
            version.is_embedded || (version.major, version.minor) >= (3, 3),
            "OpenGL 3.3 required, got {}.{}",
            version.major,
            version.minor
        );

        let programs = Programs::new(&gl).context("failed to build GL programs")?;
        let samplers = Samplers::new(&gl).context("failed to create samplers")?;

        let ubo_align = unsafe { gl.get_parameter_i32(glow::UNIFORM_BUFFER_OFFSET_ALIGNMENT) };
        let transform_stride = align_up(MAT4_BYTES, ubo_align.max(1) as usize);

        let (vao, vbo, ebo, ubo) = unsafe {
            let vao = gl.create_vertex_array().map_err(anyhow::Error::msg)?;
            let vbo = gl.create_buffer().map_err(anyhow::Error::msg)?;
            let ebo = gl.create_buffer().map_err(anyhow::Error::msg)?;
            let ubo = gl.create_buffer().map_err(anyhow::Error::msg)?;
            gl.bind_buffer(glow::UNIFORM_BUFFER, Some(ubo));
            gl.buffer_data_size(
                glow::UNIFORM_BUFFER,
                (transform_stride * MAX_SCREENS) as i32,
                glow::STREAM_DRAW,
            );
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            let stride = Vertex::STRIDE as i32;
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, stride, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 3, glow::FLOAT, false, stride, 8);
            gl.enable_vertex_attrib_array(2);
            gl.vertex_attrib_pointer_f32(2, 4, glow::FLOAT, false, stride, 20);

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(&quad_indices()),
                glow::STATIC_DRAW,
            );
            (vao, vbo, ebo, ubo)
        };

        let max_2d = unsafe { gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) }.max(1) as u32;
        let max_layers = unsafe { gl.get_parameter_i32(glow::MAX_ARRAY_TEXTURE_LAYERS) };
        if max_layers < crate::command::NUM_TILES as i32 {
            log::warn!("GL supports only {max_layers} array layers");
        }
        let size = surface.size();
        unsafe { gl.viewport(0, 0, size.width as i32, size.height as i32) };

        Ok(Self {
            surface,
            gl,
            programs,
            samplers,
            vao,
            vbo,
            ebo,
            ubo,
            transform_stride,
            vertex_count: 0,
            transform_count: 0,
            textures: TextureSlots::new(MAX_TEXTURES, memory),
            limits: TextureLimits {
                max_2d,
                max_layer: max_2d,
            },
            size,
        })
    }

    fn begin_buffer(&mut self, vertices: &[Vertex], transforms: &[Mat4]) {
        self.vertex_count = vertices.len();
        self.transform_count = transforms.len().min(MAX_SCREENS);
        let packed = pack_transforms(&transforms[..self.transform_count], self.transform_stride);
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STREAM_DRAW,
            );
            if !packed.is_empty() {
                self.gl.bind_buffer(glow::UNIFORM_BUFFER, Some(self.ubo));
                self.gl.buffer_sub_data_u8_slice(glow::UNIFORM_BUFFER, 0, &packed);
            }
        }
    }

    fn clear(&mut self, color: ColorRgba) {
        let [r, g, b, a] = color.to_array();
        unsafe {
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn render(&mut self, cmd: &RenderCommand, transform: u32) {
        let state = &cmd.state;
        let first = cmd.vertex_offset / Vertex::STRIDE;
        let count = cmd.vertex_count() as usize;
        if count == 0 {
            return;
        }
        if cmd.vertex_offset % Vertex::STRIDE != 0 || first + count > self.vertex_count {
            log::warn!(
                "render references vertices {first}..{} of {}; skipped",
                first + count,
                self.vertex_count
            );
            return;
        }

        let (w, h) = (self.size.width, self.size.height);
        let scissor = state
            .clip
            .unwrap_or(ClipRect::new(0, 0, w, h))
            .clamp_to(w, h);
        if scissor.is_empty() {
            return;
        }
        // GL scissor origin is bottom-left.
        let scissor = scissor.flip_y(h);

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
        let pipeline = self.programs.get(key);
        let gl = &self.gl;

        unsafe {
            gl.use_program(Some(pipeline.program));
            if (transform as usize) < self.transform_count {
                gl.bind_buffer_range(
                    glow::UNIFORM_BUFFER,
                    TRANSFORM_BINDING,
                    Some(self.ubo),
                    (transform as usize * self.transform_stride) as i32,
                    MAT4_BYTES as i32,
                );
            }

            match pipeline.blend {
                Blend::None => gl.disable(glow::BLEND),
                Blend::Straight => {
                    gl.enable(glow::BLEND);
                    gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
                }
                Blend::Premultiplied => {
                    gl.enable(glow::BLEND);
                    gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
                }
            }

            if key.sampling != Sampling::None
                && let Some(id) = state.texture
                && let Some(entry) = self.textures.get(id)
                && let Some(tex) = entry.variant(state.dimension)
            {
                let sampler = self
                    .samplers
                    .get(entry.info.linear_mipmaps, state.wrap_u, state.wrap_v);
                gl.active_texture(glow::TEXTURE0);
                gl.bind_texture(tex.target, Some(tex.texture));
                gl.bind_sampler(0, Some(sampler));
            }

            gl.enable(glow::SCISSOR_TEST);
            gl.scissor(
                scissor.x as i32,
                scissor.y as i32,
                scissor.w as i32,
                scissor.h as i32,
            );
            gl.bind_vertex_array(Some(self.vao));

            match cmd.prim_type {
                PrimType::Quads => {
                    let mut quad = 0;
                    while quad < cmd.prim_count {
                        let n = (cmd.prim_count - quad).min(MAX_QUADS_PER_DRAW);
                        let base = (first + quad as usize * 4) as i32;
                        gl.draw_elements_base_vertex(
                            pipeline.mode,
                            (n * 6) as i32,
                            glow::UNSIGNED_INT,
                            0,
                            base,
                        );
                        quad += n;
                    }
                }
                PrimType::Lines => gl.draw_arrays(pipeline.mode, first as i32, count as i32),
            }
        }
    }

    fn texture_create(&mut self, cmd: &TextureCreateCommand) {
        let Some(prepared) = prepare_create(cmd, self.limits) else {
            return;
        };
        let tex2d = match prepared.base.as_deref() {
            Some(base) => match textures::create_2d(&self.gl, &prepared, base) {
                Ok(t) => Some(t),
                Err(err) => {
                    log::error!("texture {} create failed: {err:#}", cmd.slot.0);
                    return;
                }
            },
            None => None,
        };
        let array = match prepared.array.as_ref() {
            Some(array) => match textures::create_array(&self.gl, array) {
                Ok(t) => Some(t),
                Err(err) => {
                    log::error!("texture {} array create failed: {err:#}", cmd.slot.0);
                    if let Some(t) = tex2d {
                        t.destroy(&self.gl);
                    }
                    return;
                }
            },
            None => None,
        };

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
        match self.textures.insert(cmd.slot, entry) {
            Ok(Some(prev)) | Err(prev) => self.release(prev),
            Ok(None) => {}
        }
    }

    fn texture_update(&mut self, cmd: &TextureUpdateCommand) {
        let Some(entry) = self.textures.get(cmd.slot) else {
            return;
        };
        let Some(tex) = entry.tex2d.as_ref() else {
            return;
        };
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
        textures::update_2d(&self.gl, tex, &update, info.mip_levels);
    }

    fn release(&self, entry: SlotEntry<GlTexture>) {
        for tex in [entry.tex2d, entry.array].into_iter().flatten() {
            tex.destroy(&self.gl);
        }
    }

    fn screenshot(&mut self, region: Option<ClipRect>) -> Option<Image> {
        let region = capture_region(region, self.size.width, self.size.height)?;
        let (width, height) = (region.w, region.h);
        // Framebuffer rows are addressed from the bottom.
        let src = region.flip_y(self.size.height);
        let row = width as usize * 3;
        let mut data = vec![0u8; row * height as usize];
        unsafe {
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.gl.read_pixels(
                src.x as i32,
                src.y as i32,
                width as i32,
                height as i32,
                glow::RGB,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut data),
            );
        }
        // Rows come back bottom-up.
        flip_rows(&mut data, row);
        Some(Image {
            width,
            height,
            data,
        })
    }

    fn destroy(mut self) {
        for entry in self.textures.drain() {
            self.release(entry);
        }
        self.samplers.destroy(&self.gl);
        self.programs.destroy(&self.gl);
        unsafe {
            self.gl.delete_vertex_array(self.vao);
            self.gl.delete_buffer(self.vbo);
            self.gl.delete_buffer(self.ebo);
            self.gl.delete_buffer(self.ubo);
        }
    }
}

impl GpuBackend for GlBackend {
    type Init = GlInitCommand;

    const INIT_CODE: u32 = codes::GL_INIT;

    fn unpack_init(init: BackendInit) -> Option<GlInitCommand> {
        match init {
            BackendInit::Gl(init) => Some(init),
            _ => None,
        }
    }

    fn init(&mut self, init: GlInitCommand) {
        if self.renderer.is_some() {
            log::warn!("GL backend initialized twice; ignoring");
            return;
        }
        match GlRenderer::new(init, self.memory.clone()) {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.ready = true;
            }
            Err(err) => {
                log::error!("GL backend init failed: {err:#}");
                self.ready = false;
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready && self.renderer.is_some()
    }

    fn begin_buffer(&mut self, vertices: &[Vertex], transforms: &[Mat4]) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.begin_buffer(vertices, transforms);
    }

    fn end_buffer(&mut self) {
        let Some(r) = self.renderer.as_ref() else { return };
        unsafe { r.gl.flush() };
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
        if let Some(entry) = r.textures.remove(cmd.slot) {
            r.release(entry);
            log::debug!("texture {} destroyed", cmd.slot.0);
        }
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
        if let Err(err) = r.surface.swap_buffers() {
            log::error!("swap failed: {err:#}");
            self.ready = false;
            return;
        }
        if finish {
            unsafe { r.gl.finish() };
        }
    }

    fn set_vsync(&mut self, vsync: bool) {
        let Some(r) = self.renderer.as_mut() else { return };
        if let Err(err) = r.surface.set_swap_interval(vsync) {
            log::warn!("failed to set swap interval: {err:#}");
        }
    }

    fn begin_frame(&mut self) {}

    fn screenshot(&mut self, region: Option<ClipRect>) -> Option<Image> {
        self.renderer.as_mut()?.screenshot(region)
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(r) = self.renderer.as_mut() else { return };
        r.size = SurfaceSize::new(width, height);
        if !r.size.is_empty() {
            unsafe { r.gl.viewport(0, 0, width as i32, height as i32) };
        }
    }

    fn shutdown(&mut self) {
        self.ready = false;
        if let Some(r) = self.renderer.take() {
            r.destroy();
            log::debug!("GL backend shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_indices_cover_two_triangles_per_quad() {
        let idx = quad_indices();
        assert_eq!(idx.len(), MAX_QUADS_PER_DRAW as usize * 6);
        assert_eq!(&idx[..6], &[0, 1, 2, 0, 2, 3]);
        assert_eq!(&idx[6..12], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn transforms_are_packed_at_the_uniform_stride() {
        let a: Mat4 = [[1.0; 4]; 4];
        let b: Mat4 = [[2.0; 4]; 4];
        let stride = align_up(MAT4_BYTES, 256);
        assert_eq!(stride, 256);

        let bytes = pack_transforms(&[a, b], stride);
        assert_eq!(bytes.len(), 2 * stride);
        let second: &[f32] = bytemuck::cast_slice(&bytes[stride..stride + MAT4_BYTES]);
        assert!(second.iter().all(|&v| v == 2.0));
        assert!(bytes[MAT4_BYTES..stride].iter().all(|&b| b == 0));
    }

    #[test]
    fn small_alignment_keeps_matrices_tight() {
        assert_eq!(align_up(MAT4_BYTES, 16), MAT4_BYTES);
        assert_eq!(align_up(MAT4_BYTES, 0), MAT4_BYTES);
    }

    #[test]
    fn capture_region_reads_from_the_bottom_row() {
        let region = capture_region(Some(ClipRect::new(5, 0, 20, 30)), 100, 80).unwrap();
        assert_eq!(region.flip_y(80), ClipRect::new(5, 50, 20, 30));
    }

    #[test]
    fn scissor_is_flipped_to_bottom_left() {
        let clip = ClipRect::new(10, 20, 30, 40).clamp_to(200, 100);
        assert_eq!(clip.flip_y(100), ClipRect::new(10, 40, 30, 40));
    }
}
