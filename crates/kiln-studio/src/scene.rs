//! Demo content recorded into command buffers each frame.

use kiln_engine::Graphics;
use kiln_engine::command::{
    BlendMode, ClearCommand, Command, CommandBuffer, CommandBufferError, PrimType,
    RenderCommand, RenderState, Screen, TexFormat, TextureCreateCommand, TextureDimension,
    TextureFlags, TextureId, TextureUpdateCommand, Vertex, WrapMode,
};
use kiln_engine::coords::{ClipRect, ColorRgba};

const CHECKER: TextureId = TextureId(0);
const ATLAS: TextureId = TextureId(1);
const GLYPH: TextureId = TextureId(2);

const ATLAS_TILE: u32 = 16;

/// Records commands, submitting early when the buffer fills up.
pub struct Frame<'a> {
    graphics: &'a mut Graphics,
    buffer: Option<CommandBuffer>,
}

impl<'a> Frame<'a> {
    pub fn new(graphics: &'a mut Graphics, buffer: CommandBuffer) -> Self {
        Self {
            graphics,
            buffer: Some(buffer),
        }
    }

    fn buffer(&mut self) -> &mut CommandBuffer {
        self.buffer
            .get_or_insert_with(|| self.graphics.new_command_buffer())
    }

    fn flush(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            log::debug!("command buffer full; submitting {} commands early", buffer.command_count());
            self.buffer = Some(self.graphics.run_buffer(buffer));
        }
    }

    pub fn push(&mut self, command: Command) {
        let command = match self.buffer().add_command(command) {
            Ok(()) => return,
            Err(err) => match err.into_command() {
                Some(command) => command,
                None => return,
            },
        };
        self.flush();
        if let Err(err) = self.buffer().add_command(command) {
            log::error!("command dropped: {err}");
        }
    }

    /// Appends `vertices` and a draw of them.
    pub fn draw(&mut self, prim_type: PrimType, state: RenderState, vertices: &[Vertex]) {
        let prim_count = (vertices.len() / prim_type.vertices_per_prim() as usize) as u32;
        if prim_count == 0 {
            return;
        }
        let offset = match self.buffer().add_vertices(vertices) {
            Ok(offset) => offset,
            Err(CommandBufferError::DataFull { .. }) => {
                self.flush();
                match self.buffer().add_vertices(vertices) {
                    Ok(offset) => offset,
                    Err(err) => {
                        log::error!("draw dropped: {err}");
                        return;
                    }
                }
            }
            Err(err) => {
                log::error!("draw dropped: {err}");
                return;
            }
        };
        self.push(Command::Render(RenderCommand {
            state,
            prim_type,
            prim_count,
            vertex_offset: offset,
        }));
    }

    /// Submits what is left and returns the buffer for the next frame.
    pub fn finish(mut self) -> CommandBuffer {
        let buffer = self
            .buffer
            .take()
            .unwrap_or_else(|| self.graphics.new_command_buffer());
        self.graphics.run_buffer(buffer)
    }
}

fn quad(x0: f32, y0: f32, x1: f32, y1: f32, uv: [f32; 4], layer: f32, color: [f32; 4]) -> [Vertex; 4] {
    let [u0, v0, u1, v1] = uv;
    [
        Vertex { pos: [x0, y0], tex: [u0, v0, layer], color },
        Vertex { pos: [x1, y0], tex: [u1, v0, layer], color },
        Vertex { pos: [x1, y1], tex: [u1, v1, layer], color },
        Vertex { pos: [x0, y1], tex: [u0, v1, layer], color },
    ]
}

fn line(x0: f32, y0: f32, x1: f32, y1: f32, color: [f32; 4]) -> [Vertex; 2] {
    [
        Vertex { pos: [x0, y0], tex: [0.0; 3], color },
        Vertex { pos: [x1, y1], tex: [0.0; 3], color },
    ]
}

/// Array layer `i` as the third texture coordinate.
fn layer(i: u32) -> f32 {
    (i as f32 + 0.5) / 256.0
}

fn checker_pixels(size: u32, phase: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let on = ((x / 8) + (y / 8) + phase) % 2 == 0;
            let (r, g, b) = if on { (230, 120, 40) } else { (40, 40, 48) };
            data.extend_from_slice(&[r, g, b, 255]);
        }
    }
    data
}

/// 16×16 tiles, each a distinct flat color.
fn atlas_pixels() -> Vec<u8> {
    let side = ATLAS_TILE * 16;
    let mut data = Vec::with_capacity((side * side * 3) as usize);
    for y in 0..side {
        for x in 0..side {
            let tile = (y / ATLAS_TILE) * 16 + x / ATLAS_TILE;
            data.extend_from_slice(&[(tile * 7) as u8, (tile * 13) as u8, 255 - tile as u8]);
        }
    }
    data
}

fn glyph_pixels(size: u32) -> Vec<u8> {
    let c = size as f32 / 2.0;
    (0..size * size)
        .map(|i| {
            let (x, y) = ((i % size) as f32 + 0.5, (i / size) as f32 + 0.5);
            let d = ((x - c).powi(2) + (y - c).powi(2)).sqrt() / c;
            ((1.0 - d).clamp(0.0, 1.0) * 255.0) as u8
        })
        .collect()
}

pub struct Scene {
    frame: u64,
    uploaded: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            frame: 0,
            uploaded: false,
        }
    }

    fn upload(&mut self, frame: &mut Frame<'_>) {
        frame.push(Command::TextureCreate(TextureCreateCommand {
            slot: CHECKER,
            width: 64,
            height: 64,
            format: TexFormat::Rgba,
            flags: TextureFlags::QUALITY | TextureFlags::LINEAR_MIPMAPS,
            data: checker_pixels(64, 0),
        }));
        frame.push(Command::TextureCreate(TextureCreateCommand {
            slot: ATLAS,
            width: ATLAS_TILE * 16,
            height: ATLAS_TILE * 16,
            format: TexFormat::Rgb,
            flags: TextureFlags::QUALITY | TextureFlags::TEXTURE_2D | TextureFlags::TEXTURE_ARRAY,
            data: atlas_pixels(),
        }));
        frame.push(Command::TextureCreate(TextureCreateCommand {
            slot: GLYPH,
            width: 32,
            height: 32,
            format: TexFormat::Alpha,
            flags: TextureFlags::NO_MIPMAPS,
            data: glyph_pixels(32),
        }));
        self.uploaded = true;
    }

    /// Records one frame for a `width` × `height` surface, without the swap.
    pub fn record(&mut self, frame: &mut Frame<'_>, width: u32, height: u32) {
        if !self.uploaded {
            self.upload(frame);
        }
        self.frame += 1;
        let t = self.frame as f32 / 60.0;

        // Animate the checkerboard through partial updates.
        if self.frame % 30 == 0 {
            let phase = (self.frame / 30 % 2) as u32;
            frame.push(Command::TextureUpdate(TextureUpdateCommand {
                slot: CHECKER,
                x: 0,
                y: 0,
                width: 64,
                height: 32,
                format: TexFormat::Rgba,
                data: checker_pixels(64, phase)[..64 * 32 * 4].to_vec(),
            }));
        }

        frame.push(Command::Clear(ClearCommand {
            color: ColorRgba::new(0.08, 0.08, 0.1, 1.0),
        }));

        let (w, h) = (width as f32, height as f32);
        let screen = Screen::new(0.0, 0.0, w, h);
        let base = RenderState {
            screen,
            ..Default::default()
        };
        let white = [1.0; 4];

        // Tiled checkerboard with repeat wrapping.
        let checker = RenderState {
            texture: Some(CHECKER),
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
            blend: BlendMode::None,
            ..base
        };
        frame.draw(
            PrimType::Quads,
            checker,
            &quad(20.0, 20.0, 276.0, 276.0, [0.0, 0.0, 4.0, 4.0], 0.0, white),
        );

        // Atlas, once as a plain 2D texture and once layer by layer.
        let atlas_2d = RenderState {
            texture: Some(ATLAS),
            wrap_u: WrapMode::Clamp,
            wrap_v: WrapMode::Clamp,
            ..base
        };
        frame.draw(
            PrimType::Quads,
            atlas_2d,
            &quad(300.0, 20.0, 428.0, 148.0, [0.0, 0.0, 1.0, 1.0], 0.0, white),
        );

        let atlas_layers = RenderState {
            dimension: TextureDimension::Array,
            ..atlas_2d
        };
        let tiles: Vec<Vertex> = (0..32u32)
            .flat_map(|i| {
                let x = 300.0 + (i % 8) as f32 * 20.0;
                let y = 160.0 + (i / 8) as f32 * 20.0;
                let tile = (i * 7 + self.frame as u32 / 10) % 256;
                quad(x, y, x + 16.0, y + 16.0, [0.0, 0.0, 1.0, 1.0], layer(tile), white)
            })
            .collect();
        frame.draw(PrimType::Quads, atlas_layers, &tiles);

        // Alpha-only glyphs tinted by vertex color.
        let glyph = RenderState {
            texture: Some(GLYPH),
            wrap_u: WrapMode::Clamp,
            wrap_v: WrapMode::Clamp,
            ..base
        };
        let glyphs: Vec<Vertex> = (0..6)
            .flat_map(|i| {
                let x = 20.0 + i as f32 * 40.0;
                let hue = i as f32 / 6.0;
                quad(x, 300.0, x + 32.0, 332.0, [0.0, 0.0, 1.0, 1.0], 0.0, [1.0, hue, 1.0 - hue, 0.9])
            })
            .collect();
        frame.draw(PrimType::Quads, glyph, &glyphs);

        // Oscillating lines.
        let lines: Vec<Vertex> = (0..64)
            .flat_map(|i| {
                let x = 480.0 + i as f32 * 4.0;
                let y = 120.0 + (t * 2.0 + i as f32 * 0.2).sin() * 60.0;
                line(x, 120.0, x, y, [0.3, 0.9, 0.5, 1.0])
            })
            .collect();
        frame.draw(PrimType::Lines, base, &lines);

        // A translucent quad clipped to a moving window.
        let clip_x = (w * 0.5 + t.sin() * 100.0).max(0.0) as u32;
        let clipped = RenderState {
            clip: Some(ClipRect::new(clip_x, 220, 160, 120)),
            ..base
        };
        frame.draw(
            PrimType::Quads,
            clipped,
            &quad(w * 0.5 - 150.0, 200.0, w * 0.5 + 250.0, 360.0, [0.0; 4], 0.0, [0.2, 0.5, 1.0, 0.6]),
        );

        // A second screen rectangle: the same grid, zoomed.
        let zoomed = RenderState {
            screen: Screen::new(0.0, 0.0, w * 0.5, h * 0.5),
            ..checker
        };
        frame.draw(
            PrimType::Quads,
            zoomed,
            &quad(10.0, h * 0.5 - 70.0, 70.0, h * 0.5 - 10.0, [0.0, 0.0, 1.0, 1.0], 0.0, white),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atlas_tiles_are_flat() {
        let data = atlas_pixels();
        let side = (ATLAS_TILE * 16) as usize;
        let px = |x: usize, y: usize| &data[(y * side + x) * 3..(y * side + x) * 3 + 3];
        assert_eq!(px(0, 0), px(15, 15));
        assert_ne!(px(0, 0), px(16, 0));
    }

    #[test]
    fn layer_coordinate_selects_tile() {
        for i in [0u32, 1, 17, 255] {
            assert_eq!((layer(i) * 256.0) as u32, i);
        }
    }

    #[test]
    fn glyph_is_opaque_in_the_middle() {
        let g = glyph_pixels(32);
        assert!(g[16 * 32 + 16] > 200);
        assert_eq!(g[0], 0);
    }
}
