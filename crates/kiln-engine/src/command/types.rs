use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::coords::ClipRect;

/// Index into the backend's texture slot table.
///
/// The producer owns allocation: a slot must be destroyed exactly once per
/// create before it is reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

impl TextureId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Pixel layout of texture data supplied by the producer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TexFormat {
    Rgb,
    Rgba,
    /// Single channel; becomes white with the value as alpha.
    Alpha,
}

impl TexFormat {
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            TexFormat::Rgb => 3,
            TexFormat::Rgba => 4,
            TexFormat::Alpha => 1,
        }
    }
}

bitflags! {
    /// Options for texture creation.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct TextureFlags: u32 {
        const NO_MIPMAPS     = 1 << 0;
        /// Accepted for compatibility; storage is always uncompressed RGBA8.
        const COMPRESSED     = 1 << 1;
        /// Skip the quality downscale.
        const QUALITY        = 1 << 2;
        const TEXTURE_2D     = 1 << 3;
        /// Also build a layered texture from the `N×N` tile grid.
        const TEXTURE_ARRAY  = 1 << 4;
        const LINEAR_MIPMAPS = 1 << 5;
    }
}

/// Which variant of a texture slot a draw samples from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextureDimension {
    D2,
    Array,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BlendMode {
    None,
    #[default]
    Alpha,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
}

impl WrapMode {
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            WrapMode::Repeat => 0,
            WrapMode::Clamp => 1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrimType {
    /// Four vertices per primitive, split into two triangles.
    Quads,
    /// Two vertices per primitive.
    Lines,
}

impl PrimType {
    #[inline]
    pub const fn vertices_per_prim(self) -> u32 {
        match self {
            PrimType::Quads => 4,
            PrimType::Lines => 2,
        }
    }
}

/// Orthographic projection rectangle: top-left and bottom-right corners in
/// the producer's world units. Defaults to the unit square.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Screen {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Screen {
    #[inline]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }
}

/// Pipeline state attached to every draw.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderState {
    pub blend: BlendMode,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub texture: Option<TextureId>,
    pub dimension: TextureDimension,
    pub screen: Screen,
    /// Scissor rectangle in surface pixels; `None` disables clipping.
    pub clip: Option<ClipRect>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            blend: BlendMode::Alpha,
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
            texture: None,
            dimension: TextureDimension::D2,
            screen: Screen::default(),
            clip: None,
        }
    }
}

/// Vertex layout shared by producer and backends (36 bytes).
///
/// `tex[2]` selects the layer of an array texture as a normalized coordinate:
/// layer `i` is addressed by `(i + 0.5) / NUM_TILES`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub tex: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    pub const STRIDE: usize = std::mem::size_of::<Vertex>();
}

/// Top-down RGB8 image returned by a screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}
