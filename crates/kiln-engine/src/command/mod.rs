//! Command stream recorded by the producer and replayed on the render thread.
//!
//! A [`CommandBuffer`] holds typed [`Command`]s plus a bulk vertex region.
//! Once submitted it belongs to the render thread until it drains.

mod buffer;
mod cmd;
mod sync;
mod types;

pub use buffer::{CommandBuffer, CommandBufferError};
pub use cmd::{
    codes, BackendInit, ClearCommand, Command, RenderCommand, ResizeCommand, ScreenshotCommand,
    SignalCommand, SwapCommand, TextureCreateCommand, TextureDestroyCommand,
    TextureUpdateCommand, VSyncCommand,
};
pub use sync::Semaphore;
pub use types::{
    BlendMode, Image, PrimType, RenderState, Screen, TexFormat, TextureDimension, TextureFlags,
    TextureId, Vertex, WrapMode,
};

/// Number of texture slots addressable by a [`TextureId`].
pub const MAX_TEXTURES: usize = 1024;

/// Tiles per axis in the source image of an array texture.
///
/// An array texture is uploaded from an image made of
/// `NUM_TILES_DIMENSION × NUM_TILES_DIMENSION` equally sized tiles; each tile
/// becomes one layer.
pub const NUM_TILES_DIMENSION: u32 = 16;

/// Layers of an array texture.
pub const NUM_TILES: u32 = NUM_TILES_DIMENSION * NUM_TILES_DIMENSION;

/// Upper bound on the length of a generated mip chain (base level included).
pub const MAX_MIP_LEVELS: u32 = 12;

/// Distinct screen rectangles a single buffer may reference.
///
/// Further rectangles reuse the last table entry.
pub const MAX_SCREENS: usize = 256;
