use std::fmt;

use crossbeam_channel::Sender;

use super::sync::Semaphore;
use super::types::{Image, PrimType, RenderState, TexFormat, TextureFlags, TextureId};
use crate::backend::wgpu::WgpuInitCommand;
use crate::coords::{ClipRect, ColorRgba};

#[cfg(feature = "opengl")]
use crate::backend::gl::GlInitCommand;

/// Numeric command codes, grouped in disjoint ranges.
///
/// Each dispatcher fragment owns one range; a code outside every attached
/// fragment's range is reported as unhandled.
pub mod codes {
    pub const GROUP_SIZE: u32 = 10_000;

    pub const CMDGROUP_CORE: u32 = 0;
    pub const CMDGROUP_PLATFORM_WGPU: u32 = 10_000;
    pub const CMDGROUP_PLATFORM_GL: u32 = 20_000;
    pub const CMDGROUP_PLATFORM_WINDOW: u32 = 30_000;

    pub const NOP: u32 = CMDGROUP_CORE;
    pub const SIGNAL: u32 = CMDGROUP_CORE + 1;
    pub const TEXTURE_CREATE: u32 = CMDGROUP_CORE + 2;
    pub const TEXTURE_UPDATE: u32 = CMDGROUP_CORE + 3;
    pub const TEXTURE_DESTROY: u32 = CMDGROUP_CORE + 4;
    pub const CLEAR: u32 = CMDGROUP_CORE + 5;
    pub const RENDER: u32 = CMDGROUP_CORE + 6;
    pub const SWAP: u32 = CMDGROUP_CORE + 7;
    pub const SCREENSHOT: u32 = CMDGROUP_CORE + 8;

    pub const WGPU_INIT: u32 = CMDGROUP_PLATFORM_WGPU;
    pub const GL_INIT: u32 = CMDGROUP_PLATFORM_GL;

    pub const VSYNC: u32 = CMDGROUP_PLATFORM_WINDOW;
    pub const RESIZE: u32 = CMDGROUP_PLATFORM_WINDOW + 1;
    pub const SHUTDOWN: u32 = CMDGROUP_PLATFORM_WINDOW + 2;

    /// Base of the range `code` falls into.
    #[inline]
    pub const fn group_of(code: u32) -> u32 {
        code - code % GROUP_SIZE
    }
}

/// Signals the contained semaphore when the render thread reaches it.
#[derive(Debug, Clone)]
pub struct SignalCommand {
    pub semaphore: Semaphore,
}

#[derive(Debug, Clone)]
pub struct TextureCreateCommand {
    pub slot: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: TexFormat,
    pub flags: TextureFlags,
    pub data: Vec<u8>,
}

/// Replaces a sub-rectangle of the 2D variant. Coordinates are in the
/// resolution the texture was created with; a downscaled texture scales the
/// rectangle down the same way.
#[derive(Debug, Clone)]
pub struct TextureUpdateCommand {
    pub slot: TextureId,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub format: TexFormat,
    pub data: Vec<u8>,
}

#[derive(Debug, Copy, Clone)]
pub struct TextureDestroyCommand {
    pub slot: TextureId,
}

#[derive(Debug, Copy, Clone)]
pub struct ClearCommand {
    pub color: ColorRgba,
}

/// Draws `prim_count` primitives whose vertices start `vertex_offset` bytes
/// into the buffer's data region.
#[derive(Debug, Copy, Clone)]
pub struct RenderCommand {
    pub state: RenderState,
    pub prim_type: PrimType,
    pub prim_count: u32,
    pub vertex_offset: usize,
}

impl RenderCommand {
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.prim_count * self.prim_type.vertices_per_prim()
    }
}

/// Presents the current frame. With `finish` the render thread blocks until
/// the GPU has completed all submitted work.
#[derive(Debug, Copy, Clone, Default)]
pub struct SwapCommand {
    pub finish: bool,
}

/// Reads back the current frame. The image is sent on `reply` once the copy
/// has completed.
#[derive(Debug, Clone)]
pub struct ScreenshotCommand {
    /// Area to capture in surface pixels, top-left origin. `None` captures the
    /// whole frame; a region reaching past the surface is clamped to it.
    pub region: Option<ClipRect>,
    pub reply: Sender<Image>,
}

#[derive(Debug, Copy, Clone)]
pub struct VSyncCommand {
    pub vsync: bool,
}

#[derive(Debug, Copy, Clone)]
pub struct ResizeCommand {
    pub width: u32,
    pub height: u32,
}

/// Backend bring-up; handled by the fragment of the matching backend only.
pub enum BackendInit {
    Wgpu(WgpuInitCommand),
    #[cfg(feature = "opengl")]
    Gl(GlInitCommand),
}

/// A single recorded command.
pub enum Command {
    Nop,
    Signal(SignalCommand),
    TextureCreate(TextureCreateCommand),
    TextureUpdate(TextureUpdateCommand),
    TextureDestroy(TextureDestroyCommand),
    Clear(ClearCommand),
    Render(RenderCommand),
    Swap(SwapCommand),
    Screenshot(ScreenshotCommand),
    Init(BackendInit),
    VSync(VSyncCommand),
    Resize(ResizeCommand),
    Shutdown,
}

impl Command {
    pub fn code(&self) -> u32 {
        match self {
            Command::Nop => codes::NOP,
            Command::Signal(_) => codes::SIGNAL,
            Command::TextureCreate(_) => codes::TEXTURE_CREATE,
            Command::TextureUpdate(_) => codes::TEXTURE_UPDATE,
            Command::TextureDestroy(_) => codes::TEXTURE_DESTROY,
            Command::Clear(_) => codes::CLEAR,
            Command::Render(_) => codes::RENDER,
            Command::Swap(_) => codes::SWAP,
            Command::Screenshot(_) => codes::SCREENSHOT,
            Command::Init(BackendInit::Wgpu(_)) => codes::WGPU_INIT,
            #[cfg(feature = "opengl")]
            Command::Init(BackendInit::Gl(_)) => codes::GL_INIT,
            Command::VSync(_) => codes::VSYNC,
            Command::Resize(_) => codes::RESIZE,
            Command::Shutdown => codes::SHUTDOWN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Nop => "nop",
            Command::Signal(_) => "signal",
            Command::TextureCreate(_) => "texture_create",
            Command::TextureUpdate(_) => "texture_update",
            Command::TextureDestroy(_) => "texture_destroy",
            Command::Clear(_) => "clear",
            Command::Render(_) => "render",
            Command::Swap(_) => "swap",
            Command::Screenshot(_) => "screenshot",
            Command::Init(_) => "init",
            Command::VSync(_) => "vsync",
            Command::Resize(_) => "resize",
            Command::Shutdown => "shutdown",
        }
    }

    #[inline]
    pub fn group(&self) -> u32 {
        codes::group_of(self.code())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("code", &self.code())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_fall_in_their_groups() {
        assert_eq!(Command::Nop.group(), codes::CMDGROUP_CORE);
        assert_eq!(Command::Swap(SwapCommand::default()).group(), codes::CMDGROUP_CORE);
        assert_eq!(
            Command::VSync(VSyncCommand { vsync: true }).group(),
            codes::CMDGROUP_PLATFORM_WINDOW
        );
        assert_eq!(Command::Shutdown.group(), codes::CMDGROUP_PLATFORM_WINDOW);
        assert_eq!(codes::group_of(codes::WGPU_INIT), codes::CMDGROUP_PLATFORM_WGPU);
        assert_eq!(codes::group_of(codes::GL_INIT), codes::CMDGROUP_PLATFORM_GL);
    }

    #[test]
    fn render_vertex_count_follows_prim_type() {
        let quads = RenderCommand {
            state: RenderState::default(),
            prim_type: PrimType::Quads,
            prim_count: 3,
            vertex_offset: 0,
        };
        assert_eq!(quads.vertex_count(), 12);
        let lines = RenderCommand { prim_type: PrimType::Lines, ..quads };
        assert_eq!(lines.vertex_count(), 6);
    }
}
