//! GPU resource backends.
//!
//! The dispatcher only talks to [`GpuBackend`]; `wgpu` is always built and the
//! OpenGL backend is behind the `opengl` feature.

pub mod pipeline;
pub mod wgpu;

#[cfg(feature = "opengl")]
pub mod gl;

use crate::command::{
    BackendInit, Image, RenderCommand, TextureCreateCommand, TextureDestroyCommand,
    TextureUpdateCommand, Vertex,
};
use crate::coords::{ClipRect, ColorRgba};
use crate::screen::Mat4;

/// Resource, draw and presentation operations of one graphics API.
///
/// All methods run on the render thread. Draw and presentation calls are only
/// made while [`GpuBackend::is_ready`] holds.
pub trait GpuBackend {
    /// Payload of this backend's init command.
    type Init;

    /// Code of the init command this backend accepts.
    const INIT_CODE: u32;

    /// Extracts this backend's payload from a generic init command.
    fn unpack_init(init: BackendInit) -> Option<Self::Init>;

    /// Creates the device, surface, pipelines and streaming buffers.
    /// Failures are logged and leave the backend not ready.
    fn init(&mut self, init: Self::Init);

    fn is_ready(&self) -> bool;

    /// Uploads the vertex data and transforms of a whole buffer.
    fn begin_buffer(&mut self, vertices: &[Vertex], transforms: &[Mat4]);

    /// Submits recorded work that does not wait for a swap.
    fn end_buffer(&mut self);

    fn texture_create(&mut self, cmd: &TextureCreateCommand);
    fn texture_update(&mut self, cmd: &TextureUpdateCommand);
    fn texture_destroy(&mut self, cmd: &TextureDestroyCommand);

    fn clear(&mut self, color: ColorRgba);

    /// Draws with the transform at `transform` in the table passed to
    /// [`GpuBackend::begin_buffer`].
    fn render(&mut self, cmd: &RenderCommand, transform: u32);

    /// Submits the frame and presents it. With `finish`, blocks until the GPU
    /// is idle.
    fn present(&mut self, finish: bool);

    /// Recreates the presentation surface with a new swap interval.
    fn set_vsync(&mut self, vsync: bool);

    /// Acquires the next image to render into.
    fn begin_frame(&mut self);

    /// Reads back `region` of the current frame as top-down RGB8.
    fn screenshot(&mut self, region: Option<ClipRect>) -> Option<Image>;

    fn resize(&mut self, width: u32, height: u32);

    /// Releases every resource. Afterwards the backend is not ready.
    fn shutdown(&mut self);
}

/// Resolves a screenshot region against a `width × height` surface.
///
/// Returns `None` when nothing of the surface would be captured.
pub fn capture_region(region: Option<ClipRect>, width: u32, height: u32) -> Option<ClipRect> {
    let rect = region
        .unwrap_or(ClipRect::new(0, 0, width, height))
        .clamp_to(width, height);
    (!rect.is_empty()).then_some(rect)
}
