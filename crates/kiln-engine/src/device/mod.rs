//! wgpu device and surface management.
//!
//! This module is responsible for:
//! - requesting the adapter, device and queue for a surface
//! - configuring the surface (size, present mode, usages)
//! - acquiring surface images and recovering from surface errors

mod error;
mod gpu;
mod init;
mod surface;

pub use error::SurfaceErrorAction;
pub use gpu::{Acquired, Gpu};
pub use init::GpuInit;
pub use surface::present_mode_for;

/// Drawable size in physical pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}
