//! Geometry and color types shared by the command stream and the backends.
//!
//! Canonical space for everything crossing the backend interface:
//! - physical pixels of the presentation surface
//! - origin top-left
//! - +X right, +Y down
//!
//! Backends whose native origin differs convert at the point of use.

mod clip;
mod color;

pub use clip::ClipRect;
pub use color::ColorRgba;
