//! Texture processing and bookkeeping shared by all backends.

mod convert;
mod memory;
mod mip;
mod prepare;
mod slots;

pub use convert::{
    TextureLimits, downscale_target, flip_rows, premultiply, repack_tiles, rescale, to_rgba,
};
pub use memory::MemoryCounter;
pub use mip::{footprint, mip_level_count, mip_size};
pub use prepare::{PreparedArray, PreparedTexture, PreparedUpdate, prepare_create, prepare_update};
pub use slots::{BindCache, SlotEntry, SlotState, TextureInfo, TextureSlots};
