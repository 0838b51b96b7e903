use anyhow::Result;
use glow::HasContext;

use crate::command::WrapMode;
use crate::texture::{PreparedArray, PreparedTexture, PreparedUpdate};

/// One variant of a texture slot.
pub(super) struct GlTexture {
    pub(super) texture: glow::Texture,
    pub(super) target: u32,
}

impl GlTexture {
    pub(super) fn destroy(self, gl: &glow::Context) {
        unsafe { gl.delete_texture(self.texture) };
    }
}

/// Sampler objects indexed by `[linear_mipmaps][wrap_u][wrap_v]`.
pub(super) struct Samplers {
    samplers: [[[glow::Sampler; 2]; 2]; 2],
}

impl Samplers {
    pub(super) fn new(gl: &glow::Context) -> Result<Self> {
        let wrap = |i: usize| match i {
            0 => glow::REPEAT,
            _ => glow::CLAMP_TO_EDGE,
        } as i32;

        let mut flat = Vec::with_capacity(8);
        for m in 0..2 {
            for u in 0..2 {
                for v in 0..2 {
                    let sampler = unsafe { gl.create_sampler() }.map_err(anyhow::Error::msg)?;
                    let min = if m == 1 {
                        glow::LINEAR_MIPMAP_LINEAR
                    } else {
                        glow::LINEAR_MIPMAP_NEAREST
                    };
                    unsafe {
                        gl.sampler_parameter_i32(sampler, glow::TEXTURE_MIN_FILTER, min as i32);
                        gl.sampler_parameter_i32(sampler, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
                        gl.sampler_parameter_i32(sampler, glow::TEXTURE_WRAP_S, wrap(u));
                        gl.sampler_parameter_i32(sampler, glow::TEXTURE_WRAP_T, wrap(v));
                    }
                    flat.push(sampler);
                }
            }
        }
        let samplers = std::array::from_fn(|m| {
            std::array::from_fn(|u| std::array::from_fn(|v| flat[m * 4 + u * 2 + v]))
        });
        Ok(Self { samplers })
    }

    pub(super) fn get(&self, linear_mipmaps: bool, wrap_u: WrapMode, wrap_v: WrapMode) -> glow::Sampler {
        self.samplers[linear_mipmaps as usize][wrap_u.index()][wrap_v.index()]
    }

    pub(super) fn destroy(&self, gl: &glow::Context) {
        for s in self.samplers.iter().flatten().flatten() {
            unsafe { gl.delete_sampler(*s) };
        }
    }
}

fn new_texture(gl: &glow::Context, target: u32, max_level: u32) -> Result<glow::Texture> {
    unsafe {
        let texture = gl.create_texture().map_err(anyhow::Error::msg)?;
        gl.bind_texture(target, Some(texture));
        gl.tex_parameter_i32(target, glow::TEXTURE_BASE_LEVEL, 0);
        gl.tex_parameter_i32(target, glow::TEXTURE_MAX_LEVEL, max_level as i32);
        Ok(texture)
    }
}

/// Creates the 2D variant, uploads level 0 and fills the mip chain.
pub(super) fn create_2d(gl: &glow::Context, prepared: &PreparedTexture, base: &[u8]) -> Result<GlTexture> {
    let texture = new_texture(gl, glow::TEXTURE_2D, prepared.mip_levels.saturating_sub(1))?;
    unsafe {
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA8 as i32,
            prepared.width as i32,
            prepared.height as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            Some(base),
        );
        if prepared.mip_levels > 1 {
            gl.generate_mipmap(glow::TEXTURE_2D);
        }
        gl.bind_texture(glow::TEXTURE_2D, None);
    }
    Ok(GlTexture {
        texture,
        target: glow::TEXTURE_2D,
    })
}

/// Creates the layered variant from repacked tiles.
pub(super) fn create_array(gl: &glow::Context, array: &PreparedArray) -> Result<GlTexture> {
    let texture = new_texture(gl, glow::TEXTURE_2D_ARRAY, 0)?;
    unsafe {
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        gl.tex_image_3d(
            glow::TEXTURE_2D_ARRAY,
            0,
            glow::RGBA8 as i32,
            array.width as i32,
            array.height as i32,
            array.layers as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            Some(&array.data),
        );
        gl.bind_texture(glow::TEXTURE_2D_ARRAY, None);
    }
    Ok(GlTexture {
        texture,
        target: glow::TEXTURE_2D_ARRAY,
    })
}

/// Writes a sub-rectangle into level 0 and rebuilds the mip chain.
pub(super) fn update_2d(gl: &glow::Context, tex: &GlTexture, update: &PreparedUpdate, mip_levels: u32) {
    unsafe {
        gl.bind_texture(glow::TEXTURE_2D, Some(tex.texture));
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        gl.tex_sub_image_2d(
            glow::TEXTURE_2D,
            0,
            update.x as i32,
            update.y as i32,
            update.width as i32,
            update.height as i32,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            glow::PixelUnpackData::Slice(&update.rgba),
        );
        if mip_levels > 1 {
            gl.generate_mipmap(glow::TEXTURE_2D);
        }
        gl.bind_texture(glow::TEXTURE_2D, None);
    }
}
