use crate::command::{
    NUM_TILES, NUM_TILES_DIMENSION, TexFormat, TextureCreateCommand, TextureFlags,
    TextureUpdateCommand,
};

use super::convert::{self, TextureLimits};
use super::mip;
use super::slots::TextureInfo;

const RGBA_BPP: usize = 4;

/// RGBA8 pixels ready for upload, plus the bookkeeping a slot needs.
#[derive(Debug, Clone)]
pub struct PreparedTexture {
    /// Stored size of the 2D variant.
    pub width: u32,
    pub height: u32,
    /// Base level of the 2D variant; `None` when only the array was asked for.
    pub base: Option<Vec<u8>>,
    pub mip_levels: u32,
    pub array: Option<PreparedArray>,
    pub premultiplied: bool,
    /// Number of times each axis was halved on the way in, as `(x, y)`.
    pub rescale_shift: (u32, u32),
}

#[derive(Debug, Clone)]
pub struct PreparedArray {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    /// Layers back to back, `width * height * 4` bytes each.
    pub data: Vec<u8>,
}

impl PreparedTexture {
    /// Bytes the texture occupies on the device.
    pub fn footprint(&self) -> usize {
        let tex2d = if self.base.is_some() {
            mip::footprint(self.width, self.height, self.mip_levels, RGBA_BPP)
        } else {
            0
        };
        let array = self
            .array
            .as_ref()
            .map(|a| a.width as usize * a.height as usize * RGBA_BPP * a.layers as usize)
            .unwrap_or(0);
        tex2d + array
    }
}

/// A sub-rectangle converted to RGBA8 at the stored resolution.
#[derive(Debug, Clone)]
pub struct PreparedUpdate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

fn expected_len(width: u32, height: u32, format: TexFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}

/// Runs the create path: downscale, RGBA expansion, premultiplication of
/// RGBA sources, tile repack and mip chain sizing.
///
/// Returns `None` (after logging) when the pixel data does not match the
/// declared size.
pub fn prepare_create(cmd: &TextureCreateCommand, limits: TextureLimits) -> Option<PreparedTexture> {
    if cmd.width == 0 || cmd.height == 0 {
        log::warn!("texture {}: zero size {}x{}", cmd.slot.0, cmd.width, cmd.height);
        return None;
    }
    let expected = expected_len(cmd.width, cmd.height, cmd.format);
    if cmd.data.len() != expected {
        log::warn!(
            "texture {}: {} bytes of pixel data, expected {expected}",
            cmd.slot.0,
            cmd.data.len()
        );
        return None;
    }

    let (mut width, mut height) = (cmd.width, cmd.height);
    let mut rescale_shift = (0, 0);
    let mut rgba = match convert::downscale_target(width, height, cmd.format, cmd.flags, limits) {
        Some((w, h)) => {
            let scaled = convert::rescale(
                &cmd.data,
                width,
                height,
                w,
                h,
                cmd.format.bytes_per_pixel(),
            );
            rescale_shift = ((width / w).ilog2(), (height / h).ilog2());
            log::debug!("texture {}: downscaled {width}x{height} -> {w}x{h}", cmd.slot.0);
            (width, height) = (w, h);
            convert::to_rgba(&scaled, cmd.format)
        }
        None => convert::to_rgba(&cmd.data, cmd.format),
    };

    let premultiplied = cmd.format == TexFormat::Rgba;
    if premultiplied {
        convert::premultiply(&mut rgba);
    }

    let want_array = cmd.flags.contains(TextureFlags::TEXTURE_ARRAY);
    let want_2d = cmd.flags.contains(TextureFlags::TEXTURE_2D) || !want_array;

    let array = if want_array {
        let (tw, th) = (width / NUM_TILES_DIMENSION, height / NUM_TILES_DIMENSION);
        if tw == 0 || th == 0 {
            log::warn!(
                "texture {}: {width}x{height} is too small for a {n}x{n} tile grid",
                cmd.slot.0,
                n = NUM_TILES_DIMENSION
            );
            None
        } else {
            // Crop to a whole number of tiles so rows line up.
            let (gw, gh) = (tw * NUM_TILES_DIMENSION, th * NUM_TILES_DIMENSION);
            let grid = if (gw, gh) == (width, height) {
                convert::repack_tiles(&rgba, width, height, RGBA_BPP)
            } else {
                let cropped = crop(&rgba, width, gw, gh, RGBA_BPP);
                convert::repack_tiles(&cropped, gw, gh, RGBA_BPP)
            };
            Some(PreparedArray {
                width: tw,
                height: th,
                layers: NUM_TILES,
                data: grid,
            })
        }
    } else {
        None
    };

    let mip_levels = if cmd.flags.contains(TextureFlags::NO_MIPMAPS) {
        1
    } else {
        mip::mip_level_count(width, height)
    };

    Some(PreparedTexture {
        width,
        height,
        base: want_2d.then_some(rgba),
        mip_levels,
        array,
        premultiplied,
        rescale_shift,
    })
}

/// Runs the update path against the texture described by `target`.
///
/// The rectangle is scaled by the halvings applied at creation, and pixels
/// are premultiplied whenever the target stores premultiplied texels, so an
/// update never mixes alpha conventions within one texture.
///
/// Returns `None` when the data is malformed or the rectangle collapses.
pub fn prepare_update(cmd: &TextureUpdateCommand, target: &TextureInfo) -> Option<PreparedUpdate> {
    let expected = expected_len(cmd.width, cmd.height, cmd.format);
    if cmd.data.len() != expected {
        log::warn!(
            "texture {} update: {} bytes of pixel data, expected {expected}",
            cmd.slot.0,
            cmd.data.len()
        );
        return None;
    }

    let (sx, sy) = target.rescale_shift;
    let (w, h) = (cmd.width >> sx, cmd.height >> sy);
    if w == 0 || h == 0 {
        return None;
    }

    let mut rgba = if (sx, sy) != (0, 0) {
        let bpp = cmd.format.bytes_per_pixel();
        let scaled = convert::rescale(&cmd.data, cmd.width, cmd.height, w, h, bpp);
        convert::to_rgba(&scaled, cmd.format)
    } else {
        convert::to_rgba(&cmd.data, cmd.format)
    };
    if target.premultiplied {
        convert::premultiply(&mut rgba);
    }

    Some(PreparedUpdate {
        x: cmd.x >> sx,
        y: cmd.y >> sy,
        width: w,
        height: h,
        rgba,
    })
}

fn crop(data: &[u8], width: u32, new_width: u32, new_height: u32, bpp: usize) -> Vec<u8> {
    let pitch = width as usize * bpp;
    let row = new_width as usize * bpp;
    (0..new_height as usize)
        .flat_map(|y| &data[y * pitch..y * pitch + row])
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::TextureId;

    fn create(width: u32, height: u32, format: TexFormat, flags: TextureFlags) -> TextureCreateCommand {
        let data = (0..expected_len(width, height, format))
            .map(|i| (i % 251) as u8)
            .collect();
        TextureCreateCommand {
            slot: TextureId(3),
            width,
            height,
            format,
            flags,
            data,
        }
    }

    // ── create ────────────────────────────────────────────────────────────

    #[test]
    fn rgba_with_mipmaps_accounts_the_full_chain() {
        let cmd = create(64, 64, TexFormat::Rgba, TextureFlags::TEXTURE_2D | TextureFlags::QUALITY);
        let tex = prepare_create(&cmd, TextureLimits::default()).unwrap();
        assert_eq!((tex.width, tex.height, tex.mip_levels), (64, 64, 6));
        assert!(tex.premultiplied);
        let expected = (64 * 64 + 32 * 32 + 16 * 16 + 8 * 8 + 4 * 4 + 2 * 2) * 4;
        assert_eq!(tex.footprint(), expected);
    }

    #[test]
    fn no_mipmaps_stores_one_level() {
        let flags = TextureFlags::TEXTURE_2D | TextureFlags::QUALITY | TextureFlags::NO_MIPMAPS;
        let tex = prepare_create(&create(32, 32, TexFormat::Rgb, flags), TextureLimits::default()).unwrap();
        assert_eq!(tex.mip_levels, 1);
        assert_eq!(tex.footprint(), 32 * 32 * 4);
        assert!(!tex.premultiplied);
    }

    #[test]
    fn default_quality_halves_and_records_the_shift() {
        let tex = prepare_create(&create(64, 64, TexFormat::Rgb, TextureFlags::TEXTURE_2D), TextureLimits::default())
            .unwrap();
        assert_eq!((tex.width, tex.height, tex.rescale_shift), (32, 32, (1, 1)));
        assert_eq!(tex.base.as_ref().unwrap().len(), 32 * 32 * 4);
    }

    #[test]
    fn clamped_axis_keeps_its_own_shift() {
        let limits = TextureLimits {
            max_2d: 64,
            max_layer: 64,
        };
        let cmd = create(4, 1024, TexFormat::Rgb, TextureFlags::TEXTURE_2D | TextureFlags::QUALITY);
        let tex = prepare_create(&cmd, limits).unwrap();
        assert_eq!((tex.width, tex.height), (1, 64));
        assert_eq!(tex.rescale_shift, (2, 4));

        let info = TextureInfo {
            width: tex.width,
            height: tex.height,
            rescale_shift: tex.rescale_shift,
            ..TextureInfo::default()
        };
        let update = TextureUpdateCommand {
            slot: TextureId(3),
            x: 0,
            y: 32,
            width: 4,
            height: 32,
            format: TexFormat::Rgb,
            data: vec![0; 4 * 32 * 3],
        };
        let up = prepare_update(&update, &info).unwrap();
        assert_eq!((up.x, up.y, up.width, up.height), (0, 2, 1, 2));
    }

    #[test]
    fn mismatched_data_is_rejected() {
        let mut cmd = create(8, 8, TexFormat::Rgba, TextureFlags::TEXTURE_2D);
        cmd.data.pop();
        assert!(prepare_create(&cmd, TextureLimits::default()).is_none());
    }

    #[test]
    fn array_layers_hold_source_tiles() {
        let n = NUM_TILES_DIMENSION;
        let flags = TextureFlags::TEXTURE_ARRAY | TextureFlags::QUALITY;
        let cmd = create(2 * n, 2 * n, TexFormat::Rgba, flags);
        let tex = prepare_create(&cmd, TextureLimits::default()).unwrap();
        assert!(tex.base.is_none());
        let array = tex.array.as_ref().unwrap();
        assert_eq!((array.width, array.height, array.layers), (2, 2, NUM_TILES));

        // Tile 17 sits at column 1, row 1; its first texel is at (2, 2).
        let mut src = cmd.data.clone();
        convert::premultiply(&mut src);
        let pitch = (2 * n * 4) as usize;
        let first = 2 * pitch + 2 * 4;
        let layer = 17 * 2 * 2 * 4;
        assert_eq!(&array.data[layer..layer + 8], &src[first..first + 8]);
        assert_eq!(tex.footprint(), 2 * 2 * 4 * NUM_TILES as usize);
    }

    #[test]
    fn array_too_small_for_grid_is_dropped() {
        let flags = TextureFlags::TEXTURE_2D | TextureFlags::TEXTURE_ARRAY | TextureFlags::QUALITY;
        let tex = prepare_create(&create(8, 8, TexFormat::Rgba, flags), TextureLimits::default()).unwrap();
        assert!(tex.array.is_none());
        assert!(tex.base.is_some());
    }

    // ── update ────────────────────────────────────────────────────────────

    fn premultiplied_target(rescale_shift: (u32, u32)) -> TextureInfo {
        TextureInfo {
            width: 64,
            height: 64,
            mip_levels: 1,
            premultiplied: true,
            rescale_shift,
            ..TextureInfo::default()
        }
    }

    #[test]
    fn update_follows_the_create_conversion() {
        let cmd = TextureUpdateCommand {
            slot: TextureId(1),
            x: 4,
            y: 8,
            width: 1,
            height: 1,
            format: TexFormat::Rgba,
            data: vec![200, 100, 50, 128],
        };
        let up = prepare_update(&cmd, &premultiplied_target((0, 0))).unwrap();
        assert_eq!((up.x, up.y), (4, 8));
        assert_eq!(up.rgba, vec![100, 50, 25, 128]);
    }

    #[test]
    fn alpha_update_into_premultiplied_texture_is_premultiplied() {
        let cmd = TextureUpdateCommand {
            slot: TextureId(1),
            x: 0,
            y: 0,
            width: 2,
            height: 1,
            format: TexFormat::Alpha,
            data: vec![128, 255],
        };
        let up = prepare_update(&cmd, &premultiplied_target((0, 0))).unwrap();
        assert_eq!(up.rgba, vec![128, 128, 128, 128, 255, 255, 255, 255]);

        let straight = TextureInfo {
            premultiplied: false,
            ..premultiplied_target((0, 0))
        };
        let up = prepare_update(&cmd, &straight).unwrap();
        assert_eq!(&up.rgba[..4], &[255, 255, 255, 128]);
    }

    #[test]
    fn rgba_update_into_straight_texture_is_left_alone() {
        let cmd = TextureUpdateCommand {
            slot: TextureId(1),
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            format: TexFormat::Rgba,
            data: vec![200, 100, 50, 128],
        };
        let target = TextureInfo {
            width: 8,
            height: 8,
            ..TextureInfo::default()
        };
        let up = prepare_update(&cmd, &target).unwrap();
        assert_eq!(up.rgba, vec![200, 100, 50, 128]);
    }

    #[test]
    fn update_is_scaled_into_a_downscaled_texture() {
        let cmd = TextureUpdateCommand {
            slot: TextureId(1),
            x: 4,
            y: 8,
            width: 2,
            height: 2,
            format: TexFormat::Alpha,
            data: vec![10, 20, 30, 40],
        };
        let straight = TextureInfo {
            premultiplied: false,
            ..premultiplied_target((1, 1))
        };
        let up = prepare_update(&cmd, &straight).unwrap();
        assert_eq!((up.x, up.y, up.width, up.height), (2, 4, 1, 1));
        assert_eq!(up.rgba, vec![255, 255, 255, 25]);
    }
}
