//! CPU-side pixel processing applied before upload.
//!
//! All functions take tightly packed rows (`width * bpp` bytes, no padding).

use crate::command::{NUM_TILES_DIMENSION, TexFormat, TextureFlags};

/// Largest sizes the device accepts, used to decide on a forced downscale.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureLimits {
    pub max_2d: u32,
    /// Per-layer limit of array textures.
    pub max_layer: u32,
}

impl Default for TextureLimits {
    fn default() -> Self {
        Self {
            max_2d: 8192,
            max_layer: 2048,
        }
    }
}

/// Size a texture is stored at, or `None` when the source size is kept.
///
/// Only color sources are resized. Oversized images are halved until they
/// fit; otherwise anything larger than the tile grid is halved once unless
/// `QUALITY` is set.
pub fn downscale_target(
    width: u32,
    height: u32,
    format: TexFormat,
    flags: TextureFlags,
    limits: TextureLimits,
) -> Option<(u32, u32)> {
    if format == TexFormat::Alpha {
        return None;
    }

    let mut max = limits.max_2d;
    if flags.contains(TextureFlags::TEXTURE_ARRAY) {
        let array_max = limits.max_layer.saturating_mul(NUM_TILES_DIMENSION);
        max = if flags.contains(TextureFlags::TEXTURE_2D) {
            max.min(array_max)
        } else {
            array_max
        };
    }
    let max = max.max(1);

    if width > max || height > max {
        let (mut w, mut h) = (width, height);
        while w > max || h > max {
            w = (w >> 1).max(1);
            h = (h >> 1).max(1);
        }
        Some((w, h))
    } else if width > NUM_TILES_DIMENSION
        && height > NUM_TILES_DIMENSION
        && !flags.contains(TextureFlags::QUALITY)
    {
        Some((width >> 1, height >> 1))
    } else {
        None
    }
}

/// Box-filter resample.
///
/// Each destination texel averages a `scale_w × scale_h` block where the
/// scale factors are `width / new_width` and `height / new_height` in integer
/// arithmetic. Remainder texels on non-exact ratios are ignored.
pub fn rescale(
    data: &[u8],
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
    bpp: usize,
) -> Vec<u8> {
    let (w, nw, nh) = (width as usize, new_width as usize, new_height as usize);
    let scale_w = (width / new_width.max(1)).max(1) as usize;
    let scale_h = (height / new_height.max(1)).max(1) as usize;
    let count = (scale_w * scale_h) as u32;

    let mut out = vec![0u8; nw * nh * bpp];
    for y in 0..nh {
        for x in 0..nw {
            let (u, v) = (x * scale_w, y * scale_h);
            for c in 0..bpp {
                let mut sum = 0u32;
                for sy in 0..scale_h {
                    let row = (v + sy) * w;
                    for sx in 0..scale_w {
                        sum += data[(row + u + sx) * bpp + c] as u32;
                    }
                }
                out[(y * nw + x) * bpp + c] = (sum / count) as u8;
            }
        }
    }
    out
}

/// Expands any supported format to RGBA8.
///
/// Alpha becomes white with the value as alpha; RGB becomes opaque.
pub fn to_rgba(data: &[u8], format: TexFormat) -> Vec<u8> {
    match format {
        TexFormat::Rgba => data.to_vec(),
        TexFormat::Rgb => data
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        TexFormat::Alpha => data.iter().flat_map(|&a| [255, 255, 255, a]).collect(),
    }
}

/// Scales each color channel by `alpha / 255` in place.
pub fn premultiply(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        for c in &mut px[..3] {
            *c = (*c as u32 * a / 255) as u8;
        }
    }
}

/// Reorders an `N×N` tile-grid image into `N*N` contiguous layers.
///
/// Tile `i` sits at column `i % N`, row `i / N` of the source. The result
/// holds each tile's rows back to back, tiles in index order.
pub fn repack_tiles(data: &[u8], width: u32, height: u32, bpp: usize) -> Vec<u8> {
    let n = NUM_TILES_DIMENSION as usize;
    let tile_w = width as usize / n;
    let tile_h = height as usize / n;
    let row_bytes = tile_w * bpp;
    let tile_bytes = row_bytes * tile_h;
    let pitch = width as usize * bpp;

    let mut out = vec![0u8; tile_bytes * n * n];
    for i in 0..n * n {
        let px = (i % n) * tile_w;
        let py = (i / n) * tile_h;
        for y in 0..tile_h {
            let src = (py + y) * pitch + px * bpp;
            let dst = i * tile_bytes + y * row_bytes;
            out[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
        }
    }
    out
}

/// Reverses row order in place.
pub fn flip_rows(data: &mut [u8], row_bytes: usize) {
    if row_bytes == 0 {
        return;
    }
    let rows = data.len() / row_bytes;
    for y in 0..rows / 2 {
        let (top, bottom) = data.split_at_mut((rows - 1 - y) * row_bytes);
        top[y * row_bytes..(y + 1) * row_bytes].swap_with_slice(&mut bottom[..row_bytes]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> TextureLimits {
        TextureLimits {
            max_2d: 256,
            max_layer: 8,
        }
    }

    // ── downscale ─────────────────────────────────────────────────────────

    #[test]
    fn oversized_textures_halve_until_they_fit() {
        let t = downscale_target(1024, 512, TexFormat::Rgba, TextureFlags::QUALITY, limits());
        assert_eq!(t, Some((256, 128)));
    }

    #[test]
    fn array_limit_applies_per_tile() {
        let flags = TextureFlags::TEXTURE_ARRAY | TextureFlags::QUALITY;
        // 8 px per layer * 16 tiles
        assert_eq!(downscale_target(256, 256, TexFormat::Rgba, flags, limits()), Some((128, 128)));
    }

    #[test]
    fn quality_flag_skips_the_default_halving() {
        let l = limits();
        assert_eq!(downscale_target(64, 64, TexFormat::Rgb, TextureFlags::empty(), l), Some((32, 32)));
        assert_eq!(downscale_target(64, 64, TexFormat::Rgb, TextureFlags::QUALITY, l), None);
        assert_eq!(downscale_target(16, 64, TexFormat::Rgb, TextureFlags::empty(), l), None);
    }

    #[test]
    fn alpha_sources_are_never_resized() {
        let t = downscale_target(4096, 4096, TexFormat::Alpha, TextureFlags::empty(), limits());
        assert_eq!(t, None);
    }

    // ── rescale ───────────────────────────────────────────────────────────

    #[test]
    fn rescale_averages_blocks() {
        // 2×2 RGB -> 1×1
        let src = [0, 10, 20, 100, 110, 120, 200, 210, 220, 4, 14, 24];
        assert_eq!(rescale(&src, 2, 2, 1, 1, 3), vec![76, 86, 96]);
    }

    #[test]
    fn repeated_halving_is_deterministic() {
        let src: Vec<u8> = (0..64 * 64 * 4).map(|i| (i * 37 % 251) as u8).collect();
        let once = |d: &[u8]| {
            let half = rescale(d, 64, 64, 32, 32, 4);
            rescale(&half, 32, 32, 16, 16, 4)
        };
        let a = once(&src);
        let b = once(&src);
        assert_eq!(a.len(), 16 * 16 * 4);
        assert_eq!(a, b);
    }

    #[test]
    fn rescale_truncates_non_exact_ratios() {
        // 3 -> 2 uses a scale of 1: the third column is dropped.
        let src = [10, 20, 30];
        assert_eq!(rescale(&src, 3, 1, 2, 1, 1), vec![10, 20]);
    }

    // ── format ────────────────────────────────────────────────────────────

    #[test]
    fn alpha_expands_to_white() {
        assert_eq!(to_rgba(&[7, 200], TexFormat::Alpha), vec![255, 255, 255, 7, 255, 255, 255, 200]);
    }

    #[test]
    fn rgb_expands_to_opaque() {
        assert_eq!(to_rgba(&[1, 2, 3], TexFormat::Rgb), vec![1, 2, 3, 255]);
    }

    #[test]
    fn premultiply_never_brightens() {
        for a in (0..=255u8).step_by(5) {
            for c in (0..=255u8).step_by(15) {
                let mut px = [c, c / 2, 255 - c, a];
                let before = px;
                premultiply(&mut px);
                assert!(px[0] <= before[0] && px[1] <= before[1] && px[2] <= before[2]);
                assert_eq!(px[3], a);
                assert_eq!(px[0] as u32, c as u32 * a as u32 / 255);
            }
        }
    }

    #[test]
    fn premultiply_keeps_opaque_pixels() {
        let mut px = [12, 34, 56, 255];
        premultiply(&mut px);
        assert_eq!(px, [12, 34, 56, 255]);
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn repacked_layer_matches_source_tile() {
        let n = NUM_TILES_DIMENSION as usize;
        let (tw, th) = (2usize, 3usize);
        let (w, h) = (tw * n, th * n);
        let src: Vec<u8> = (0..w * h).map(|i| (i % 253) as u8).collect();
        let packed = repack_tiles(&src, w as u32, h as u32, 1);

        for i in [0, 1, n - 1, n, n * n - 1] {
            let (px, py) = ((i % n) * tw, (i / n) * th);
            let mut tile = Vec::new();
            for y in 0..th {
                tile.extend_from_slice(&src[(py + y) * w + px..(py + y) * w + px + tw]);
            }
            assert_eq!(&packed[i * tw * th..(i + 1) * tw * th], tile.as_slice(), "tile {i}");
        }
    }

    #[test]
    fn flip_rows_reverses_order() {
        let mut d = vec![1, 1, 2, 2, 3, 3];
        flip_rows(&mut d, 2);
        assert_eq!(d, vec![3, 3, 2, 2, 1, 1]);
    }
}
