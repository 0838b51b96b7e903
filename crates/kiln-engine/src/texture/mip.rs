use crate::command::MAX_MIP_LEVELS;

/// Length of the mip chain for a `width × height` base level.
///
/// Levels are halved while both sides are larger than 2.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let (mut w, mut h) = (width, height);
    let mut levels = 1;
    while w > 2 && h > 2 && levels < MAX_MIP_LEVELS {
        w >>= 1;
        h >>= 1;
        levels += 1;
    }
    levels
}

/// Size of `level` for a base of `width × height`.
#[inline]
pub fn mip_size(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// Bytes used by `levels` mips of a `width × height` texture.
pub fn footprint(width: u32, height: u32, levels: u32, bytes_per_pixel: usize) -> usize {
    (0..levels)
        .map(|l| {
            let (w, h) = mip_size(width, height, l);
            w as usize * h as usize * bytes_per_pixel
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_stops_at_two_pixels() {
        assert_eq!(mip_level_count(64, 64), 6);
        assert_eq!(mip_level_count(2, 512), 1);
        assert_eq!(mip_level_count(1, 1), 1);
    }

    #[test]
    fn chain_is_capped() {
        assert_eq!(mip_level_count(1 << 16, 1 << 16), MAX_MIP_LEVELS);
    }

    #[test]
    fn footprint_sums_every_level() {
        let expected = (64 * 64 + 32 * 32 + 16 * 16 + 8 * 8 + 4 * 4 + 2 * 2) * 4;
        assert_eq!(footprint(64, 64, mip_level_count(64, 64), 4), expected);
        assert_eq!(footprint(64, 64, 1, 4), 64 * 64 * 4);
    }
}
