use anyhow::{Context, Result};

use crate::command::Image;
use crate::coords::ClipRect;

/// Copies `region` of `texture` into host memory and converts it to top-down
/// RGB8. `region` must lie inside the texture.
///
/// Submits its own encoder and blocks until the copy is mapped.
pub(super) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    format: wgpu::TextureFormat,
    region: ClipRect,
) -> Result<Image> {
    let (width, height) = (region.w, region.h);
    let bgra = match format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
        other => anyhow::bail!("screenshot of {other:?} surfaces is not supported"),
    };

    let unpadded = width * 4;
    let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kiln screenshot staging"),
        size: padded as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("kiln screenshot encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: region.x,
                y: region.y,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .context("device poll failed during screenshot")?;
    rx.recv()
        .context("screenshot map callback dropped")?
        .context("failed to map screenshot buffer")?;

    let mapped = slice.get_mapped_range();
    let data = rows_to_rgb(&mapped, width, height, padded, bgra);
    drop(mapped);
    staging.unmap();

    Ok(Image {
        width,
        height,
        data,
    })
}

/// Strips row padding and alpha from 4-byte pixels.
fn rows_to_rgb(src: &[u8], width: u32, height: u32, pitch: u32, bgra: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 3);
    for row in src.chunks(pitch as usize).take(height as usize) {
        for px in row[..width as usize * 4].chunks_exact(4) {
            if bgra {
                out.extend_from_slice(&[px[2], px[1], px[0]]);
            } else {
                out.extend_from_slice(&px[..3]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_and_alpha_are_dropped() {
        // 1×2 image, 8-byte pitch.
        let src = [10, 20, 30, 255, 0, 0, 0, 0, 40, 50, 60, 255, 0, 0, 0, 0];
        assert_eq!(rows_to_rgb(&src, 1, 2, 8, false), vec![10, 20, 30, 40, 50, 60]);
        assert_eq!(rows_to_rgb(&src, 1, 2, 8, true), vec![30, 20, 10, 60, 50, 40]);
    }
}
