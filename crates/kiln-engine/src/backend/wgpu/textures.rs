use crate::command::WrapMode;
use crate::texture::{BindCache, PreparedArray, PreparedTexture, PreparedUpdate};

use super::mipmap::MipBlitter;

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// One variant of a texture slot.
pub(super) struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    binds: BindCache<wgpu::BindGroup>,
}

impl WgpuTexture {
    /// Bind group for the given wrap modes, created on first use.
    pub(super) fn bind_group(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        wrap_u: WrapMode,
        wrap_v: WrapMode,
    ) -> &wgpu::BindGroup {
        let view = &self.view;
        self.binds.get_or_insert_with(wrap_u, wrap_v, || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kiln texture bind group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        })
    }
}

/// Samplers indexed by `[linear_mipmaps][wrap_u][wrap_v]`.
pub(super) struct Samplers {
    samplers: [[[wgpu::Sampler; 2]; 2]; 2],
}

impl Samplers {
    pub(super) fn new(device: &wgpu::Device) -> Self {
        let address = |i: usize| match i {
            0 => wgpu::AddressMode::Repeat,
            _ => wgpu::AddressMode::ClampToEdge,
        };
        let samplers = std::array::from_fn(|m| {
            std::array::from_fn(|u| {
                std::array::from_fn(|v| {
                    device.create_sampler(&wgpu::SamplerDescriptor {
                        label: Some("kiln sampler"),
                        address_mode_u: address(u),
                        address_mode_v: address(v),
                        address_mode_w: wgpu::AddressMode::ClampToEdge,
                        mag_filter: wgpu::FilterMode::Linear,
                        min_filter: wgpu::FilterMode::Linear,
                        mipmap_filter: if m == 1 {
                            wgpu::MipmapFilterMode::Linear
                        } else {
                            wgpu::MipmapFilterMode::Nearest
                        },
                        ..Default::default()
                    })
                })
            })
        });
        Self { samplers }
    }

    pub(super) fn get(&self, linear_mipmaps: bool, wrap_u: WrapMode, wrap_v: WrapMode) -> &wgpu::Sampler {
        &self.samplers[linear_mipmaps as usize][wrap_u.index()][wrap_v.index()]
    }
}

fn extent(width: u32, height: u32, layers: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: layers,
    }
}

fn write(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    origin: wgpu::Origin3d,
    size: wgpu::Extent3d,
    data: &[u8],
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(size.width * 4),
            rows_per_image: Some(size.height),
        },
        size,
    );
}

/// Creates the 2D variant, uploads level 0 and fills the mip chain.
pub(super) fn create_2d(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    blitter: &MipBlitter,
    prepared: &PreparedTexture,
    base: &[u8],
) -> WgpuTexture {
    let size = extent(prepared.width, prepared.height, 1);
    let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
    if prepared.mip_levels > 1 {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("kiln texture 2d"),
        size,
        mip_level_count: prepared.mip_levels,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage,
        view_formats: &[],
    });
    write(queue, &texture, wgpu::Origin3d::ZERO, size, base);
    blitter.generate(device, queue, &texture, prepared.mip_levels);

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    WgpuTexture {
        texture,
        view,
        binds: BindCache::default(),
    }
}

/// Creates the layered variant from repacked tiles.
pub(super) fn create_array(device: &wgpu::Device, queue: &wgpu::Queue, array: &PreparedArray) -> WgpuTexture {
    let size = extent(array.width, array.height, array.layers);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("kiln texture array"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write(queue, &texture, wgpu::Origin3d::ZERO, size, &array.data);

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("kiln texture array view"),
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        ..Default::default()
    });
    WgpuTexture {
        texture,
        view,
        binds: BindCache::default(),
    }
}

/// Writes a sub-rectangle into level 0 and rebuilds the mip chain.
pub(super) fn update_2d(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    blitter: &MipBlitter,
    tex: &WgpuTexture,
    update: &PreparedUpdate,
    mip_levels: u32,
) {
    write(
        queue,
        &tex.texture,
        wgpu::Origin3d {
            x: update.x,
            y: update.y,
            z: 0,
        },
        extent(update.width, update.height, 1),
        &update.rgba,
    );
    blitter.generate(device, queue, &tex.texture, mip_levels);
}
