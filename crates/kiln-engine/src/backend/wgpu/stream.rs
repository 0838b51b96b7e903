use wgpu::util::DeviceExt;

use crate::command::{MAX_SCREENS, Vertex};
use crate::screen::Mat4;

/// Quads drawable with one index range; longer runs are split.
pub(super) const MAX_QUADS_PER_DRAW: u32 = 16 * 1024;

/// Per-buffer vertex stream, transform table and the shared quad index
/// pattern.
pub(super) struct StreamBuffers {
    vertices: wgpu::Buffer,
    vertex_capacity: usize,
    vertex_count: usize,

    transforms: wgpu::Buffer,
    transform_stride: u64,
    transform_bind_group: wgpu::BindGroup,

    quad_indices: wgpu::Buffer,
}

impl StreamBuffers {
    pub(super) fn new(device: &wgpu::Device, transform_layout: &wgpu::BindGroupLayout) -> Self {
        let vertex_capacity = 4096;
        let vertices = create_vertex_buffer(device, vertex_capacity);

        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let transform_stride = align_to(std::mem::size_of::<Mat4>() as u64, align);
        let transforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kiln transform ubo"),
            size: transform_stride * MAX_SCREENS as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let transform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln transform bind group"),
            layout: transform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &transforms,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<Mat4>() as u64),
                }),
            }],
        });

        let indices: Vec<u32> = (0..MAX_QUADS_PER_DRAW)
            .flat_map(|q| {
                let b = q * 4;
                [b, b + 1, b + 2, b, b + 2, b + 3]
            })
            .collect();
        let quad_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kiln quad ibo"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertices,
            vertex_capacity,
            vertex_count: 0,
            transforms,
            transform_stride,
            transform_bind_group,
            quad_indices,
        }
    }

    /// Rewrites the vertex stream and transform table for a new buffer.
    pub(super) fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        vertices: &[Vertex],
        transforms: &[Mat4],
    ) {
        self.ensure_vertex_capacity(device, vertices.len());
        self.vertex_count = vertices.len();
        if !vertices.is_empty() {
            queue.write_buffer(&self.vertices, 0, bytemuck::cast_slice(vertices));
        }

        if !transforms.is_empty() {
            let stride = self.transform_stride as usize;
            let mut bytes = vec![0u8; stride * transforms.len()];
            for (i, m) in transforms.iter().enumerate() {
                let raw: &[u8] = bytemuck::cast_slice(m);
                bytes[i * stride..i * stride + raw.len()].copy_from_slice(raw);
            }
            queue.write_buffer(&self.transforms, 0, &bytes);
        }
    }

    fn ensure_vertex_capacity(&mut self, device: &wgpu::Device, required: usize) {
        if required <= self.vertex_capacity {
            return;
        }
        let new_cap = required.next_power_of_two();
        log::debug!("vertex stream grows to {new_cap} vertices");
        self.vertices = create_vertex_buffer(device, new_cap);
        self.vertex_capacity = new_cap;
    }

    pub(super) fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub(super) fn vertices(&self) -> &wgpu::Buffer {
        &self.vertices
    }

    pub(super) fn quad_indices(&self) -> &wgpu::Buffer {
        &self.quad_indices
    }

    pub(super) fn transform_bind_group(&self) -> &wgpu::BindGroup {
        &self.transform_bind_group
    }

    /// Dynamic offset of transform `index`.
    pub(super) fn transform_offset(&self, index: u32) -> u32 {
        (index as u64 * self.transform_stride) as u32
    }
}

fn create_vertex_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kiln vertex stream"),
        size: (capacity * Vertex::STRIDE) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

pub(super) fn align_to(value: u64, align: u64) -> u64 {
    value.div_ceil(align.max(1)) * align.max(1)
}
