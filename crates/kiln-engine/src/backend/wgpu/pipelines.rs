use anyhow::Result;

use crate::backend::pipeline::{Blend, PipelineKey, PipelineTable, Sampling, Topology};
use crate::command::Vertex;
use crate::screen::Mat4;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
const PLAIN_WGSL: &str = include_str!("shaders/plain.wgsl");
const TEX2D_WGSL: &str = include_str!("shaders/tex2d.wgsl");
const ARRAY_WGSL: &str = include_str!("shaders/array.wgsl");

const VERTEX_ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x2, // pos
    1 => Float32x3, // tex
    2 => Float32x4  // color
];

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: Vertex::STRIDE as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRS,
    }
}

fn blend_state(blend: Blend) -> Option<wgpu::BlendState> {
    match blend {
        Blend::None => None,
        Blend::Straight => Some(wgpu::BlendState::ALPHA_BLENDING),
        Blend::Premultiplied => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
    }
}

/// Bind group layouts and the full pipeline table for one surface format.
pub(super) struct Pipelines {
    pub(super) transform_layout: wgpu::BindGroupLayout,
    tex2d_layout: wgpu::BindGroupLayout,
    array_layout: wgpu::BindGroupLayout,
    table: PipelineTable<wgpu::RenderPipeline>,
}

impl Pipelines {
    pub(super) fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self> {
        let transform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln transform bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Mat4>() as u64),
                },
                count: None,
            }],
        });
        let tex2d_layout = texture_layout(device, wgpu::TextureViewDimension::D2, "kiln tex2d bgl");
        let array_layout =
            texture_layout(device, wgpu::TextureViewDimension::D2Array, "kiln array bgl");

        let modules = [
            (Sampling::None, PLAIN_WGSL, "kiln plain shader"),
            (Sampling::D2, TEX2D_WGSL, "kiln tex2d shader"),
            (Sampling::Array, ARRAY_WGSL, "kiln array shader"),
        ]
        .map(|(sampling, src, label)| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(format!("{COMMON_WGSL}\n{src}").into()),
            });
            (sampling, module)
        });

        let layout_for = |sampling: Sampling| {
            let mut groups = vec![&transform_layout];
            match sampling {
                Sampling::None => {}
                Sampling::D2 => groups.push(&tex2d_layout),
                Sampling::Array => groups.push(&array_layout),
            }
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("kiln pipeline layout"),
                bind_group_layouts: &groups,
                immediate_size: 0,
            })
        };
        let layouts = [
            layout_for(Sampling::None),
            layout_for(Sampling::D2),
            layout_for(Sampling::Array),
        ];

        let table = PipelineTable::build(|key| {
            let idx = key.sampling as usize;
            let module = &modules[idx].1;
            let fs_entry = match (key.sampling, key.blend) {
                (Sampling::None, _) | (_, Blend::None | Blend::Straight) => "fs_main",
                (_, Blend::Premultiplied) => "fs_premul",
            };
            let topology = match key.topology {
                Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
                Topology::Lines => wgpu::PrimitiveTopology::LineList,
            };

            Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("kiln draw pipeline"),
                layout: Some(&layouts[idx]),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[vertex_layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(fs_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: blend_state(key.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            }))
        })?;

        log::debug!("built {} render pipelines for {format:?}", table.len());

        Ok(Self {
            transform_layout,
            tex2d_layout,
            array_layout,
            table,
        })
    }

    pub(super) fn get(&self, key: PipelineKey) -> &wgpu::RenderPipeline {
        self.table.get(key)
    }

    pub(super) fn texture_layout(&self, sampling: Sampling) -> Option<&wgpu::BindGroupLayout> {
        match sampling {
            Sampling::None => None,
            Sampling::D2 => Some(&self.tex2d_layout),
            Sampling::Array => Some(&self.array_layout),
        }
    }
}

pub(super) fn texture_layout(
    device: &wgpu::Device,
    view_dimension: wgpu::TextureViewDimension,
    label: &str,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}
