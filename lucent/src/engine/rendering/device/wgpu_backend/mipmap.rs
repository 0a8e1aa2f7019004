use super::{array_layers, single_layer_view};
use crate::rendering::device::{DeviceError, UnsupportedMipFormatErr};
use const_format::concatcp;
use dashmap::DashMap;
use tracing::trace;
use wgpu::{
    AddressMode, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, ColorTargetState, ColorWrites,
    CommandEncoderDescriptor, Device, FilterMode, FragmentState, LoadOp, MultisampleState,
    Operations, PipelineCompilationOptions, PipelineLayout, PipelineLayoutDescriptor,
    PrimitiveState, Queue, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, Sampler, SamplerBindingType, SamplerDescriptor, ShaderModule,
    ShaderModuleDescriptor, ShaderSource, ShaderStages, StoreOp, Texture, TextureDimension,
    TextureFormat, TextureSampleType, TextureUsages, TextureViewDimension, VertexState,
};

const BLIT_LABEL: &str = "Mipmap Blit";

const BLIT_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source, source_sampler, in.uv);
}
"#;

/// Downsamples each mip level from the one above it with a fullscreen blit.
pub struct MipmapGenerator {
    module: ShaderModule,
    sampler: Sampler,
    bind_group_layout: BindGroupLayout,
    layout: PipelineLayout,
    pipelines: DashMap<TextureFormat, RenderPipeline>,
}

impl MipmapGenerator {
    pub fn new(device: &Device) -> Self {
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some(concatcp!(BLIT_LABEL, " Shader")),
            source: ShaderSource::Wgsl(BLIT_SHADER.into()),
        });

        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some(concatcp!(BLIT_LABEL, " Sampler")),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Nearest,
            ..SamplerDescriptor::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some(concatcp!(BLIT_LABEL, " Bind Group Layout")),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(concatcp!(BLIT_LABEL, " Pipeline Layout")),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            module,
            sampler,
            bind_group_layout,
            layout,
            pipelines: DashMap::new(),
        }
    }

    fn pipeline(&self, device: &Device, format: TextureFormat) -> RenderPipeline {
        self.pipelines
            .entry(format)
            .or_insert_with(|| {
                trace!("Creating mipmap blit pipeline for {format:?}");
                device.create_render_pipeline(&RenderPipelineDescriptor {
                    label: Some(concatcp!(BLIT_LABEL, " Pipeline")),
                    layout: Some(&self.layout),
                    vertex: VertexState {
                        module: &self.module,
                        entry_point: Some("vs_main"),
                        compilation_options: PipelineCompilationOptions::default(),
                        buffers: &[],
                    },
                    primitive: PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: MultisampleState::default(),
                    fragment: Some(FragmentState {
                        module: &self.module,
                        entry_point: Some("fs_main"),
                        compilation_options: PipelineCompilationOptions::default(),
                        targets: &[Some(ColorTargetState {
                            format,
                            blend: None,
                            write_mask: ColorWrites::ALL,
                        })],
                    }),
                    multiview: None,
                    cache: None,
                })
            })
            .clone()
    }

    pub fn generate(&self, device: &Device, queue: &Queue, texture: &Texture) -> Result<(), DeviceError> {
        let format = texture.format();
        let filterable = matches!(
            format.sample_type(None, Some(device.features())),
            Some(TextureSampleType::Float { filterable: true })
        );
        let usable = texture
            .usage()
            .contains(TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING);

        if !filterable || !usable || texture.dimension() != TextureDimension::D2 {
            return UnsupportedMipFormatErr { format }.fail();
        }
        if texture.mip_level_count() < 2 {
            return Ok(());
        }

        let pipeline = self.pipeline(device, format);
        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Mipmap Encoder"),
        });

        for layer in 0..array_layers(texture) {
            for level in 1..texture.mip_level_count() {
                let source = single_layer_view(texture, level - 1, layer);
                let target = single_layer_view(texture, level, layer);

                let bind_group = device.create_bind_group(&BindGroupDescriptor {
                    label: Some(concatcp!(BLIT_LABEL, " Bind Group")),
                    layout: &self.bind_group_layout,
                    entries: &[
                        BindGroupEntry {
                            binding: 0,
                            resource: BindingResource::TextureView(&source),
                        },
                        BindGroupEntry {
                            binding: 1,
                            resource: BindingResource::Sampler(&self.sampler),
                        },
                    ],
                });

                let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                    label: Some(concatcp!(BLIT_LABEL, " Pass")),
                    color_attachments: &[Some(RenderPassColorAttachment {
                        view: &target,
                        depth_slice: None,
                        resolve_target: None,
                        ops: Operations {
                            load: LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }

        queue.submit(Some(encoder.finish()));
        Ok(())
    }
}
