mod context;
mod mipmap;
mod readback;

pub use context::*;

use crate::rendering::defs::{BufferUsage, SamplerStateDesc};
use crate::rendering::device::{
    CreationErr, DeviceError, MappedTexture, RealizedPipelineDesc, RealizedPipelineKind,
    RenderDevice, RenderDeviceCaps, RenderDeviceSettings, TextureRegion, UnsupportedBytecodeErr,
};
use crate::rendering::pipeline::translate::sampler_descriptor;
use crate::rendering::shader::{CompiledShader, ShaderBytecode, ShaderTarget};
use futures::executor::block_on;
use mipmap::MipmapGenerator;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{error, warn};
use wgpu::{
    Adapter, BindGroupLayout, BindGroupLayoutDescriptor, Buffer, BufferDescriptor, BufferUsages,
    CommandEncoderDescriptor, ComputePipeline, ComputePipelineDescriptor, Device,
    DeviceDescriptor, ErrorFilter, Extent3d, FragmentState, Instance, LoadOp, Operations,
    Origin3d, PipelineCompilationOptions, PipelineLayoutDescriptor, Queue, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor, RequestAdapterOptions, Sampler,
    ShaderModule, ShaderModuleDescriptor, ShaderSource, StoreOp, TexelCopyBufferLayout,
    TexelCopyTextureInfo, Texture, TextureAspect, TextureDimension, TextureFormat, TextureUsages,
    TextureView, TextureViewDescriptor, TextureViewDimension, VertexBufferLayout, VertexState,
};

#[derive(Debug)]
pub enum WgpuPipelineKind {
    Render(RenderPipeline),
    Compute(ComputePipeline),
}

#[derive(Debug)]
pub struct WgpuPipelineInner {
    pub kind: WgpuPipelineKind,
    /// One layout per bind group index, starting at 0 without gaps.
    pub bind_group_layouts: Vec<BindGroupLayout>,
}

pub type WgpuPipeline = Arc<WgpuPipelineInner>;

/// [`RenderDevice`] backed by a `wgpu` device and queue.
pub struct WgpuDevice {
    adapter: Adapter,
    device: Device,
    queue: Queue,
    settings: RenderDeviceSettings,
    caps: RenderDeviceCaps,
    mipmaps: MipmapGenerator,
}

impl WgpuDevice {
    pub fn new(adapter: Adapter, device: Device, queue: Queue, settings: RenderDeviceSettings) -> Self {
        let limits = device.limits();
        let caps = RenderDeviceCaps {
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_color_attachments: limits.max_color_attachments,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
            storage_textures: limits.max_storage_textures_per_shader_stage > 0,
            shader_target: ShaderTarget::Wgsl,
        };

        device.on_uncaptured_error(Box::new(|e| error!("Uncaptured GPU error: {e}")));
        let mipmaps = MipmapGenerator::new(&device);

        Self {
            adapter,
            device,
            queue,
            settings,
            caps,
            mipmaps,
        }
    }

    /// Picks the default adapter and opens a device on it. Blocks until both are available.
    pub fn request(settings: RenderDeviceSettings) -> Result<Self, DeviceError> {
        let instance = Instance::default();
        let adapter = block_on(instance.request_adapter(&RequestAdapterOptions::default()))
            .map_err(|e| DeviceError::Creation {
                kind: "adapter",
                label: "default".to_string(),
                reason: e.to_string(),
            })?;

        let (device, queue) = block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("Lucent Device"),
            ..DeviceDescriptor::default()
        }))
        .map_err(|e| DeviceError::Creation {
            kind: "device",
            label: "Lucent Device".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self::new(adapter, device, queue, settings))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Runs `create` inside a validation error scope and turns a captured error into
    /// [`DeviceError::Creation`].
    fn scoped<T>(&self, kind: &'static str, label: &str, create: impl FnOnce() -> T) -> Result<T, DeviceError> {
        self.device.push_error_scope(ErrorFilter::Validation);
        let value = create();
        match block_on(self.device.pop_error_scope()) {
            None => Ok(value),
            Some(e) => CreationErr {
                kind,
                label,
                reason: e.to_string(),
            }
            .fail(),
        }
    }

    fn create_bind_group_layouts(&self, desc: &RealizedPipelineDesc<'_, Self>) -> Vec<BindGroupLayout> {
        let Some(max_group) = desc.bind_group_layouts.keys().last().copied() else {
            return Vec::new();
        };

        (0..=max_group)
            .map(|group| {
                let entries = desc
                    .bind_group_layouts
                    .get(&group)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                self.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
                    label: Some(&format!("{} Bind Group {group}", desc.label)),
                    entries,
                })
            })
            .collect()
    }
}

fn buffer_usages(usage: BufferUsage) -> BufferUsages {
    let mut usages = BufferUsages::empty();
    if usage.contains(BufferUsage::VERTEX) {
        usages |= BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        usages |= BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        usages |= BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        usages |= BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::STORAGE) {
        usages |= BufferUsages::STORAGE;
    }
    usages
}

/// Copy destination of one subresource region. Array layers and cube faces are addressed
/// through the z origin.
fn copy_target<'a>(texture: &'a Texture, region: &TextureRegion) -> (TexelCopyTextureInfo<'a>, Extent3d) {
    let mut origin = region.origin;
    let mut size = region.size;
    if texture.dimension() != TextureDimension::D3 {
        origin = Origin3d {
            z: region.slice,
            ..origin
        };
        size.depth_or_array_layers = 1;
    }

    let aspect = if texture.format().is_combined_depth_stencil_format() {
        TextureAspect::DepthOnly
    } else {
        TextureAspect::All
    };

    let info = TexelCopyTextureInfo {
        texture,
        mip_level: region.level,
        origin,
        aspect,
    };
    (info, size)
}

fn single_layer_view(texture: &Texture, level: u32, layer: u32) -> TextureView {
    texture.create_view(&TextureViewDescriptor {
        label: Some("Lucent Subresource View"),
        dimension: Some(TextureViewDimension::D2),
        base_mip_level: level,
        mip_level_count: Some(1),
        base_array_layer: layer,
        array_layer_count: Some(1),
        ..TextureViewDescriptor::default()
    })
}

fn array_layers(texture: &Texture) -> u32 {
    match texture.dimension() {
        TextureDimension::D3 => 1,
        _ => texture.depth_or_array_layers(),
    }
}

impl RenderDevice for WgpuDevice {
    type ShaderModule = ShaderModule;
    type Pipeline = WgpuPipeline;
    type Sampler = Sampler;
    type Texture = Texture;
    type TextureView = TextureView;
    type Buffer = Buffer;

    fn settings(&self) -> &RenderDeviceSettings {
        &self.settings
    }

    fn caps(&self) -> &RenderDeviceCaps {
        &self.caps
    }

    fn is_format_supported(&self, format: TextureFormat, usage: TextureUsages) -> bool {
        if !self.device.features().contains(format.required_features()) {
            return false;
        }
        self.adapter
            .get_texture_format_features(format)
            .allowed_usages
            .contains(usage)
    }

    fn is_sample_count_supported(&self, format: TextureFormat, sample_count: u32) -> bool {
        self.adapter
            .get_texture_format_features(format)
            .flags
            .sample_count_supported(sample_count)
    }

    fn create_shader_module(&self, shader: &CompiledShader) -> Result<Self::ShaderModule, DeviceError> {
        let source = match shader.bytecode() {
            ShaderBytecode::Wgsl(text) => ShaderSource::Wgsl(Cow::Borrowed(text)),
            ShaderBytecode::SpirV(words) => ShaderSource::SpirV(Cow::Borrowed(words)),
            ShaderBytecode::Hlsl(_) => {
                return UnsupportedBytecodeErr {
                    target: ShaderTarget::Hlsl5,
                }
                .fail();
            }
        };

        self.scoped("shader module", shader.name(), || {
            self.device.create_shader_module(ShaderModuleDescriptor {
                label: Some(shader.name()),
                source,
            })
        })
    }

    fn create_sampler(&self, label: &str, desc: &SamplerStateDesc) -> Result<Self::Sampler, DeviceError> {
        let descriptor = sampler_descriptor(label, desc, &self.settings);
        self.scoped("sampler", label, || self.device.create_sampler(&descriptor))
    }

    fn create_pipeline(&self, desc: &RealizedPipelineDesc<'_, Self>) -> Result<Self::Pipeline, DeviceError> {
        self.scoped("pipeline", desc.label, || {
            let bind_group_layouts = self.create_bind_group_layouts(desc);
            let layout_refs: Vec<&BindGroupLayout> = bind_group_layouts.iter().collect();
            let layout = self.device.create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            });

            let kind = match &desc.kind {
                RealizedPipelineKind::Graphics(graphics) => {
                    let buffers: Vec<VertexBufferLayout> = graphics
                        .vertex_buffers
                        .iter()
                        .map(|buffer| VertexBufferLayout {
                            array_stride: buffer.stride,
                            step_mode: buffer.step_mode,
                            attributes: &buffer.attributes,
                        })
                        .collect();

                    let pipeline = self.device.create_render_pipeline(&RenderPipelineDescriptor {
                        label: Some(desc.label),
                        layout: Some(&layout),
                        vertex: VertexState {
                            module: graphics.vertex.module,
                            entry_point: Some(graphics.vertex.entry_point),
                            compilation_options: PipelineCompilationOptions::default(),
                            buffers: &buffers,
                        },
                        primitive: graphics.primitive,
                        depth_stencil: graphics.depth_stencil.clone(),
                        multisample: graphics.multisample,
                        fragment: graphics.fragment.as_ref().map(|fragment| FragmentState {
                            module: fragment.module,
                            entry_point: Some(fragment.entry_point),
                            compilation_options: PipelineCompilationOptions::default(),
                            targets: graphics.color_targets,
                        }),
                        multiview: None,
                        cache: None,
                    });
                    WgpuPipelineKind::Render(pipeline)
                }
                RealizedPipelineKind::Compute(compute) => {
                    let pipeline = self.device.create_compute_pipeline(&ComputePipelineDescriptor {
                        label: Some(desc.label),
                        layout: Some(&layout),
                        module: compute.module,
                        entry_point: Some(compute.entry_point),
                        compilation_options: PipelineCompilationOptions::default(),
                        cache: None,
                    });
                    WgpuPipelineKind::Compute(pipeline)
                }
            };

            Arc::new(WgpuPipelineInner {
                kind,
                bind_group_layouts,
            })
        })
    }

    fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> Result<Self::Texture, DeviceError> {
        let label = desc.label.unwrap_or_default();
        self.scoped("texture", label, || self.device.create_texture(desc))
    }

    fn create_texture_view(
        &self,
        texture: &Self::Texture,
        desc: &TextureViewDescriptor<'_>,
    ) -> Result<Self::TextureView, DeviceError> {
        let label = desc.label.unwrap_or_default();
        self.scoped("texture view", label, || texture.create_view(desc))
    }

    fn create_buffer(&self, label: &str, size: u64, usage: BufferUsage) -> Result<Self::Buffer, DeviceError> {
        self.scoped("buffer", label, || {
            self.device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size,
                usage: buffer_usages(usage),
                mapped_at_creation: false,
            })
        })
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn write_texture(&self, texture: &Self::Texture, region: &TextureRegion, data: &[u8], bytes_per_row: u32) {
        let (info, size) = copy_target(texture, region);
        let rows = size.height.div_ceil(texture.format().block_dimensions().1);
        self.queue.write_texture(
            info,
            data,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(rows),
            },
            size,
        );
    }

    fn resolve_texture(&self, source: &Self::Texture, destination: &Self::Texture) {
        if source.format().is_depth_stencil_format() {
            warn!("Multisampled depth textures cannot be resolved, skipping");
            return;
        }

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Lucent Resolve Encoder"),
        });

        for layer in 0..array_layers(source) {
            let source_view = single_layer_view(source, 0, layer);
            let destination_view = single_layer_view(destination, 0, layer);
            let _pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("Lucent Resolve Pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &source_view,
                    depth_slice: None,
                    resolve_target: Some(&destination_view),
                    ops: Operations {
                        load: LoadOp::Load,
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.queue.submit(Some(encoder.finish()));
    }

    fn generate_mips(&self, texture: &Self::Texture) -> Result<(), DeviceError> {
        self.mipmaps.generate(&self.device, &self.queue, texture)
    }

    fn read_texture(&self, texture: &Self::Texture, region: &TextureRegion) -> Result<MappedTexture, DeviceError> {
        readback::read_region(&self.device, &self.queue, texture, region)
    }
}
