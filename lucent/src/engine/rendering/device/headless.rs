use crate::rendering::defs::{BufferUsage, SamplerStateDesc};
use crate::rendering::device::{
    BoundResource, CreationErr, DeviceError, MappedTexture, RealizedPipelineDesc, RealizedPipelineKind,
    RenderContext, RenderDevice, RenderDeviceCaps, RenderDeviceSettings, ResourceBinding, ScissorRect,
    TextureRegion, UnsupportedMipFormatErr,
};
use crate::rendering::shader::{BindingSlot, CompiledShader, ShaderTarget};
use crate::rendering::vertex_layout::VertexBufferDesc;
use dashmap::{DashMap, DashSet};
use lucent_utils::align_up;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use wgpu::{
    ColorTargetState, DepthStencilState, Extent3d, IndexFormat, MultisampleState, PrimitiveState,
    TextureDimension, TextureFormat, TextureUsages, COPY_BYTES_PER_ROW_ALIGNMENT,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessShaderModule {
    pub id: u64,
    pub name: String,
    pub hash: u64,
}

/// A realized pipeline. Keeps the translated state around so it can be inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessPipeline {
    pub id: u64,
    pub label: String,
    pub compute: bool,
    pub vertex_buffers: Vec<VertexBufferDesc>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
    pub multisample: MultisampleState,
    pub color_targets: Vec<Option<ColorTargetState>>,
    pub bind_groups: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessSampler {
    pub id: u64,
    pub label: String,
    pub desc: SamplerStateDesc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTexture {
    pub id: u64,
    pub label: String,
    pub format: TextureFormat,
    pub size: Extent3d,
    pub dimension: TextureDimension,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub usage: TextureUsages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTextureView {
    pub id: u64,
    pub texture: u64,
    pub label: String,
    pub format: Option<TextureFormat>,
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessBuffer {
    pub id: u64,
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Number of device calls of each kind since creation.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub shader_modules: usize,
    pub pipelines: usize,
    pub samplers: usize,
    pub textures: usize,
    pub texture_views: usize,
    pub buffers: usize,
    pub buffer_writes: usize,
    pub texture_writes: usize,
    pub resolves: usize,
    pub mip_generations: usize,
    pub readbacks: usize,
}

#[derive(Debug, Default)]
struct Counters {
    shader_modules: AtomicUsize,
    pipelines: AtomicUsize,
    samplers: AtomicUsize,
    textures: AtomicUsize,
    texture_views: AtomicUsize,
    buffers: AtomicUsize,
    buffer_writes: AtomicUsize,
    texture_writes: AtomicUsize,
    resolves: AtomicUsize,
    mip_generations: AtomicUsize,
    readbacks: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

type SubresourceKey = (u64, u32, u32);

/// In-memory render device.
///
/// Creates plain handle structs, keeps texture and buffer contents in host memory and counts
/// every call. Format support, the maximum sample count and creation failures can be configured
/// at any time.
#[derive(Debug)]
pub struct HeadlessDevice {
    settings: RenderDeviceSettings,
    caps: RenderDeviceCaps,
    next_id: AtomicU64,
    counters: Counters,

    unsupported_formats: DashSet<TextureFormat>,
    max_sample_count: AtomicU32,
    fail_pipelines: AtomicBool,
    fail_textures: AtomicBool,

    texture_data: DashMap<SubresourceKey, Vec<u8>>,
    buffer_data: DashMap<u64, Vec<u8>>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_settings(RenderDeviceSettings::default())
    }

    pub fn with_settings(settings: RenderDeviceSettings) -> Self {
        Self {
            settings,
            caps: RenderDeviceCaps {
                min_uniform_buffer_offset_alignment: 256,
                max_color_attachments: 8,
                max_texture_dimension_2d: 8192,
                storage_textures: true,
                shader_target: ShaderTarget::Wgsl,
            },
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
            unsupported_formats: DashSet::new(),
            max_sample_count: AtomicU32::new(4),
            fail_pipelines: AtomicBool::new(false),
            fail_textures: AtomicBool::new(false),
            texture_data: DashMap::new(),
            buffer_data: DashMap::new(),
        }
    }

    pub fn set_format_supported(&self, format: TextureFormat, supported: bool) {
        if supported {
            self.unsupported_formats.remove(&format);
        } else {
            self.unsupported_formats.insert(format);
        }
    }

    pub fn set_max_sample_count(&self, count: u32) {
        self.max_sample_count.store(count, Ordering::Relaxed);
    }

    pub fn set_fail_pipeline_creation(&self, fail: bool) {
        self.fail_pipelines.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_texture_creation(&self, fail: bool) {
        self.fail_textures.store(fail, Ordering::Relaxed);
    }

    pub fn stats(&self) -> HeadlessStats {
        let c = &self.counters;
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        HeadlessStats {
            shader_modules: load(&c.shader_modules),
            pipelines: load(&c.pipelines),
            samplers: load(&c.samplers),
            textures: load(&c.textures),
            texture_views: load(&c.texture_views),
            buffers: load(&c.buffers),
            buffer_writes: load(&c.buffer_writes),
            texture_writes: load(&c.texture_writes),
            resolves: load(&c.resolves),
            mip_generations: load(&c.mip_generations),
            readbacks: load(&c.readbacks),
        }
    }

    /// Tightly packed contents of one subresource, if anything was written to it.
    pub fn texture_bytes(&self, texture: &HeadlessTexture, level: u32, slice: u32) -> Option<Vec<u8>> {
        self.texture_data
            .get(&(texture.id, level, slice))
            .map(|data| data.clone())
    }

    pub fn buffer_bytes(&self, buffer: &HeadlessBuffer) -> Option<Vec<u8>> {
        self.buffer_data.get(&buffer.id).map(|data| data.clone())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Block width, block height and bytes per block of `format`.
fn block_layout(format: TextureFormat) -> (u32, u32, u32) {
    let (width, height) = format.block_dimensions();
    (width, height, format.block_copy_size(None).unwrap_or(4))
}

/// Size in blocks of one mip level: width, height and depth.
fn level_blocks(texture: &HeadlessTexture, level: u32) -> (u32, u32, u32) {
    let (bw, bh, _) = block_layout(texture.format);
    let width = (texture.size.width >> level).max(1);
    let height = (texture.size.height >> level).max(1);
    let depth = match texture.dimension {
        TextureDimension::D3 => (texture.size.depth_or_array_layers >> level).max(1),
        _ => 1,
    };
    (width.div_ceil(bw), height.div_ceil(bh), depth)
}

impl RenderDevice for HeadlessDevice {
    type ShaderModule = HeadlessShaderModule;
    type Pipeline = HeadlessPipeline;
    type Sampler = HeadlessSampler;
    type Texture = HeadlessTexture;
    type TextureView = HeadlessTextureView;
    type Buffer = HeadlessBuffer;

    fn settings(&self) -> &RenderDeviceSettings {
        &self.settings
    }

    fn caps(&self) -> &RenderDeviceCaps {
        &self.caps
    }

    fn is_format_supported(&self, format: TextureFormat, usage: TextureUsages) -> bool {
        if usage.contains(TextureUsages::STORAGE_BINDING) && !self.caps.storage_textures {
            return false;
        }
        !self.unsupported_formats.contains(&format)
    }

    fn is_sample_count_supported(&self, format: TextureFormat, sample_count: u32) -> bool {
        sample_count.is_power_of_two()
            && sample_count <= self.max_sample_count.load(Ordering::Relaxed)
            && !self.unsupported_formats.contains(&format)
    }

    fn create_shader_module(&self, shader: &CompiledShader) -> Result<Self::ShaderModule, DeviceError> {
        bump(&self.counters.shader_modules);
        Ok(HeadlessShaderModule {
            id: self.next_id(),
            name: shader.name().to_string(),
            hash: shader.hash(),
        })
    }

    fn create_sampler(&self, label: &str, desc: &SamplerStateDesc) -> Result<Self::Sampler, DeviceError> {
        bump(&self.counters.samplers);
        Ok(HeadlessSampler {
            id: self.next_id(),
            label: label.to_string(),
            desc: *desc,
        })
    }

    fn create_pipeline(&self, desc: &RealizedPipelineDesc<'_, Self>) -> Result<Self::Pipeline, DeviceError> {
        if self.fail_pipelines.load(Ordering::Relaxed) {
            return CreationErr {
                kind: "pipeline",
                label: desc.label,
                reason: "pipeline creation is configured to fail",
            }
            .fail();
        }
        bump(&self.counters.pipelines);

        let bind_groups = desc.bind_group_layouts.keys().copied().collect();
        let pipeline = match &desc.kind {
            RealizedPipelineKind::Graphics(graphics) => HeadlessPipeline {
                id: self.next_id(),
                label: desc.label.to_string(),
                compute: false,
                vertex_buffers: graphics.vertex_buffers.to_vec(),
                primitive: graphics.primitive,
                depth_stencil: graphics.depth_stencil.clone(),
                multisample: graphics.multisample,
                color_targets: graphics.color_targets.to_vec(),
                bind_groups,
            },
            RealizedPipelineKind::Compute(_) => HeadlessPipeline {
                id: self.next_id(),
                label: desc.label.to_string(),
                compute: true,
                vertex_buffers: Vec::new(),
                primitive: PrimitiveState::default(),
                depth_stencil: None,
                multisample: MultisampleState::default(),
                color_targets: Vec::new(),
                bind_groups,
            },
        };
        Ok(pipeline)
    }

    fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> Result<Self::Texture, DeviceError> {
        let label = desc.label.unwrap_or_default();
        if self.fail_textures.load(Ordering::Relaxed) {
            return CreationErr {
                kind: "texture",
                label,
                reason: "texture creation is configured to fail",
            }
            .fail();
        }
        if self.unsupported_formats.contains(&desc.format) {
            return CreationErr {
                kind: "texture",
                label,
                reason: format!("{:?} is not supported", desc.format),
            }
            .fail();
        }
        bump(&self.counters.textures);

        Ok(HeadlessTexture {
            id: self.next_id(),
            label: label.to_string(),
            format: desc.format,
            size: desc.size,
            dimension: desc.dimension,
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            usage: desc.usage,
        })
    }

    fn create_texture_view(
        &self,
        texture: &Self::Texture,
        desc: &wgpu::TextureViewDescriptor<'_>,
    ) -> Result<Self::TextureView, DeviceError> {
        bump(&self.counters.texture_views);
        Ok(HeadlessTextureView {
            id: self.next_id(),
            texture: texture.id,
            label: desc.label.unwrap_or_default().to_string(),
            format: desc.format,
            base_mip_level: desc.base_mip_level,
            mip_level_count: desc.mip_level_count,
            base_array_layer: desc.base_array_layer,
            array_layer_count: desc.array_layer_count,
        })
    }

    fn create_buffer(&self, label: &str, size: u64, usage: BufferUsage) -> Result<Self::Buffer, DeviceError> {
        bump(&self.counters.buffers);
        let id = self.next_id();
        self.buffer_data.insert(id, vec![0; size as usize]);
        Ok(HeadlessBuffer {
            id,
            label: label.to_string(),
            size,
            usage,
        })
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
        bump(&self.counters.buffer_writes);
        let mut contents = self
            .buffer_data
            .entry(buffer.id)
            .or_insert_with(|| vec![0; buffer.size as usize]);
        let start = offset as usize;
        let end = start + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
    }

    fn write_texture(&self, texture: &Self::Texture, region: &TextureRegion, data: &[u8], bytes_per_row: u32) {
        bump(&self.counters.texture_writes);

        let (bw, bh, block_bytes) = block_layout(texture.format);
        let (level_width, level_height, level_depth) = level_blocks(texture, region.level);
        let row_bytes = (level_width * block_bytes) as usize;

        let mut contents = self
            .texture_data
            .entry((texture.id, region.level, region.slice))
            .or_insert_with(|| vec![0; row_bytes * (level_height * level_depth) as usize]);

        let x = (region.origin.x / bw * block_bytes) as usize;
        let copy_bytes = (region.size.width.div_ceil(bw) * block_bytes) as usize;
        let rows = region.size.height.div_ceil(bh);
        let depth = region.size.depth_or_array_layers.max(1);

        for z in 0..depth {
            for row in 0..rows {
                let src = ((z * rows + row) * bytes_per_row) as usize;
                let dst_row = (region.origin.z + z) * level_height + region.origin.y / bh + row;
                let dst = dst_row as usize * row_bytes + x;
                if let (Some(from), Some(to)) = (
                    data.get(src..src + copy_bytes),
                    contents.get_mut(dst..dst + copy_bytes),
                ) {
                    to.copy_from_slice(from);
                }
            }
        }
    }

    fn resolve_texture(&self, source: &Self::Texture, destination: &Self::Texture) {
        bump(&self.counters.resolves);
        let layers = match source.dimension {
            TextureDimension::D3 => 1,
            _ => source.size.depth_or_array_layers,
        };
        for slice in 0..layers {
            if let Some(data) = self.texture_data.get(&(source.id, 0, slice)).map(|d| d.clone()) {
                self.texture_data.insert((destination.id, 0, slice), data);
            }
        }
    }

    fn generate_mips(&self, texture: &Self::Texture) -> Result<(), DeviceError> {
        if texture.format.is_depth_stencil_format() {
            return UnsupportedMipFormatErr {
                format: texture.format,
            }
            .fail();
        }
        bump(&self.counters.mip_generations);
        Ok(())
    }

    fn read_texture(&self, texture: &Self::Texture, region: &TextureRegion) -> Result<MappedTexture, DeviceError> {
        bump(&self.counters.readbacks);

        let (bw, bh, block_bytes) = block_layout(texture.format);
        let (level_width, level_height, _) = level_blocks(texture, region.level);
        let level_row_bytes = (level_width * block_bytes) as usize;

        let copy_bytes = region.size.width.div_ceil(bw) * block_bytes;
        let row_pitch = align_up(copy_bytes as u64, COPY_BYTES_PER_ROW_ALIGNMENT as u64) as u32;
        let rows_per_layer = region.size.height.div_ceil(bh);
        let depth = region.size.depth_or_array_layers.max(1);
        let rows = rows_per_layer * depth;

        let mut data = vec![0; (row_pitch * rows) as usize];
        if let Some(contents) = self.texture_data.get(&(texture.id, region.level, region.slice)) {
            let x = (region.origin.x / bw * block_bytes) as usize;
            for z in 0..depth {
                for row in 0..rows_per_layer {
                    let src_row = (region.origin.z + z) * level_height + region.origin.y / bh + row;
                    let src = src_row as usize * level_row_bytes + x;
                    let dst = ((z * rows_per_layer + row) * row_pitch) as usize;
                    if let Some(from) = contents.get(src..src + copy_bytes as usize) {
                        data[dst..dst + copy_bytes as usize].copy_from_slice(from);
                    }
                }
            }
        }

        Ok(MappedTexture {
            data,
            row_pitch,
            rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedBinding {
    Buffer {
        slot: BindingSlot,
        buffer: u64,
        offset: u64,
        size: u64,
    },
    TextureView {
        slot: BindingSlot,
        texture: u64,
        view: u64,
    },
    Sampler {
        slot: BindingSlot,
        sampler: u64,
    },
}

impl RecordedBinding {
    pub fn slot(&self) -> BindingSlot {
        match self {
            RecordedBinding::Buffer { slot, .. }
            | RecordedBinding::TextureView { slot, .. }
            | RecordedBinding::Sampler { slot, .. } => *slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    SetPipeline { id: u64, label: String },
    SetVertexBuffer { slot: u32, buffer: u64 },
    SetIndexBuffer { buffer: u64, format: IndexFormat },
    SetScissorRect(ScissorRect),
    SetStencilReference(u32),
    SetBindings(Vec<RecordedBinding>),
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32, instances: Range<u32> },
    Dispatch { x: u32, y: u32, z: u32 },
}

/// Context that records every call in order.
#[derive(Debug, Clone, Default)]
pub struct HeadlessContext {
    pub commands: Vec<RecordedCommand>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. } | RecordedCommand::Dispatch { .. }
                )
            })
            .count()
    }
}

impl RenderContext<HeadlessDevice> for HeadlessContext {
    fn set_pipeline(&mut self, pipeline: &HeadlessPipeline) {
        self.commands.push(RecordedCommand::SetPipeline {
            id: pipeline.id,
            label: pipeline.label.clone(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &HeadlessBuffer) {
        self.commands.push(RecordedCommand::SetVertexBuffer {
            slot,
            buffer: buffer.id,
        });
    }

    fn set_index_buffer(&mut self, buffer: &HeadlessBuffer, format: IndexFormat) {
        self.commands.push(RecordedCommand::SetIndexBuffer {
            buffer: buffer.id,
            format,
        });
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.commands.push(RecordedCommand::SetScissorRect(rect));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.commands.push(RecordedCommand::SetStencilReference(reference));
    }

    fn set_bindings(&mut self, bindings: &[ResourceBinding<HeadlessDevice>]) -> Result<(), DeviceError> {
        let recorded = bindings
            .iter()
            .map(|binding| match &binding.resource {
                BoundResource::Buffer { buffer, offset, size } => RecordedBinding::Buffer {
                    slot: binding.slot,
                    buffer: buffer.id,
                    offset: *offset,
                    size: *size,
                },
                BoundResource::TextureView(view) => RecordedBinding::TextureView {
                    slot: binding.slot,
                    texture: view.texture,
                    view: view.id,
                },
                BoundResource::Sampler(sampler) => RecordedBinding::Sampler {
                    slot: binding.slot,
                    sampler: sampler.id,
                },
            })
            .collect();
        self.commands.push(RecordedCommand::SetBindings(recorded));
        Ok(())
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(RecordedCommand::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(RecordedCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(RecordedCommand::Dispatch { x, y, z });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::Origin3d;

    fn texture(device: &HeadlessDevice, width: u32, height: u32) -> HeadlessTexture {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("test"),
                size: Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
                view_formats: &[],
            })
            .unwrap()
    }

    #[test]
    fn texture_contents_survive_a_readback() {
        let device = HeadlessDevice::new();
        let texture = texture(&device, 4, 2);
        let pixels: Vec<u8> = (0..32).collect();
        let region = TextureRegion {
            level: 0,
            slice: 0,
            origin: Origin3d::ZERO,
            size: Extent3d {
                width: 4,
                height: 2,
                depth_or_array_layers: 1,
            },
        };

        device.write_texture(&texture, &region, &pixels, 16);
        let mapped = device.read_texture(&texture, &region).unwrap();

        assert_eq!(mapped.row_pitch, 256);
        assert_eq!(mapped.rows, 2);
        assert_eq!(&mapped.data[..16], &pixels[..16]);
        assert_eq!(&mapped.data[256..272], &pixels[16..]);
        assert_eq!(device.stats().readbacks, 1);
    }

    #[test]
    fn configured_failures_are_reported() {
        let device = HeadlessDevice::new();
        device.set_fail_texture_creation(true);
        let result = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("broken"),
            size: Extent3d::default(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        assert!(matches!(result, Err(DeviceError::Creation { kind: "texture", .. })));

        device.set_format_supported(TextureFormat::Depth24PlusStencil8, false);
        assert!(!device.is_format_supported(
            TextureFormat::Depth24PlusStencil8,
            TextureUsages::RENDER_ATTACHMENT
        ));
        assert!(device.is_sample_count_supported(TextureFormat::Rgba8Unorm, 4));
        assert!(!device.is_sample_count_supported(TextureFormat::Rgba8Unorm, 8));
        assert!(!device.is_sample_count_supported(TextureFormat::Rgba8Unorm, 3));
    }
}
